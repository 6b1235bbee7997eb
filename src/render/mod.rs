pub mod animation;
pub mod background;
pub mod draw;
pub mod overlay;
pub mod palette;
pub mod sequencer;
pub mod text;
pub mod title;
pub mod visualizer;

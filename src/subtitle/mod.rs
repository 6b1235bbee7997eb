#[cfg(any(feature = "subtitles", test))]
pub mod cache;
pub mod index;
#[cfg(any(feature = "subtitles", test))]
pub mod model;
pub mod render;
pub mod replace;
pub mod segment;
pub mod transcribe;

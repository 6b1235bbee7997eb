pub mod analysis;
pub mod decode;
pub mod features;
pub mod loudness;
pub mod resample;
pub mod timeline;

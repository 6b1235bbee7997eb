/// One row of the feature table, aligned to a video frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFeatureFrame {
    /// Contiguous from 0.
    pub frame_index: usize,
    /// Always `frame_index / fps`.
    pub timestamp: f32,
    /// Window RMS relative to the loudest window (0.0-1.0)
    pub amplitude: f32,
    /// Amplitude averaged over neighbouring frames (0.0-1.0)
    pub envelope: f32,
    /// Log-spaced band magnitudes, globally normalized (0.0-1.0)
    pub bands: Vec<f32>,
    /// Bands with a slow release: rise instantly, fall by a fixed decay per frame
    pub held_bands: Vec<f32>,
    /// Downsampled waveform of the frame window (-1.0-1.0)
    pub waveform: Vec<f32>,
    /// Sudden rise in spectral energy on this frame
    pub onset: bool,
}

impl AudioFeatureFrame {
    /// A frame with no signal, used outside the analysed track.
    pub fn silent(frame_index: usize, fps: u32, num_bands: usize, waveform_len: usize) -> Self {
        Self {
            frame_index,
            timestamp: frame_index as f32 / fps.max(1) as f32,
            amplitude: 0.0,
            envelope: 0.0,
            bands: vec![0.0; num_bands],
            held_bands: vec![0.0; num_bands],
            waveform: vec![0.0; waveform_len],
            onset: false,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }
}

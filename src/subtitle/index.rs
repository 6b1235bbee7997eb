use super::segment::SubtitleSegment;

/// Precomputed frame -> segment table so each frame's lookup is a single
/// array access.
#[derive(Clone, Debug, PartialEq)]
pub struct SubtitleIndex {
    frames: Vec<Option<u32>>,
}

impl SubtitleIndex {
    /// Map every video frame to the segment visible on it.
    ///
    /// `offset` shifts segment times onto the video timeline (the intro lead).
    /// A segment covers frames with `start <= t < end`. Segments must be sorted
    /// and non-overlapping.
    pub fn build(segments: &[SubtitleSegment], fps: u32, frame_count: usize, offset: f64) -> Self {
        let mut frames = vec![None; frame_count];
        let fps = fps as f64;
        let to_frame = |t: f32| {
            let f = ((t as f64 + offset) * fps - 1e-3).ceil();
            f.clamp(0.0, frame_count as f64) as usize
        };

        for (id, segment) in segments.iter().enumerate() {
            let first = to_frame(segment.start);
            let end = to_frame(segment.end);
            for slot in &mut frames[first..end.max(first)] {
                *slot = Some(id as u32);
            }
        }
        Self { frames }
    }

    pub fn segment_at(&self, frame_index: usize) -> Option<usize> {
        self.frames.get(frame_index).copied().flatten().map(|id| id as usize)
    }

    /// Number of frames that show any text.
    pub fn covered_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }
}

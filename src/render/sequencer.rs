//! Per-frame loop: picks the feature row for each video frame, composes the
//! image and streams frames to a [`FrameSink`] in strict order. An optional
//! title card occupies the first frames and dissolves into the visualization.

use image::RgbaImage;
use indicatif::ProgressBar;
use rayon::prelude::*;

use super::overlay::Avatar;
use super::title::{crossfade, TitleCard};
use super::visualizer::{self, particles, ParticleState, Style, StyleContext};
use crate::audio::analysis::{NUM_BANDS, WAVEFORM_POINTS};
use crate::audio::features::AudioFeatureFrame;
use crate::error::{RenderError, RenderResult};
use crate::subtitle::render::SubtitleRenderer;

/// Frames per worker thread in one parallel batch.
const BATCH_PER_THREAD: usize = 4;

/// Receives composed frames in order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbaImage) -> RenderResult<()>;
}

/// Maps video frames onto rows of the main track's feature table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoTimeline {
    pub total_frames: usize,
    pub fps: u32,
    /// Frame on which the main track starts.
    pub lead_frames: usize,
    /// Video frames before row 0 is shown: lead plus wave sync.
    pub row_offset: i64,
}

impl VideoTimeline {
    /// Frames covering a mix of `mix_samples` whose main track starts at
    /// `lead_samples`. A positive `sync` delays the visuals.
    pub fn new(mix_samples: usize, lead_samples: usize, sample_rate: u32, sync: f32, fps: u32) -> Self {
        let rate = sample_rate.max(1) as u64;
        let fps64 = fps as u64;
        let lead_frames = ((lead_samples as u64 * fps64 + rate / 2) / rate) as usize;
        let sync_frames = (sync as f64 * fps as f64).round() as i64;
        Self {
            total_frames: (mix_samples as u64 * fps64).div_ceil(rate) as usize,
            fps,
            lead_frames,
            row_offset: lead_frames as i64 + sync_frames,
        }
    }

    pub fn row(&self, video_index: usize) -> Option<usize> {
        usize::try_from(video_index as i64 - self.row_offset).ok()
    }

    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.fps.max(1) as f64
    }
}

/// Rayon pool for frame rendering; `0` uses one thread per core.
pub fn thread_pool(threads: usize) -> RenderResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if threads > 0 {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map_err(|e| RenderError::config(format!("failed to build rayon thread pool: {e}")))
}

/// Everything that stays fixed across frames.
pub struct FrameComposer<'a> {
    pub style: Style,
    pub ctx: StyleContext,
    pub background: &'a RgbaImage,
    pub avatar: Option<&'a Avatar>,
    pub subtitles: Option<&'a SubtitleRenderer>,
    pub title: Option<&'a TitleCard>,
}

impl FrameComposer<'_> {
    /// Background, visualization, avatar, then subtitles. Frames inside the
    /// title card show the card instead, blended with the scene at its end.
    pub fn compose(
        &self,
        video_index: usize,
        frame: &AudioFeatureFrame,
        particles: Option<&ParticleState>,
    ) -> RgbaImage {
        let mut canvas = match self.title {
            Some(card) if video_index < card.frame_count() => {
                let image = card.render(video_index);
                let fade = card.crossfade_frames();
                let fade_start = card.frame_count() - fade;
                if fade > 0 && video_index >= fade_start {
                    let scene = self.scene(frame, particles);
                    crossfade(&image, &scene, (video_index - fade_start) as f32 / fade as f32)
                } else {
                    image
                }
            }
            _ => self.scene(frame, particles),
        };
        if let Some(subtitles) = self.subtitles {
            subtitles.render_frame(&mut canvas, video_index);
        }
        canvas
    }

    fn scene(&self, frame: &AudioFeatureFrame, particles: Option<&ParticleState>) -> RgbaImage {
        let mut canvas = self.background.clone();
        visualizer::render(self.style, &mut canvas, frame, &self.ctx, particles);
        if let Some(avatar) = self.avatar {
            avatar.paste_centered(&mut canvas);
        }
        canvas
    }
}

fn feature_row(features: &[AudioFeatureFrame], timeline: &VideoTimeline, video_index: usize) -> AudioFeatureFrame {
    timeline
        .row(video_index)
        .and_then(|row| features.get(row))
        .cloned()
        .unwrap_or_else(|| {
            let bands = features.first().map_or(NUM_BANDS, |f| f.bands.len());
            let points = features.first().map_or(WAVEFORM_POINTS, |f| f.waveform.len());
            AudioFeatureFrame::silent(video_index, timeline.fps, bands, points)
        })
}

/// Render every frame of `timeline` into `sink` and return the frame count.
///
/// Pure styles render in parallel batches that are written back in order;
/// the particle style folds its state through the frames on this thread.
pub fn run(
    composer: &FrameComposer<'_>,
    features: &[AudioFeatureFrame],
    timeline: &VideoTimeline,
    particle_seed: u64,
    sink: &mut dyn FrameSink,
    progress: &ProgressBar,
) -> RenderResult<usize> {
    let total = timeline.total_frames;
    let report_every = (timeline.fps as usize * 2).max(1);
    let mut written = 0usize;

    let report = |written: usize| {
        if written % report_every == 0 || written == total {
            progress.set_position(written as u64);
        }
    };

    if composer.style.is_stateful() {
        let mut state = ParticleState::new(particle_seed, &composer.ctx);
        for i in 0..total {
            let frame = feature_row(features, timeline, i);
            state = particles::advance(state, &frame, &composer.ctx);
            let image = composer.compose(i, &frame, Some(&state));
            sink.write_frame(&image)?;
            written += 1;
            report(written);
        }
    } else {
        let batch = (rayon::current_num_threads() * BATCH_PER_THREAD).max(1);
        let mut start = 0usize;
        while start < total {
            let end = (start + batch).min(total);
            let images: Vec<RgbaImage> = (start..end)
                .into_par_iter()
                .map(|i| composer.compose(i, &feature_row(features, timeline, i), None))
                .collect();
            for image in &images {
                sink.write_frame(image)?;
                written += 1;
                report(written);
            }
            start = end;
        }
    }

    log::debug!("Sequenced {} frames", written);
    Ok(written)
}

/// A single frame for `video_index`, e.g. a thumbnail, identical to the one
/// [`run`] produces. The particle state is folded up to that frame.
pub fn still(
    composer: &FrameComposer<'_>,
    features: &[AudioFeatureFrame],
    timeline: &VideoTimeline,
    video_index: usize,
    particle_seed: u64,
) -> RgbaImage {
    let frame = feature_row(features, timeline, video_index);
    log::debug!(
        "Still of frame {} from feature row {} ({:.2}s)",
        video_index,
        frame.frame_index,
        frame.timestamp
    );
    let state = composer.style.is_stateful().then(|| {
        (0..=video_index).fold(ParticleState::new(particle_seed, &composer.ctx), |state, i| {
            particles::advance(state, &feature_row(features, timeline, i), &composer.ctx)
        })
    });
    composer.compose(video_index, &frame, state.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis::extract;
    use crate::audio::decode::tests::sine;
    use crate::audio::timeline::to_samples;
    use crate::render::palette::Color;
    use crate::render::text::TextOverlay;
    use crate::render::visualizer::tests::{blank, ctx, loud_frame};

    #[derive(Default)]
    struct CollectSink {
        frames: Vec<RgbaImage>,
    }

    impl FrameSink for CollectSink {
        fn write_frame(&mut self, frame: &RgbaImage) -> RenderResult<()> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    struct FailingSink {
        accept: usize,
    }

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _frame: &RgbaImage) -> RenderResult<()> {
            if self.accept == 0 {
                return Err(RenderError::encoding("pipe closed"));
            }
            self.accept -= 1;
            Ok(())
        }
    }

    fn ten_seconds() -> Vec<AudioFeatureFrame> {
        let samples = sine(440.0, 10.0, 44_100, 0.5);
        extract(&samples, 44_100, 30, 10.0).unwrap()
    }

    const RATE: u32 = 48_000;

    fn timeline(seconds: f64, lead: f64, sync: f32) -> VideoTimeline {
        VideoTimeline::new(to_samples(seconds, RATE), to_samples(lead, RATE), RATE, sync, 30)
    }

    fn composer<'a>(style: Style, background: &'a RgbaImage) -> FrameComposer<'a> {
        FrameComposer {
            style,
            ctx: ctx(background.width(), background.height()),
            background,
            avatar: None,
            subtitles: None,
            title: None,
        }
    }

    fn render(style: Style, features: &[AudioFeatureFrame], timeline: &VideoTimeline, seed: u64) -> Vec<RgbaImage> {
        let background = blank(64, 36);
        let composer = composer(style, &background);
        let mut sink = CollectSink::default();
        let n = run(&composer, features, timeline, seed, &mut sink, &ProgressBar::hidden()).unwrap();
        assert_eq!(n, sink.frames.len());
        sink.frames
    }

    #[test]
    fn ten_seconds_of_bars_is_three_hundred_frames() {
        let features = ten_seconds();
        let timeline = timeline(10.0, 0.0, 0.0);
        let frames = render(Style::Bars, &features, &timeline, 1);
        assert_eq!(frames.len(), 300);
        assert!((timeline.duration() - 10.0).abs() <= 1.0 / 30.0);
        assert_eq!(timeline.lead_frames, 0);
    }

    #[test]
    fn pure_styles_render_identically_twice() {
        let features = ten_seconds();
        let timeline = timeline(2.0, 0.0, 0.0);
        assert_eq!(
            render(Style::Spectrum, &features, &timeline, 1),
            render(Style::Spectrum, &features, &timeline, 2)
        );
    }

    #[test]
    fn particle_frames_follow_the_seed() {
        let features: Vec<_> = (0..20).map(loud_frame).collect();
        let timeline = timeline(20.0 / 30.0, 0.0, 0.0);
        let a = render(Style::Particles, &features, &timeline, 11);
        let b = render(Style::Particles, &features, &timeline, 11);
        let c = render(Style::Particles, &features, &timeline, 12);
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn frames_outside_the_main_track_are_silent() {
        let features: Vec<_> = (0..30).map(loud_frame).collect();
        // One second of intro lead before the main track.
        let timeline = timeline(2.0, 1.0, 0.0);
        assert_eq!(timeline.row(0), None);
        assert_eq!(timeline.row(29), None);
        assert_eq!(timeline.row(30), Some(0));

        let frames = render(Style::Bars, &features, &timeline, 1);
        assert_eq!(frames.len(), 60);
        assert_eq!(frames[0], blank(64, 36));
        assert_ne!(frames[35], blank(64, 36));
    }

    #[test]
    fn sync_offset_shifts_rows() {
        let delayed = timeline(5.0, 0.0, 0.5);
        assert_eq!(delayed.row(14), None);
        assert_eq!(delayed.row(15), Some(0));
        let early = timeline(5.0, 0.0, -0.5);
        assert_eq!(early.row(0), Some(15));
    }

    #[test]
    fn avatar_is_pasted_over_the_visualization() {
        let background = blank(64, 64);
        let avatar = Avatar::from_image(&RgbaImage::from_pixel(8, 8, Color::WHITE.rgba(255)), 16);
        let composer = FrameComposer {
            avatar: Some(&avatar),
            ..composer(Style::Radial, &background)
        };
        let image = composer.compose(0, &loud_frame(0), None);
        let center = image.get_pixel(32, 32).0;
        assert!(center.iter().all(|&c| c >= 250), "{center:?}");
    }

    #[test]
    fn still_matches_the_sequenced_frame() {
        let features: Vec<_> = (0..10).map(loud_frame).collect();
        let timeline = timeline(10.0 / 30.0, 0.0, 0.0);
        let frames = render(Style::Bars, &features, &timeline, 1);
        let background = blank(64, 36);
        let composer = composer(Style::Bars, &background);
        assert_eq!(still(&composer, &features, &timeline, 4, 1), frames[4]);
    }

    #[test]
    fn particle_still_matches_the_sequenced_frame() {
        let features: Vec<_> = (0..12).map(loud_frame).collect();
        let timeline = timeline(12.0 / 30.0, 0.0, 0.0);
        let frames = render(Style::Particles, &features, &timeline, 5);
        let background = blank(64, 36);
        let composer = composer(Style::Particles, &background);
        for index in [0, 7, 11] {
            assert_eq!(still(&composer, &features, &timeline, index, 5), frames[index], "frame {index}");
        }
    }

    #[test]
    fn hour_long_mix_maps_to_exact_frames() {
        let t = VideoTimeline::new(158_760_007, 132_301, 44_100, 0.0, 30);
        // 3600.00016s rounds up to one extra frame.
        assert_eq!(t.total_frames, 108_001);
        assert_eq!(t.lead_frames, 90);
        let exact = VideoTimeline::new(158_760_000, 0, 44_100, 0.0, 30);
        assert_eq!(exact.total_frames, 108_000);
        assert_eq!(exact.duration(), 3600.0);
    }

    #[test]
    fn title_card_leads_into_the_visualization() {
        use crate::render::title::tests::card_spec;

        let features: Vec<_> = (0..30).map(loud_frame).collect();
        let background = blank(64, 36);
        let mut title_spec = card_spec("Hi");
        title_spec.duration = 1.0;
        let card = TitleCard::new(&title_spec, &background, TextOverlay::bundled(12.0).unwrap(), 30).unwrap();
        let composer = FrameComposer {
            title: Some(&card),
            ..composer(Style::Bars, &background)
        };
        // Main track starts when the card ends.
        let timeline = timeline(2.0, 1.0, 0.0);
        let mut sink = CollectSink::default();
        run(&composer, &features, &timeline, 1, &mut sink, &ProgressBar::hidden()).unwrap();
        let frames = sink.frames;
        assert_eq!(frames.len(), 60);

        // Before the crossfade the card is shown as is.
        assert_eq!(frames[0], card.render(0));
        assert_eq!(frames[14], card.render(14));
        // The last card frames mix in the scene.
        let scene = composer.scene(&feature_row(&features, &timeline, 29), None);
        assert_ne!(frames[29], card.render(29));
        assert_ne!(frames[29], scene);
        // Row 0 lands right after the card.
        assert_eq!(timeline.row(30), Some(0));
        assert_eq!(frames[30], composer.scene(&features[0], None));
    }

    #[test]
    fn thread_pool_honours_the_count() {
        assert_eq!(thread_pool(3).unwrap().current_num_threads(), 3);
        assert!(thread_pool(0).unwrap().current_num_threads() >= 1);
    }

    #[test]
    fn sink_errors_stop_the_run() {
        let features: Vec<_> = (0..10).map(loud_frame).collect();
        let background = blank(32, 32);
        let composer = composer(Style::Waveform, &background);
        let timeline = timeline(10.0 / 30.0, 0.0, 0.0);
        let mut sink = FailingSink { accept: 3 };
        let err = run(&composer, &features, &timeline, 1, &mut sink, &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }
}

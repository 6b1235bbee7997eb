use serde::{Deserialize, Serialize};

/// A subtitle line with its display window, in seconds from the start of
/// the main track. Transcribers may emit one per word; [`reflow`] turns
/// those into on-screen cues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub start: f32,
    pub end: f32,
    pub text: String,
}

impl SubtitleSegment {
    pub fn duration(&self) -> f32 {
        self.end - self.start
    }

    fn chars(&self) -> usize {
        self.text.chars().count()
    }

    fn ends_sentence(&self) -> bool {
        let trimmed = self.text.trim_end();
        ['.', '?', '!', '。', '？', '！'].iter().any(|&p| trimmed.ends_with(p))
    }
}

pub const DEFAULT_MAX_CHARS: usize = 42;

/// Bounds on a single on-screen cue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CueLimits {
    pub max_chars: usize,
    /// Longer silences always start a new cue.
    pub max_gap: f32,
    pub max_duration: f32,
    /// Cues shorter than this are folded into the following one.
    pub min_duration: f32,
}

impl CueLimits {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            max_gap: 0.5,
            max_duration: 5.0,
            min_duration: 0.8,
        }
    }
}

impl Default for CueLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

/// Regroup segments into cues within `limits`. Runs on the final text, so
/// replacements that lengthen or shorten words move the breaks with them.
pub fn reflow(segments: Vec<SubtitleSegment>, limits: &CueLimits) -> Vec<SubtitleSegment> {
    let pieces: Vec<SubtitleSegment> = normalize(segments)
        .into_iter()
        .flat_map(|s| split(s, limits.max_chars))
        .collect();
    let cues = join(pieces, limits);
    normalize(merge_short(cues, limits))
}

/// Break an overlong segment at word boundaries, sharing its window among
/// the pieces by character count.
fn split(segment: SubtitleSegment, max_chars: usize) -> Vec<SubtitleSegment> {
    if segment.chars() <= max_chars {
        return vec![segment];
    }
    let lines = crate::render::text::wrap_text(&segment.text, max_chars as u32, |s| s.chars().count() as u32);
    let total: usize = lines.iter().map(|l| l.chars().count()).sum::<usize>().max(1);
    let span = segment.duration();

    let mut done = 0usize;
    let last = lines.len().saturating_sub(1);
    lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let start = segment.start + span * done as f32 / total as f32;
            done += text.chars().count();
            let end = if i == last {
                segment.end
            } else {
                segment.start + span * done as f32 / total as f32
            };
            SubtitleSegment { start, end, text }
        })
        .collect()
}

fn join(pieces: Vec<SubtitleSegment>, limits: &CueLimits) -> Vec<SubtitleSegment> {
    let mut cues: Vec<SubtitleSegment> = Vec::new();
    for piece in pieces {
        if let Some(current) = cues.last_mut() {
            let fits = current.chars() + 1 + piece.chars() <= limits.max_chars;
            let close = piece.start - current.end <= limits.max_gap;
            let short = piece.end - current.start <= limits.max_duration;
            if fits && close && short && !current.ends_sentence() {
                current.text.push(' ');
                current.text.push_str(&piece.text);
                current.end = piece.end;
                continue;
            }
        }
        cues.push(piece);
    }
    cues
}

fn merge_short(mut cues: Vec<SubtitleSegment>, limits: &CueLimits) -> Vec<SubtitleSegment> {
    let mut i = 0;
    while i + 1 < cues.len() {
        let (cue, next) = (&cues[i], &cues[i + 1]);
        let mergeable = cue.duration() < limits.min_duration
            && next.start - cue.end <= limits.max_gap
            && cue.chars() + 1 + next.chars() <= limits.max_chars;
        if mergeable {
            let next = cues.remove(i + 1);
            cues[i].text.push(' ');
            cues[i].text.push_str(&next.text);
            cues[i].end = next.end;
        } else {
            i += 1;
        }
    }
    cues
}

/// Sort by start, drop empty or inverted segments and clip each end to the
/// next start so no two segments overlap.
pub fn normalize(mut segments: Vec<SubtitleSegment>) -> Vec<SubtitleSegment> {
    segments.retain(|s| {
        s.start.is_finite() && s.end.is_finite() && s.end > s.start && !s.text.trim().is_empty()
    });
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    for i in 0..segments.len().saturating_sub(1) {
        let next_start = segments[i + 1].start;
        if segments[i].end > next_start {
            segments[i].end = next_start;
        }
    }
    segments.retain(|s| s.end > s.start);
    for s in &mut segments {
        s.text = s.text.trim().to_string();
    }
    segments
}

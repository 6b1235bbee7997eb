use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use image::RgbaImage;

use crate::config::QualityPreset;
use crate::error::{RenderError, RenderResult};
use crate::render::sequencer::FrameSink;

const AUDIO_BITRATE: &str = "192k";

#[derive(Clone, Debug, PartialEq)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub quality: QualityPreset,
    pub out_path: PathBuf,
    /// ffmpeg `-threads`; 0 leaves it to ffmpeg.
    pub threads: usize,
}

impl EncodeConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::config("encode width/height must be non-zero"));
        }
        if self.fps == 0 {
            return Err(RenderError::config("encode fps must be non-zero"));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(RenderError::config(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }
        Ok(())
    }

    fn push_codec_args(&self, args: &mut Vec<OsString>) {
        for a in ["-c:v", "libx264", "-preset", self.quality.x264_preset(), "-tune", "animation"] {
            args.push(a.into());
        }
        args.push("-crf".into());
        args.push(self.quality.crf().to_string().into());
        for a in ["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a", AUDIO_BITRATE] {
            args.push(a.into());
        }
        if self.threads > 0 {
            args.push("-threads".into());
            args.push(self.threads.to_string().into());
        }
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
}

/// `<stem>.<tag>.<ext>` next to `out_path`.
fn sibling(out_path: &Path, tag: &str) -> PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match out_path.extension() {
        Some(ext) => format!("{stem}.{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{tag}"),
    };
    out_path.with_file_name(name)
}

/// `<stem>.partial.<ext>` next to the final output.
pub fn partial_path(out_path: &Path) -> PathBuf {
    sibling(out_path, "partial")
}

fn base_args() -> Vec<OsString> {
    ["-y", "-loglevel", "error"].iter().map(OsString::from).collect()
}

/// Arguments for raw RGBA frames on stdin muxed with `audio` into `target`.
pub fn video_args(cfg: &EncodeConfig, audio: &Path, target: &Path) -> Vec<OsString> {
    let mut args = base_args();
    for a in ["-f", "rawvideo", "-pix_fmt", "rgba", "-s"] {
        args.push(a.into());
    }
    args.push(format!("{}x{}", cfg.width, cfg.height).into());
    args.push("-r".into());
    args.push(cfg.fps.to_string().into());
    args.push("-i".into());
    args.push("pipe:0".into());
    args.push("-i".into());
    args.push(audio.as_os_str().to_owned());
    for a in ["-map", "0:v", "-map", "1:a"] {
        args.push(a.into());
    }
    cfg.push_codec_args(&mut args);
    args.push(target.as_os_str().to_owned());
    args
}

/// Audio codec picked from the output extension.
pub fn audio_codec_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp3") => "libmp3lame",
        Some("wav") => "pcm_s16le",
        _ => "aac",
    }
}

pub fn audio_only_args(audio: &Path, target: &Path) -> Vec<OsString> {
    let codec = audio_codec_for(target);
    let mut args = base_args();
    args.push("-i".into());
    args.push(audio.as_os_str().to_owned());
    args.push("-c:a".into());
    args.push(codec.into());
    if codec != "pcm_s16le" {
        args.push("-b:a".into());
        args.push(AUDIO_BITRATE.into());
    }
    args.push(target.as_os_str().to_owned());
    args
}

/// Appends `clip` after `video`, fitted into the frame. The soundtrack is
/// padded with silence under the clip.
pub fn end_screen_args(cfg: &EncodeConfig, video: &Path, clip: &Path, target: &Path) -> Vec<OsString> {
    let (w, h) = (cfg.width, cfg.height);
    let filter = format!(
        "[0:v]setsar=1[main];\
         [1:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[end];\
         [main][end]concat=n=2:v=1:a=0[outv];[0:a]apad[outa]",
        fps = cfg.fps
    );
    let mut args = base_args();
    args.push("-i".into());
    args.push(video.as_os_str().to_owned());
    args.push("-i".into());
    args.push(clip.as_os_str().to_owned());
    for a in ["-filter_complex", filter.as_str(), "-map", "[outv]", "-map", "[outa]", "-shortest"] {
        args.push(a.into());
    }
    cfg.push_codec_args(&mut args);
    args.push(target.as_os_str().to_owned());
    args
}

/// Copies every stream of `video` and adds `image` as its cover picture.
pub fn cover_art_args(video: &Path, image: &Path, target: &Path) -> Vec<OsString> {
    let mut args = base_args();
    args.push("-i".into());
    args.push(video.as_os_str().to_owned());
    args.push("-i".into());
    args.push(image.as_os_str().to_owned());
    for a in ["-map", "0", "-map", "1", "-c", "copy", "-disposition:v:1", "attached_pic"] {
        args.push(a.into());
    }
    args.push(target.as_os_str().to_owned());
    args
}

/// Unnamed temp file collecting a child's stderr, read back on failure.
struct StderrLog(File);

impl StderrLog {
    fn new() -> RenderResult<Self> {
        Ok(Self(tempfile::tempfile()?))
    }

    fn stdio(&self) -> RenderResult<Stdio> {
        Ok(Stdio::from(self.0.try_clone()?))
    }

    fn contents(&mut self) -> String {
        let mut bytes = Vec::new();
        if self.0.seek(SeekFrom::Start(0)).is_ok() {
            let _ = self.0.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    fn failure(&mut self, status: ExitStatus) -> RenderError {
        RenderError::encoding(format!("ffmpeg exited with status {status}: {}", self.contents()))
    }
}

fn spawn_ffmpeg(args: &[OsString], stdin: Stdio, log: &StderrLog) -> RenderResult<Child> {
    Command::new("ffmpeg")
        .args(args)
        .stdin(stdin)
        .stdout(Stdio::null())
        .stderr(log.stdio()?)
        .spawn()
        .map_err(|e| RenderError::encoding(format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}")))
}

/// Run a one-shot ffmpeg command writing `target`, moved to `out_path` on success.
fn run_to(args: &[OsString], target: &Path, out_path: &Path) -> RenderResult<()> {
    let mut log = StderrLog::new()?;
    let status = spawn_ffmpeg(args, Stdio::null(), &log)?
        .wait()
        .map_err(|e| RenderError::encoding(format!("failed to wait for ffmpeg: {e}")))?;
    if !status.success() {
        let _ = std::fs::remove_file(target);
        return Err(log.failure(status));
    }
    promote(target, out_path)
}

fn promote(partial: &Path, out_path: &Path) -> RenderResult<()> {
    std::fs::rename(partial, out_path).map_err(|e| {
        let _ = std::fs::remove_file(partial);
        RenderError::encoding(format!("failed to move output into place at {}: {e}", out_path.display()))
    })
}

fn ensure_parent_dir(path: &Path) -> RenderResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Streams frames into ffmpeg. The output only appears at `out_path` once
/// [`finish`](Self::finish) succeeds; otherwise the partial file is removed.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    partial: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    log: StderrLog,
    frames: usize,
}

impl FfmpegEncoder {
    pub fn new(cfg: EncodeConfig, audio: &Path) -> RenderResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;
        let partial = partial_path(&cfg.out_path);

        let log = StderrLog::new()?;
        let mut child = spawn_ffmpeg(&video_args(&cfg, audio, &partial), Stdio::piped(), &log)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::encoding("ffmpeg stdin not available"))?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, preset={}",
            cfg.width,
            cfg.height,
            cfg.fps,
            cfg.quality.x264_preset()
        );

        Ok(Self {
            cfg,
            partial,
            child: Some(child),
            stdin: Some(stdin),
            log,
            frames: 0,
        })
    }

    pub fn finish(mut self) -> RenderResult<()> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let mut child = self
            .child
            .take()
            .ok_or_else(|| RenderError::encoding("ffmpeg encoder is already finalized"))?;
        let status = child
            .wait()
            .map_err(|e| RenderError::encoding(format!("failed to wait for ffmpeg: {e}")))?;

        if !status.success() {
            let _ = std::fs::remove_file(&self.partial);
            return Err(self.log.failure(status));
        }

        promote(&self.partial, &self.cfg.out_path)?;
        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &RgbaImage) -> RenderResult<()> {
        if frame.dimensions() != (self.cfg.width, self.cfg.height) {
            return Err(RenderError::encoding(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.cfg.width,
                self.cfg.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::encoding("ffmpeg encoder is already finalized"))?;
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            let detail = self.log.contents();
            return Err(RenderError::encoding(format!("failed to write frame to ffmpeg: {e}: {detail}")));
        }
        self.frames += 1;
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

/// Encode the mix alone; the codec follows the output extension.
pub fn encode_audio_only(audio: &Path, out_path: &Path) -> RenderResult<()> {
    ensure_parent_dir(out_path)?;
    let partial = partial_path(out_path);
    run_to(&audio_only_args(audio, &partial), &partial, out_path)?;
    log::info!("Audio written to {} ({})", out_path.display(), audio_codec_for(out_path));
    Ok(())
}

/// Re-encode `cfg.out_path` with `clip` appended, replacing it in place.
pub fn append_end_screen(cfg: &EncodeConfig, clip: &Path) -> RenderResult<()> {
    if !clip.is_file() {
        return Err(RenderError::config(format!("end screen {} does not exist", clip.display())));
    }
    let target = sibling(&cfg.out_path, "end");
    run_to(&end_screen_args(cfg, &cfg.out_path, clip, &target), &target, &cfg.out_path)?;
    log::info!("End screen {} appended", clip.display());
    Ok(())
}

/// Attach `image` to `video` as cover art, replacing it in place.
pub fn embed_cover_art(video: &Path, image: &Path) -> RenderResult<()> {
    let target = sibling(video, "cover");
    run_to(&cover_art_args(video, image, &target), &target, video)?;
    log::info!("Cover art {} embedded", image.display());
    Ok(())
}

use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use crate::encode::sink::{
    EncoderSink, FrameOrder, SinkConfig, check_frame_size, ensure_parent_dir, output_path,
};
use crate::foundation::core::{Fps, Rgba8};
use crate::foundation::error::{ExportError, ExportResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::backend::FrameBuffer;

/// Container/codec combinations produced by [`FfmpegSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// H.264 in MP4, yuv420p. Broadly compatible, no alpha.
    Mp4,
    /// VP9 in WebM, yuva420p. Keeps the alpha channel.
    Webm,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// Highest quantizer the codec accepts.
    pub fn max_quality(self) -> u32 {
        match self {
            Self::Mp4 => 51,
            Self::Webm => 63,
        }
    }

    fn codec_args(self, quality: u32) -> Vec<String> {
        let (codec, extra): (&[&str], &[&str]) = match self {
            Self::Mp4 => (
                &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
                &["-movflags", "+faststart"],
            ),
            Self::Webm => (
                &["-c:v", "libvpx-vp9", "-pix_fmt", "yuva420p"],
                &["-b:v", "0"],
            ),
        };
        let crf = quality.min(self.max_quality()).to_string();

        let mut args = vec!["-an".to_owned()];
        args.extend(codec.iter().map(|s| (*s).to_owned()));
        args.extend(["-crf".to_owned(), crf]);
        args.extend(extra.iter().map(|s| (*s).to_owned()));
        args
    }
}

/// Options for [`FfmpegSink`].
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Outputs written from the single input stream, one file each.
    pub formats: Vec<OutputFormat>,
    /// Overwrite output files if they already exist.
    pub overwrite: bool,
    /// Flatten alpha over this color before piping (straight alpha in, opaque out).
    pub flatten_over: Option<Rgba8>,
    /// `ffmpeg` executable; resolved through `PATH` when not absolute.
    pub program: PathBuf,
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::Mp4],
            overwrite: true,
            flatten_over: None,
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegSinkOpts {
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }
}

/// Out-of-process encoder: spawns `ffmpeg` and streams raw RGBA frames to its stdin.
///
/// Every requested [`OutputFormat`] becomes one output of the same process, so all files are
/// encoded from an identical frame stream.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    outputs: Vec<PathBuf>,
    order: FrameOrder,
}

impl Default for FfmpegSink {
    fn default() -> Self {
        Self::new(FfmpegSinkOpts::default())
    }
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            outputs: Vec::new(),
            order: FrameOrder::default(),
        }
    }

    /// Output files for `base` under the configured formats.
    pub fn output_paths(&self, base: &Path) -> Vec<PathBuf> {
        self.opts
            .formats
            .iter()
            .map(|f| output_path(base, f.extension()))
            .collect()
    }

    fn build_command(&self, cfg: &SinkConfig, outputs: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.opts.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if self.opts.overwrite { "-y" } else { "-n" });

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);

        for (format, path) in self.opts.formats.iter().zip(outputs) {
            cmd.args(format.codec_args(cfg.quality)).arg(path);
        }
        cmd
    }

    fn drain_stderr(&mut self) -> Vec<u8> {
        match self.stderr_drain.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => format!("(stderr read failed: {e})").into_bytes(),
                Err(_) => b"(stderr drain thread panicked)".to_vec(),
            },
            None => Vec::new(),
        }
    }

    /// After a broken pipe: close stdin, reap the child and build the error from its exit status
    /// and stderr, which name the actual cause.
    fn reap_failed(&mut self, write_err: &str) -> ExportError {
        drop(self.stdin.take());
        let status = match self.child.take() {
            Some(mut child) => match child.wait() {
                Ok(status) => status.to_string(),
                Err(e) => format!("unknown ({e})"),
            },
            None => "unknown".to_owned(),
        };
        let stderr_bytes = self.drain_stderr();
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        self.cfg = None;
        self.outputs.clear();

        tracing::warn!(status = %status, "ffmpeg stopped reading frames");
        ExportError::encoding_failed(format!(
            "ffmpeg exited with status {status}: {} ({write_err})",
            stderr.trim()
        ))
    }
}

impl EncoderSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ExportResult<()> {
        cfg.validate()?;
        if self.opts.formats.is_empty() {
            return Err(ExportError::validation(
                "ffmpeg sink needs at least one output format",
            ));
        }
        if self.child.is_some() {
            return Err(ExportError::validation("ffmpeg sink already started"));
        }

        let outputs = self.output_paths(&cfg.out_path);
        for path in &outputs {
            ensure_parent_dir(path)?;
            if !self.opts.overwrite && path.exists() {
                return Err(ExportError::validation(format!(
                    "output file '{}' already exists",
                    path.display()
                )));
            }
        }

        if !is_ffmpeg_available(&self.opts.program) {
            return Err(ExportError::encoder_unavailable(format!(
                "'{}' was not found or is not runnable (is ffmpeg installed and on PATH?)",
                self.opts.program.display()
            )));
        }

        let mut child = self.build_command(&cfg, &outputs).spawn().map_err(|e| {
            ExportError::encoder_unavailable(format!("failed to spawn ffmpeg: {e}"))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ExportError::encoder_unavailable("failed to open ffmpeg stdin (unexpected)")
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            ExportError::encoder_unavailable("failed to open ffmpeg stderr (unexpected)")
        })?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::info!(
            program = %self.opts.program.display(),
            width = cfg.width,
            height = cfg.height,
            fps = %format!("{}/{}", cfg.fps.num, cfg.fps.den),
            quality = cfg.quality,
            outputs = outputs.len(),
            "ffmpeg encoder started"
        );

        self.scratch = if self.opts.flatten_over.is_some() {
            vec![0u8; cfg.frame_len()]
        } else {
            Vec::new()
        };
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.outputs = outputs;
        self.order = FrameOrder::default();
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameBuffer) -> ExportResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ExportError::encoding_failed("ffmpeg sink not started"))?;
        check_frame_size(&frame, cfg)?;
        self.order.check(frame.index())?;

        let bytes = match self.opts.flatten_over {
            Some(bg) => {
                flatten_straight_over_bg_to_opaque_rgba8(&mut self.scratch, frame.data(), bg)?;
                self.scratch.as_slice()
            }
            None => frame.data(),
        };

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ExportError::encoding_failed("ffmpeg sink is already finalized"));
        };
        if let Err(e) = stdin.write_all(bytes) {
            let write_err = format!(
                "failed to write frame {} to ffmpeg stdin: {e}",
                frame.index()
            );
            return Err(self.reap_failed(&write_err));
        }
        Ok(())
    }

    fn finish(&mut self) -> ExportResult<Vec<PathBuf>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ExportError::encoding_failed("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            ExportError::encoding_failed(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = self.drain_stderr();
        self.cfg = None;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ExportError::encoding_failed(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        Ok(std::mem::take(&mut self.outputs))
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "ffmpeg already exited before abort");
            }
            if let Err(e) = child.wait() {
                tracing::warn!(error = %e, "failed to reap aborted ffmpeg process");
            }
            tracing::info!("ffmpeg encoder aborted");
        }
        let stderr = self.drain_stderr();
        if !stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&stderr);
            tracing::debug!(stderr = %stderr.trim(), "ffmpeg output before abort");
        }
        self.cfg = None;
        self.outputs.clear();
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` before `-i` sets the input framerate. Rational FPS as `num/den`.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn flatten_straight_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    bg: Rgba8,
) -> ExportResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ExportError::encoding_failed(
            "flatten_straight_over_bg_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = u16::from(bg.r);
    let bg_g = u16::from(bg.g);
    let bg_b = u16::from(bg.b);

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let r = mul_div255_u16(u16::from(s[0]), a) + mul_div255_u16(bg_r, inv);
        let g = mul_div255_u16(u16::from(s[1]), a) + mul_div255_u16(bg_g, inv);
        let b = mul_div255_u16(u16::from(s[2]), a) + mul_div255_u16(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

/// Return `true` when `program -version` runs successfully.
pub fn is_ffmpeg_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    is_ffmpeg_available(Path::new("ffmpeg"))
}

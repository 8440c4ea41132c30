use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::foundation::core::Fps;
use crate::foundation::error::{ExportError, ExportResult};
use crate::render::backend::FrameBuffer;

/// Configuration provided to an [`EncoderSink`] before the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Frame width in pixels (even).
    pub width: u32,
    /// Frame height in pixels (even).
    pub height: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Quantization parameter; lower means higher quality and larger output. Each codec clamps
    /// it into its own range.
    pub quality: u32,
    /// Base output path; sinks append their codec extension.
    pub out_path: PathBuf,
}

impl SinkConfig {
    /// Checks shared by every codec-backed sink.
    pub fn validate(&self) -> ExportResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::validation(
                "encoder width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(ExportError::validation(
                "encoder width/height must be even (codec macroblock alignment)",
            ));
        }
        self.fps.validate()
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Sink contract for consuming captured frames in sample order.
///
/// Lifecycle: `begin` once, `push_frame` for every sample in strictly increasing index order,
/// then `finish`. `abort` may be called at any point instead of `finish`; it must release every
/// process or file handle the sink holds and must not panic. Output files written before an abort
/// or a failure are left as they are.
pub trait EncoderSink: Send {
    /// Prepare the codec. Fails with [`ExportError::EncoderUnavailable`] when it cannot start.
    fn begin(&mut self, cfg: SinkConfig) -> ExportResult<()>;

    /// Consume one frame. Fails with [`ExportError::EncodingFailed`] on codec errors.
    fn push_frame(&mut self, frame: FrameBuffer) -> ExportResult<()>;

    /// Finalize and return the files written.
    fn finish(&mut self) -> ExportResult<Vec<PathBuf>>;

    /// Tear down after cancellation or an upstream failure.
    fn abort(&mut self);
}

/// `base` with `.ext` appended (`movie` -> `movie.mp4`, `out.v1` -> `out.v1.mp4`).
pub fn output_path(base: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = base.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ExportResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Tracks strictly increasing frame indices.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FrameOrder {
    last: Option<u64>,
}

impl FrameOrder {
    pub(crate) fn check(&mut self, idx: u64) -> ExportResult<()> {
        if let Some(last) = self.last
            && idx <= last
        {
            return Err(ExportError::encoding_failed(format!(
                "received out-of-order frame {idx} after {last}"
            )));
        }
        self.last = Some(idx);
        Ok(())
    }
}

pub(crate) fn check_frame_size(frame: &FrameBuffer, cfg: &SinkConfig) -> ExportResult<()> {
    if frame.width() != cfg.width || frame.height() != cfg.height {
        return Err(ExportError::encoding_failed(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            cfg.width,
            cfg.height
        )));
    }
    Ok(())
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<FrameBuffer>,
    order: FrameOrder,
    finished: bool,
    aborted: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&SinkConfig> {
        self.cfg.as_ref()
    }

    /// Frames in capture order.
    pub fn frames(&self) -> &[FrameBuffer] {
        &self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl EncoderSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ExportResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.order = FrameOrder::default();
        self.finished = false;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameBuffer) -> ExportResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ExportError::encoding_failed("in-memory sink not started"))?;
        check_frame_size(&frame, cfg)?;
        self.order.check(frame.index())?;
        self.frames.push(frame);
        Ok(())
    }

    fn finish(&mut self) -> ExportResult<Vec<PathBuf>> {
        if self.cfg.is_none() {
            return Err(ExportError::encoding_failed("in-memory sink not started"));
        }
        self.finished = true;
        Ok(Vec::new())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(width: u32, height: u32) -> SinkConfig {
        SinkConfig {
            width,
            height,
            fps: Fps::default(),
            quality: 20,
            out_path: PathBuf::from("target/out"),
        }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(cfg(0, 10).validate().is_err());
        assert!(cfg(11, 10).validate().is_err());
        assert!(cfg(10, 9).validate().is_err());
        let mut c = cfg(10, 10);
        c.fps.num = 0;
        assert!(c.validate().is_err());
        assert!(cfg(10, 10).validate().is_ok());
    }

    #[test]
    fn output_path_appends_extension() {
        assert_eq!(
            output_path(Path::new("out/movie"), "mp4"),
            PathBuf::from("out/movie.mp4")
        );
        assert_eq!(
            output_path(Path::new("take.v2"), "webm"),
            PathBuf::from("take.v2.webm")
        );
    }

    #[test]
    fn in_memory_sink_enforces_order_and_size() {
        let mut sink = InMemorySink::new();
        sink.begin(cfg(2, 2)).unwrap();
        sink.push_frame(FrameBuffer::new(0, 2, 2, vec![0; 16]))
            .unwrap();
        sink.push_frame(FrameBuffer::new(1, 2, 2, vec![0; 16]))
            .unwrap();
        assert!(
            sink.push_frame(FrameBuffer::new(1, 2, 2, vec![0; 16]))
                .is_err()
        );
        assert!(
            sink.push_frame(FrameBuffer::new(5, 4, 2, vec![0; 32]))
                .is_err()
        );
        assert!(sink.finish().unwrap().is_empty());
        assert_eq!(sink.frames().len(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn push_before_begin_fails() {
        let mut sink = InMemorySink::new();
        let err = sink
            .push_frame(FrameBuffer::new(0, 2, 2, vec![0; 16]))
            .unwrap_err();
        assert!(matches!(err, ExportError::EncodingFailed(_)));
    }
}

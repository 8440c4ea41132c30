//! Encoder sinks.
//!
//! Sinks consume captured frames in sample order; the export session never knows which variant
//! is active.

/// `ffmpeg`-based sink (MP4/WebM via the system `ffmpeg`).
pub mod ffmpeg;
/// In-process animated GIF sink.
pub mod gif;
/// Sink trait, configuration and the in-memory sink.
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkOpts, OutputFormat, is_ffmpeg_on_path};
pub use gif::{GifSink, GifSinkOpts};
pub use sink::{EncoderSink, InMemorySink, SinkConfig, output_path};

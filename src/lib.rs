#![forbid(unsafe_code)]
//! Deterministic animation-to-video export for 3D molecular viewers.
//!
//! An export job drives a [`RenderContext`] in lock-step: the clock is frozen, each sample time
//! is set explicitly, the scene is drawn synchronously and the viewport pixels are captured and
//! streamed into an [`EncoderSink`]. The viewer's presentation, scene, clock and playback state
//! are restored afterwards whatever the outcome.
//!
//! ```no_run
//! use animcast::{
//!     AnimationManager, AnimationParams, ExportJob, FfmpegSink, RenderContext,
//!     SoftwareRenderer, TaskCtx, run_export,
//! };
//!
//! let mut ctx = RenderContext::new(SoftwareRenderer::new(), AnimationManager::with_builtins());
//! let job = ExportJob::new("camera-spin", 1280, 720, "out/spin")
//!     .with_params(AnimationParams::new().with("duration_ms", 3000));
//! let report = run_export(&mut ctx, &job, &mut FfmpegSink::default(), &mut TaskCtx::new())?;
//! println!("wrote {:?}", report.outputs);
//! # Ok::<(), animcast::ExportError>(())
//! ```

pub mod animation;
pub mod encode;
pub mod foundation;
pub mod presentation;
pub mod render;
pub mod session;

pub use animation::{
    AnimationDef, AnimationInstance, AnimationManager, AnimationParams, AnimationPlayer,
};
pub use encode::{
    EncoderSink, FfmpegSink, FfmpegSinkOpts, GifSink, GifSinkOpts, InMemorySink, OutputFormat,
    SinkConfig,
};
pub use foundation::core::{Fps, NormalizedViewport, Rgba8, Viewport};
pub use foundation::error::{ExportError, ExportResult};
pub use presentation::guard::{PresentationSnapshot, StateGuard};
pub use presentation::{PostprocessProps, PresentationState};
pub use render::{
    Camera, Clock, FrameBuffer, RenderContext, Renderer, SceneFrame, SceneState,
    SoftwareRenderer, SoftwareRendererOpts, TickOpts,
};
pub use session::{
    CancelToken, CustomBackground, ExportJob, ExportOpts, ExportReport, Progress, SampleSchedule,
    TaskCtx, render_still, run_batch, run_export, run_export_with_opts,
};

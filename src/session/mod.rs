//! Export jobs and the frame sampler that drives them.

/// Frame sampler, batch runner and single-frame capture.
pub mod export;
/// Job description and validation.
pub mod job;
/// Sample schedule derived from duration and frame rate.
pub mod schedule;
/// Progress reporting and cooperative cancellation.
pub mod task;

pub use export::{
    ExportOpts, ExportReport, render_still, run_batch, run_export, run_export_with_opts,
};
pub use job::{CustomBackground, ExportJob};
pub use schedule::SampleSchedule;
pub use task::{CancelToken, Progress, TaskCtx};

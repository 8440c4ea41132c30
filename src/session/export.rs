use std::path::PathBuf;
use std::sync::mpsc;

use crate::encode::sink::{EncoderSink, SinkConfig};
use crate::foundation::core::NormalizedViewport;
use crate::foundation::error::{ExportError, ExportResult};
use crate::presentation::guard::StateGuard;
use crate::render::backend::{FrameBuffer, TickOpts};
use crate::render::context::RenderContext;
use crate::session::job::ExportJob;
use crate::session::schedule::SampleSchedule;
use crate::session::task::{Progress, TaskCtx};

/// Frames buffered between the sampler and the encoder thread.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Tuning knobs for [`run_export_with_opts`].
#[derive(Clone, Debug)]
pub struct ExportOpts {
    /// Bounded channel capacity between sampling and encoding (clamped to at least 1).
    pub channel_capacity: usize,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Result of one finished export.
#[derive(Clone, Debug)]
pub struct ExportReport {
    /// Files written by the sink.
    pub outputs: Vec<PathBuf>,
    pub schedule: SampleSchedule,
    pub viewport: NormalizedViewport,
    pub frames_captured: u64,
}

/// Export one animation through `sink` with default [`ExportOpts`].
pub fn run_export(
    ctx: &mut RenderContext,
    job: &ExportJob,
    sink: &mut dyn EncoderSink,
    task: &mut TaskCtx<'_>,
) -> ExportResult<ExportReport> {
    run_export_with_opts(ctx, job, sink, task, &ExportOpts::default())
}

/// Export one animation: sample it deterministically at the job's frame rate and stream every
/// captured frame into `sink`.
///
/// Validation, duration lookup and `sink.begin` all happen before any viewer state is touched.
/// From then on the context's presentation, scene, clock and playback state are restored on every
/// exit path, including errors and cancellation.
#[tracing::instrument(
    skip_all,
    fields(animation = %job.animation, out = %job.out_path.display())
)]
pub fn run_export_with_opts(
    ctx: &mut RenderContext,
    job: &ExportJob,
    sink: &mut dyn EncoderSink,
    task: &mut TaskCtx<'_>,
    opts: &ExportOpts,
) -> ExportResult<ExportReport> {
    let viewport = job.validate()?;
    let schedule = resolve_schedule(ctx, job)?;

    sink.begin(SinkConfig {
        width: viewport.width(),
        height: viewport.height(),
        fps: job.fps,
        quality: job.quality,
        out_path: job.out_path.clone(),
    })?;

    tracing::info!(
        samples = schedule.sample_count,
        step_ms = schedule.step_ms,
        width = viewport.width(),
        height = viewport.height(),
        "export started"
    );

    let res = {
        let mut guard = StateGuard::new(ctx);
        let snapshot = guard.snapshot();
        tracing::debug!(
            was_animating = snapshot.was_animating,
            clock_time_ms = snapshot.clock_time_ms,
            "viewer state captured"
        );
        let res = sample_and_encode(&mut guard, job, viewport, &schedule, sink, task, opts);
        guard.release();
        res
    };

    match res {
        Ok(outputs) => {
            tracing::info!(frames = schedule.frame_count(), ?outputs, "export finished");
            Ok(ExportReport {
                outputs,
                schedule,
                viewport,
                frames_captured: schedule.frame_count(),
            })
        }
        Err(ExportError::Cancelled) => {
            tracing::warn!("export cancelled");
            Err(ExportError::Cancelled)
        }
        Err(e) => {
            tracing::error!(error = %e, "export failed");
            Err(e)
        }
    }
}

/// Run `jobs` one after another on the same context.
///
/// Stops at the first failing job; earlier jobs' outputs stay on disk. `make_sink` is called once
/// per job, right before it runs.
pub fn run_batch<F>(
    ctx: &mut RenderContext,
    jobs: &[ExportJob],
    mut make_sink: F,
    task: &mut TaskCtx<'_>,
) -> ExportResult<Vec<ExportReport>>
where
    F: FnMut(&ExportJob) -> ExportResult<Box<dyn EncoderSink>>,
{
    let mut reports = Vec::with_capacity(jobs.len());
    for (i, job) in jobs.iter().enumerate() {
        if task.cancel_token().is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        tracing::info!(job = i + 1, total = jobs.len(), animation = %job.animation, "batch job");
        let mut sink = make_sink(job)?;
        reports.push(run_export(ctx, job, sink.as_mut(), task)?);
    }
    Ok(reports)
}

/// Render a single sample of a job's schedule and return the captured frame.
///
/// Applies the same overrides and restores the same state as a full export, without an encoder.
pub fn render_still(
    ctx: &mut RenderContext,
    job: &ExportJob,
    sample_index: u64,
) -> ExportResult<FrameBuffer> {
    let viewport = job.validate()?;
    let schedule = resolve_schedule(ctx, job)?;
    if sample_index > schedule.sample_count {
        return Err(ExportError::validation(format!(
            "sample {sample_index} is outside 0..={}",
            schedule.sample_count
        )));
    }

    let mut guard = StateGuard::new(ctx);
    let res = capture_sample(&mut guard, job, viewport, &schedule, sample_index);
    guard.release();
    res
}

fn capture_sample(
    ctx: &mut RenderContext,
    job: &ExportJob,
    viewport: NormalizedViewport,
    schedule: &SampleSchedule,
    sample_index: u64,
) -> ExportResult<FrameBuffer> {
    prepare(ctx, job)?;
    ctx.tick(schedule.timestamp_ms(sample_index), TickOpts::EXPORT)?;
    let frame = ctx.capture(sample_index, job.width, job.height, viewport)?;
    ctx.player_mut().stop()?;
    Ok(frame)
}

fn resolve_schedule(ctx: &RenderContext, job: &ExportJob) -> ExportResult<SampleSchedule> {
    match ctx.player().duration_ms(&job.animation, &job.params)? {
        Some(duration_ms) => SampleSchedule::new(duration_ms, job.fps),
        None => Err(ExportError::duration_undefined(format!(
            "animation '{}' has no finite duration with these parameters",
            job.animation
        ))),
    }
}

/// Freeze the clock at zero, apply the job's presentation overrides and start playback.
fn prepare(ctx: &mut RenderContext, job: &ExportJob) -> ExportResult<()> {
    let clock = ctx.clock_mut();
    clock.stop();
    clock.reset();

    if let Some(bg) = job.custom_background {
        let p = ctx.presentation_mut();
        p.background = bg.color;
        p.transparent_background = bg.transparent;
    }
    if let Some(overrides) = &job.postprocessing {
        let merged = ctx.renderer().postprocess_defaults().merged(overrides);
        ctx.presentation_mut().postprocessing = merged;
    }

    ctx.player_mut().play(&job.animation, &job.params)
}

enum EncoderOutcome {
    Finished(Vec<PathBuf>),
    Aborted,
}

fn sample_and_encode(
    ctx: &mut RenderContext,
    job: &ExportJob,
    viewport: NormalizedViewport,
    schedule: &SampleSchedule,
    sink: &mut dyn EncoderSink,
    task: &mut TaskCtx<'_>,
    opts: &ExportOpts,
) -> ExportResult<Vec<PathBuf>> {
    if let Err(e) = prepare(ctx, job) {
        sink.abort();
        return Err(e);
    }

    // Sampling stays on this thread (the renderer is not `Send`); encoding overlaps with it.
    std::thread::scope(|scope| -> ExportResult<Vec<PathBuf>> {
        let (tx, rx) = mpsc::sync_channel::<FrameBuffer>(opts.channel_capacity.max(1));
        let expected = schedule.frame_count();
        let enc = scope.spawn(move || encode_frames(sink, rx, expected));

        let produce_res = produce(ctx, job, viewport, schedule, task, &tx);
        drop(tx);
        let stop_res = ctx.player_mut().stop();

        let enc_res = enc
            .join()
            .map_err(|_| ExportError::encoding_failed("encoder thread panicked"))?;

        match (produce_res, enc_res) {
            // The encoder's failure is the root cause of any send failure on this side.
            (_, Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Ok(()), Ok(EncoderOutcome::Aborted)) => Err(ExportError::encoding_failed(
                "encoder stopped before all frames were delivered",
            )),
            (Ok(()), Ok(EncoderOutcome::Finished(outputs))) => {
                stop_res?;
                Ok(outputs)
            }
        }
    })
}

fn produce(
    ctx: &mut RenderContext,
    job: &ExportJob,
    viewport: NormalizedViewport,
    schedule: &SampleSchedule,
    task: &mut TaskCtx<'_>,
    tx: &mpsc::SyncSender<FrameBuffer>,
) -> ExportResult<()> {
    let total = schedule.frame_count();
    for i in 0..=schedule.sample_count {
        task.checkpoint(Progress { current: i, total })?;
        ctx.tick(schedule.timestamp_ms(i), TickOpts::EXPORT)?;
        let frame = ctx.capture(i, job.width, job.height, viewport)?;
        tracing::debug!(sample = i, time_ms = schedule.timestamp_ms(i), "frame captured");
        tx.send(frame)
            .map_err(|_| ExportError::encoding_failed("encoder thread is not accepting frames"))?;
    }
    Ok(())
}

/// Encoder thread body. Delivers frames in arrival (= sample) order and finalizes the sink once
/// every expected frame arrived; a short stream means the sampler gave up, so the sink is aborted.
fn encode_frames(
    sink: &mut dyn EncoderSink,
    rx: mpsc::Receiver<FrameBuffer>,
    expected: u64,
) -> ExportResult<EncoderOutcome> {
    let mut received = 0u64;
    for frame in rx.iter() {
        if let Err(e) = sink.push_frame(frame) {
            sink.abort();
            return Err(as_encoding_failure(e));
        }
        received += 1;
    }

    if received < expected {
        tracing::debug!(received, expected, "frame stream ended early, aborting encoder");
        sink.abort();
        return Ok(EncoderOutcome::Aborted);
    }

    match sink.finish() {
        Ok(outputs) => Ok(EncoderOutcome::Finished(outputs)),
        Err(e) => {
            sink.abort();
            Err(as_encoding_failure(e))
        }
    }
}

fn as_encoding_failure(e: ExportError) -> ExportError {
    match e {
        ExportError::EncodingFailed(_) | ExportError::Cancelled => e,
        other => ExportError::encoding_failed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationManager, AnimationParams};
    use crate::encode::sink::InMemorySink;
    use crate::foundation::core::{Fps, Rgba8};
    use crate::render::software::SoftwareRenderer;
    use crate::session::job::CustomBackground;

    fn ctx() -> RenderContext {
        RenderContext::new(SoftwareRenderer::new(), AnimationManager::with_builtins())
    }

    fn spin_job(duration_ms: u32) -> ExportJob {
        ExportJob::new("camera-spin", 16, 12, "target/unused")
            .with_params(AnimationParams::new().with("duration_ms", duration_ms))
            .with_fps(Fps::new(10, 1).unwrap())
    }

    #[test]
    fn export_streams_every_sample() {
        let mut ctx = ctx();
        let mut sink = InMemorySink::new();
        let report = run_export(&mut ctx, &spin_job(500), &mut sink, &mut TaskCtx::new()).unwrap();

        assert_eq!(report.schedule.sample_count, 5);
        assert_eq!(report.frames_captured, 6);
        assert!(sink.is_finished());
        let idx: Vec<u64> = sink.frames().iter().map(|f| f.index()).collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5]);
        assert!(sink.frames().iter().all(|f| f.width() == 16 && f.height() == 12));
    }

    #[test]
    fn export_restores_viewer_state() {
        let mut ctx = ctx();
        ctx.clock_mut().set_time(1234.0);
        let before_presentation = ctx.presentation().clone();
        let before_scene = ctx.scene().clone();

        let job = spin_job(300).with_background(CustomBackground::opaque(Rgba8::WHITE));
        run_export(&mut ctx, &job, &mut InMemorySink::new(), &mut TaskCtx::new()).unwrap();

        assert_eq!(ctx.presentation(), &before_presentation);
        assert_eq!(ctx.scene(), &before_scene);
        assert_eq!(ctx.clock().time_ms(), 1234.0);
        assert!(ctx.clock().is_running());
        assert!(!ctx.player().is_playing());
    }

    #[test]
    fn unknown_animation_fails_before_sink_begins() {
        let mut ctx = ctx();
        let mut sink = InMemorySink::new();
        let job = ExportJob::new("no-such-animation", 8, 8, "target/unused");
        let err = run_export(&mut ctx, &job, &mut sink, &mut TaskCtx::new()).unwrap_err();
        assert!(matches!(err, ExportError::AnimationNotFound(_)));
        assert!(sink.config().is_none());
    }

    #[test]
    fn still_matches_sampled_frame() {
        let job = spin_job(400);

        let mut sink = InMemorySink::new();
        run_export(&mut ctx(), &job, &mut sink, &mut TaskCtx::new()).unwrap();

        let still = render_still(&mut ctx(), &job, 2).unwrap();
        assert_eq!(still.index(), 2);
        assert_eq!(still.data(), sink.frames()[2].data());

        assert!(render_still(&mut ctx(), &job, 99).is_err());
    }

    #[test]
    fn batch_runs_jobs_in_order() {
        let mut ctx = ctx();
        let jobs = vec![spin_job(100), spin_job(200)];
        let mut made = 0;
        let reports = run_batch(
            &mut ctx,
            &jobs,
            |_| {
                made += 1;
                Ok(Box::new(InMemorySink::new()))
            },
            &mut TaskCtx::new(),
        )
        .unwrap();
        assert_eq!(made, 2);
        assert_eq!(reports[0].frames_captured, 2);
        assert_eq!(reports[1].frames_captured, 3);
    }
}

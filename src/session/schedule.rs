use crate::foundation::core::Fps;
use crate::foundation::error::{ExportError, ExportResult};

/// Upper bound on samples per job; guards against absurd durations or frame rates.
pub const MAX_SAMPLES: u64 = 1_000_000;

/// Sampling plan for one job: how many samples and how far apart in simulation time.
///
/// Sample `i` is taken at `i * step_ms` for `i` in `0..=sample_count`, so a schedule yields
/// `sample_count + 1` frames covering both `t = 0` and `t = duration_ms`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleSchedule {
    pub duration_ms: f64,
    pub fps: Fps,
    pub sample_count: u64,
    pub step_ms: f64,
}

impl SampleSchedule {
    pub fn new(duration_ms: f64, fps: Fps) -> ExportResult<Self> {
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Err(ExportError::duration_undefined(format!(
                "duration must be a positive finite number of milliseconds, got {duration_ms}"
            )));
        }
        fps.validate()?;

        let samples = (duration_ms / 1000.0 * fps.as_f64()).ceil();
        if samples > MAX_SAMPLES as f64 {
            return Err(ExportError::validation(format!(
                "{samples} samples exceed the limit of {MAX_SAMPLES}"
            )));
        }
        let sample_count = (samples as u64).max(1);
        Ok(Self {
            duration_ms,
            fps,
            sample_count,
            step_ms: duration_ms / sample_count as f64,
        })
    }

    /// Frames produced by the schedule (`sample_count + 1`).
    pub fn frame_count(&self) -> u64 {
        self.sample_count + 1
    }

    /// Simulation time of sample `i`.
    pub fn timestamp_ms(&self, i: u64) -> f64 {
        i as f64 * self.step_ms
    }
}

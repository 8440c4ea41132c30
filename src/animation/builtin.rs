use std::f64::consts::TAU;
use std::sync::Arc;

use crate::animation::player::{AnimationDef, AnimationInstance, AnimationParams};
use crate::foundation::error::{ExportError, ExportResult};
use crate::render::scene::{Camera, SceneState};

pub(crate) fn all() -> Vec<Arc<dyn AnimationDef>> {
    vec![
        Arc::new(CameraSpin),
        Arc::new(CameraRock),
        Arc::new(StateSnapshots),
        Arc::new(ModelIndex),
    ]
}

fn default_duration_ms() -> f64 {
    4000.0
}

fn default_speed() -> f64 {
    1.0
}

fn progress(time_ms: f64, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return 1.0;
    }
    (time_ms / duration_ms).clamp(0.0, 1.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum SpinDirection {
    #[default]
    Cw,
    Ccw,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SpinParams {
    #[serde(default = "default_duration_ms")]
    duration_ms: f64,
    /// Full turns per duration.
    #[serde(default = "default_speed")]
    speed: f64,
    #[serde(default)]
    direction: SpinDirection,
}

/// Full turns of the camera around the vertical axis.
struct CameraSpin;

impl AnimationDef for CameraSpin {
    fn name(&self) -> &str {
        "camera-spin"
    }

    fn description(&self) -> &str {
        "rotate the camera around the scene (duration_ms, speed, direction=cw|ccw)"
    }

    fn instantiate(&self, params: &AnimationParams) -> ExportResult<Box<dyn AnimationInstance>> {
        let p: SpinParams = params.parse(self.name())?;
        Ok(Box::new(p))
    }
}

impl AnimationInstance for SpinParams {
    fn duration_ms(&self) -> Option<f64> {
        Some(self.duration_ms)
    }

    fn apply(&self, time_ms: f64, base: &SceneState, scene: &mut SceneState) {
        let sign = match self.direction {
            SpinDirection::Cw => 1.0,
            SpinDirection::Ccw => -1.0,
        };
        let t = progress(time_ms, self.duration_ms);
        scene.camera.yaw_deg = base.camera.yaw_deg + sign * 360.0 * self.speed * t;
    }
}

fn default_rock_angle() -> f64 {
    10.0
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RockParams {
    #[serde(default = "default_duration_ms")]
    duration_ms: f64,
    /// Swings per duration.
    #[serde(default = "default_speed")]
    speed: f64,
    #[serde(default = "default_rock_angle")]
    angle_deg: f64,
}

/// Sinusoidal back-and-forth camera swing.
struct CameraRock;

impl AnimationDef for CameraRock {
    fn name(&self) -> &str {
        "camera-rock"
    }

    fn description(&self) -> &str {
        "rock the camera back and forth (duration_ms, speed, angle_deg)"
    }

    fn instantiate(&self, params: &AnimationParams) -> ExportResult<Box<dyn AnimationInstance>> {
        let p: RockParams = params.parse(self.name())?;
        Ok(Box::new(p))
    }
}

impl AnimationInstance for RockParams {
    fn duration_ms(&self) -> Option<f64> {
        Some(self.duration_ms)
    }

    fn apply(&self, time_ms: f64, base: &SceneState, scene: &mut SceneState) {
        let t = progress(time_ms, self.duration_ms);
        scene.camera.yaw_deg = base.camera.yaw_deg + self.angle_deg * (TAU * self.speed * t).sin();
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotDef {
    duration_ms: f64,
    /// Leading part of `duration_ms` spent interpolating from the previous snapshot.
    #[serde(default)]
    transition_ms: f64,
    #[serde(default)]
    camera: Option<Camera>,
    #[serde(default)]
    model_index: Option<usize>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotParams {
    #[serde(default)]
    snapshots: Vec<SnapshotDef>,
}

/// Plays a list of stored snapshots back to back.
struct StateSnapshots;

impl AnimationDef for StateSnapshots {
    fn name(&self) -> &str {
        "state-snapshots"
    }

    fn description(&self) -> &str {
        "play stored view snapshots in order (snapshots: [{duration_ms, transition_ms, camera, model_index}])"
    }

    fn instantiate(&self, params: &AnimationParams) -> ExportResult<Box<dyn AnimationInstance>> {
        let p: SnapshotParams = params.parse(self.name())?;
        for (i, s) in p.snapshots.iter().enumerate() {
            if !(s.duration_ms.is_finite() && s.duration_ms > 0.0) {
                return Err(ExportError::validation(format!(
                    "snapshot {i} duration_ms must be positive"
                )));
            }
            if !(0.0..=s.duration_ms).contains(&s.transition_ms) {
                return Err(ExportError::validation(format!(
                    "snapshot {i} transition_ms must be within [0, duration_ms]"
                )));
            }
        }
        Ok(Box::new(p))
    }
}

impl AnimationInstance for SnapshotParams {
    fn duration_ms(&self) -> Option<f64> {
        if self.snapshots.is_empty() {
            return None;
        }
        Some(self.snapshots.iter().map(|s| s.duration_ms).sum())
    }

    fn apply(&self, time_ms: f64, base: &SceneState, scene: &mut SceneState) {
        let mut start = 0.0;
        let mut prev_camera = base.camera;
        for (i, s) in self.snapshots.iter().enumerate() {
            let end = start + s.duration_ms;
            let target = s.camera.unwrap_or(prev_camera);
            let last = i + 1 == self.snapshots.len();
            if time_ms < end || last {
                let local = (time_ms - start).max(0.0);
                scene.camera = if s.transition_ms > 0.0 {
                    prev_camera.lerp(&target, local / s.transition_ms)
                } else {
                    target
                };
                if let Some(m) = s.model_index {
                    scene.model_index = m;
                }
                return;
            }
            prev_camera = target;
            start = end;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModelIndexMode {
    #[default]
    Once,
    Loop,
    Palindrome,
}

fn default_frame_ms() -> f64 {
    100.0
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelIndexParams {
    #[serde(default)]
    mode: ModelIndexMode,
    model_count: usize,
    #[serde(default = "default_frame_ms")]
    frame_ms: f64,
    /// Number of passes for `loop`/`palindrome`. `loop` without cycles never ends.
    #[serde(default)]
    cycles: Option<u32>,
}

impl ModelIndexParams {
    fn steps_per_cycle(&self) -> usize {
        match self.mode {
            ModelIndexMode::Once | ModelIndexMode::Loop => self.model_count,
            ModelIndexMode::Palindrome => {
                self.model_count.saturating_mul(2).saturating_sub(2).max(1)
            }
        }
    }
}

/// Steps through the models of a trajectory.
struct ModelIndex;

impl AnimationDef for ModelIndex {
    fn name(&self) -> &str {
        "model-index"
    }

    fn description(&self) -> &str {
        "step through trajectory models (model_count, mode=once|loop|palindrome, frame_ms, cycles)"
    }

    fn instantiate(&self, params: &AnimationParams) -> ExportResult<Box<dyn AnimationInstance>> {
        let p: ModelIndexParams = params.parse(self.name())?;
        if p.model_count == 0 {
            return Err(ExportError::validation("model-index model_count must be >= 1"));
        }
        if !(p.frame_ms.is_finite() && p.frame_ms > 0.0) {
            return Err(ExportError::validation("model-index frame_ms must be positive"));
        }
        Ok(Box::new(p))
    }
}

impl AnimationInstance for ModelIndexParams {
    fn duration_ms(&self) -> Option<f64> {
        let steps = self.steps_per_cycle() as f64;
        match (self.mode, self.cycles) {
            (ModelIndexMode::Once, _) => Some(steps * self.frame_ms),
            (_, Some(cycles)) => Some(f64::from(cycles) * steps * self.frame_ms),
            (ModelIndexMode::Loop, None) => None,
            (ModelIndexMode::Palindrome, None) => Some(steps * self.frame_ms),
        }
    }

    fn apply(&self, time_ms: f64, _base: &SceneState, scene: &mut SceneState) {
        let step = (time_ms.max(0.0) / self.frame_ms).floor() as usize;
        let n = self.model_count;
        scene.model_index = match self.mode {
            ModelIndexMode::Once => step.min(n - 1),
            ModelIndexMode::Loop => step % n,
            ModelIndexMode::Palindrome => {
                let period = self.steps_per_cycle();
                let k = step % period;
                if k < n { k } else { period - k }
            }
        };
    }
}

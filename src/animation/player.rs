use std::collections::BTreeMap;
use std::sync::Arc;

use crate::animation::builtin;
use crate::foundation::error::{ExportError, ExportResult};
use crate::render::scene::SceneState;

/// Free-form animation parameters (a JSON object).
///
/// Each definition reads its own typed parameters out of this map; missing fields take the
/// definition's defaults.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AnimationParams(serde_json::Map<String, serde_json::Value>);

impl AnimationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Deserialize into a definition's typed parameter struct.
    pub fn parse<T: serde::de::DeserializeOwned>(&self, animation: &str) -> ExportResult<T> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone())).map_err(|e| {
            ExportError::validation(format!("invalid parameters for '{animation}': {e}"))
        })
    }
}

/// A named, parameterizable animation.
pub trait AnimationDef: Send + Sync {
    /// Registry name (e.g. `camera-spin`).
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Bind parameters, validating them.
    fn instantiate(&self, params: &AnimationParams) -> ExportResult<Box<dyn AnimationInstance>>;
}

/// An animation definition bound to concrete parameters.
pub trait AnimationInstance: Send {
    /// Total duration in milliseconds, or `None` when the animation is open-ended.
    fn duration_ms(&self) -> Option<f64>;

    /// Write the animated state at `time_ms` into `scene`, relative to the scene as it was
    /// when playback started (`base`).
    fn apply(&self, time_ms: f64, base: &SceneState, scene: &mut SceneState);
}

/// Contract the export pipeline needs from an animation manager.
pub trait AnimationPlayer {
    /// Duration of `name` bound to `params`. Pure query.
    ///
    /// Fails with [`ExportError::AnimationNotFound`] when `name` is not registered.
    fn duration_ms(&self, name: &str, params: &AnimationParams) -> ExportResult<Option<f64>>;

    /// Start playing `name`; replaces any animation already playing.
    fn play(&mut self, name: &str, params: &AnimationParams) -> ExportResult<()>;

    /// Stop playback. Stopping an idle player is a no-op.
    fn stop(&mut self) -> ExportResult<()>;

    fn is_playing(&self) -> bool;

    /// Apply the playing animation (if any) at `time_ms`.
    fn apply(&mut self, time_ms: f64, scene: &mut SceneState);
}

struct ActiveAnimation {
    name: String,
    instance: Box<dyn AnimationInstance>,
    base: Option<SceneState>,
}

/// Registry of animation definitions plus the single animation currently playing.
pub struct AnimationManager {
    defs: BTreeMap<String, Arc<dyn AnimationDef>>,
    active: Option<ActiveAnimation>,
}

impl Default for AnimationManager {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AnimationManager {
    /// A manager without any registered definitions.
    pub fn empty() -> Self {
        Self {
            defs: BTreeMap::new(),
            active: None,
        }
    }

    /// A manager with the built-in camera, snapshot and model-index animations.
    pub fn with_builtins() -> Self {
        let mut m = Self::empty();
        for def in builtin::all() {
            m.register(def);
        }
        m
    }

    /// Register (or replace) a definition under its name.
    pub fn register(&mut self, def: Arc<dyn AnimationDef>) {
        self.defs.insert(def.name().to_owned(), def);
    }

    /// Registered definitions, sorted by name.
    pub fn definitions(&self) -> impl Iterator<Item = &dyn AnimationDef> {
        self.defs.values().map(|d| d.as_ref())
    }

    /// Name of the animation currently playing.
    pub fn playing(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    fn resolve(&self, name: &str) -> ExportResult<&Arc<dyn AnimationDef>> {
        self.defs
            .get(name)
            .ok_or_else(|| ExportError::animation_not_found(name))
    }
}

impl AnimationPlayer for AnimationManager {
    fn duration_ms(&self, name: &str, params: &AnimationParams) -> ExportResult<Option<f64>> {
        let def = self.resolve(name)?;
        Ok(def.instantiate(params)?.duration_ms())
    }

    fn play(&mut self, name: &str, params: &AnimationParams) -> ExportResult<()> {
        let instance = self.resolve(name)?.instantiate(params)?;
        tracing::debug!(animation = name, "animation playback started");
        self.active = Some(ActiveAnimation {
            name: name.to_owned(),
            instance,
            base: None,
        });
        Ok(())
    }

    fn stop(&mut self) -> ExportResult<()> {
        if let Some(active) = self.active.take() {
            tracing::debug!(animation = %active.name, "animation playback stopped");
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    fn apply(&mut self, time_ms: f64, scene: &mut SceneState) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let base = active.base.get_or_insert_with(|| scene.clone());
        active.instance.apply(time_ms, base, scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_animation_is_reported() {
        let m = AnimationManager::with_builtins();
        let err = m
            .duration_ms("does-not-exist", &AnimationParams::new())
            .unwrap_err();
        assert!(matches!(err, ExportError::AnimationNotFound(ref n) if n == "does-not-exist"));
    }

    #[test]
    fn builtins_are_registered() {
        let m = AnimationManager::with_builtins();
        let names = m.definitions().map(|d| d.name().to_owned()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["camera-rock", "camera-spin", "model-index", "state-snapshots"]
        );
    }

    #[test]
    fn play_stop_lifecycle() {
        let mut m = AnimationManager::with_builtins();
        assert!(!m.is_playing());
        m.play("camera-spin", &AnimationParams::new().with("duration_ms", 1000))
            .unwrap();
        assert!(m.is_playing());
        assert_eq!(m.playing(), Some("camera-spin"));

        let mut scene = SceneState::default();
        m.apply(500.0, &mut scene);
        assert!((scene.camera.yaw_deg - 180.0).abs() < 1e-9);

        m.stop().unwrap();
        m.stop().unwrap();
        assert!(!m.is_playing());

        // Idle player leaves the scene untouched.
        let before = scene.clone();
        m.apply(900.0, &mut scene);
        assert_eq!(scene, before);
    }

    #[test]
    fn animation_is_relative_to_scene_at_first_apply() {
        let mut m = AnimationManager::with_builtins();
        let mut scene = SceneState::default();
        scene.camera.yaw_deg = 30.0;
        m.play("camera-spin", &AnimationParams::new().with("duration_ms", 1000))
            .unwrap();
        m.apply(0.0, &mut scene);
        assert_eq!(scene.camera.yaw_deg, 30.0);
        m.apply(250.0, &mut scene);
        assert!((scene.camera.yaw_deg - 120.0).abs() < 1e-9);
    }

    #[test]
    fn params_parse_errors_are_validation_errors() {
        let m = AnimationManager::with_builtins();
        let err = m
            .duration_ms(
                "camera-spin",
                &AnimationParams::new().with("duration_ms", "long"),
            )
            .unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
    }
}

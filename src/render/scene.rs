/// Orbit camera around the scene origin.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Camera {
    /// Rotation around the vertical axis, in degrees.
    pub yaw_deg: f64,
    /// Rotation around the horizontal axis, in degrees.
    pub pitch_deg: f64,
    /// Distance from the origin in scene units.
    pub distance: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            pitch_deg: 20.0,
            distance: 6.0,
        }
    }
}

impl Camera {
    /// Linear interpolation between two cameras (`t` in `[0, 1]`).
    pub fn lerp(&self, other: &Camera, t: f64) -> Camera {
        let t = t.clamp(0.0, 1.0);
        Camera {
            yaw_deg: self.yaw_deg + (other.yaw_deg - self.yaw_deg) * t,
            pitch_deg: self.pitch_deg + (other.pitch_deg - self.pitch_deg) * t,
            distance: self.distance + (other.distance - self.distance) * t,
        }
    }
}

/// Mutable scene content driven by animations (as opposed to presentation state).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneState {
    pub camera: Camera,
    /// Active model (trajectory frame) index.
    pub model_index: usize,
}

use std::path::{Path, PathBuf};

use crate::animation::AnimationParams;
use crate::foundation::core::{Fps, NormalizedViewport, Rgba8, Viewport};
use crate::foundation::error::{ExportError, ExportResult};
use crate::presentation::PostprocessProps;

/// Default quantization parameter (x264's default CRF).
pub const DEFAULT_QUALITY: u32 = 23;

fn default_quality() -> u32 {
    DEFAULT_QUALITY
}

/// Background used for the duration of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomBackground {
    pub color: Rgba8,
    /// Keep the background transparent anyway. Defaults to `false`: choosing a custom background
    /// turns transparency off unless this is set explicitly.
    #[serde(default)]
    pub transparent: bool,
}

impl CustomBackground {
    /// Opaque custom background.
    pub fn opaque(color: Rgba8) -> Self {
        Self {
            color,
            transparent: false,
        }
    }
}

/// Description of one animation export.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportJob {
    /// Registered animation name.
    pub animation: String,
    #[serde(default)]
    pub params: AnimationParams,
    /// Render target width in pixels.
    pub width: u32,
    /// Render target height in pixels.
    pub height: u32,
    /// Capture rectangle inside the target; the whole target when absent.
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub fps: Fps,
    /// Quantization parameter; lower is higher quality.
    #[serde(default = "default_quality")]
    pub quality: u32,
    /// Base output path; encoders append their extension.
    pub out_path: PathBuf,
    #[serde(default)]
    pub custom_background: Option<CustomBackground>,
    /// Merged over the renderer's pass defaults for the duration of the job.
    #[serde(default)]
    pub postprocessing: Option<PostprocessProps>,
}

impl ExportJob {
    pub fn new(
        animation: impl Into<String>,
        width: u32,
        height: u32,
        out_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            animation: animation.into(),
            params: AnimationParams::default(),
            width,
            height,
            viewport: None,
            fps: Fps::default(),
            quality: DEFAULT_QUALITY,
            out_path: out_path.into(),
            custom_background: None,
            postprocessing: None,
        }
    }

    pub fn with_params(mut self, params: AnimationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_fps(mut self, fps: Fps) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_background(mut self, background: CustomBackground) -> Self {
        self.custom_background = Some(background);
        self
    }

    pub fn with_postprocessing(mut self, overrides: PostprocessProps) -> Self {
        self.postprocessing = Some(overrides);
        self
    }

    /// Load a job from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> ExportResult<Self> {
        use anyhow::Context as _;
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .with_context(|| format!("open job file '{}'", path.display()))?;
        serde_json::from_reader(std::io::BufReader::new(f))
            .map_err(|e| ExportError::validation(format!("parse job '{}': {e}", path.display())))
    }

    /// Capture rectangle as requested (the full target when unset).
    pub fn viewport(&self) -> Viewport {
        self.viewport
            .unwrap_or_else(|| Viewport::full(self.width, self.height))
    }

    /// Check geometry and timing and derive the even-aligned capture rectangle.
    ///
    /// Runs before anything touches the renderer or the encoder.
    pub fn validate(&self) -> ExportResult<NormalizedViewport> {
        if self.animation.trim().is_empty() {
            return Err(ExportError::validation("animation name must not be empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ExportError::validation(
                "target width/height must be non-zero",
            ));
        }
        self.fps.validate()?;

        let viewport = self.viewport();
        viewport.validate_within(self.width, self.height)?;
        let normalized = viewport.normalized();
        if normalized.is_empty() {
            return Err(ExportError::validation(format!(
                "viewport {}x{} is smaller than 2x2 after even alignment",
                viewport.width, viewport.height
            )));
        }
        Ok(normalized)
    }
}

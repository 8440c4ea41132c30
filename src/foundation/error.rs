pub type ExportResult<T> = Result<T, ExportError>;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("animation not found: {0}")]
    AnimationNotFound(String),

    #[error("duration undefined: {0}")]
    DurationUndefined(String),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("export cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn animation_not_found(name: impl Into<String>) -> Self {
        Self::AnimationNotFound(name.into())
    }

    pub fn duration_undefined(msg: impl Into<String>) -> Self {
        Self::DurationUndefined(msg.into())
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable(msg.into())
    }

    pub fn encoding_failed(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

//! Presentation state (background, transparency, post-processing) and its restoration guard.

/// Snapshot/restore discipline around an export job.
pub mod guard;

use std::collections::BTreeMap;

use crate::foundation::core::Rgba8;
use crate::foundation::error::{ExportError, ExportResult};

/// Post-processing pass properties keyed by name.
///
/// Kept as an open key/value map so renderers can expose their own passes; overrides are merged
/// key by key with [`PostprocessProps::merged`].
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PostprocessProps(BTreeMap<String, serde_json::Value>);

impl PostprocessProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(serde_json::Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` with `overrides` applied on top; override values win on key collision.
    pub fn merged(&self, overrides: &PostprocessProps) -> PostprocessProps {
        let mut out = self.clone();
        for (k, v) in &overrides.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Parse a `key=value` pair; the value is read as JSON and falls back to a plain string.
    pub fn parse_assignment(s: &str) -> ExportResult<(String, serde_json::Value)> {
        let (key, value) = s.split_once('=').ok_or_else(|| {
            ExportError::validation(format!("'{s}' must be key=value"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ExportError::validation(format!(
                "'{s}' has an empty key"
            )));
        }
        let value = value.trim();
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
        Ok((key.to_owned(), value))
    }
}

impl FromIterator<(String, serde_json::Value)> for PostprocessProps {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Mutable visual configuration, distinct from scene and animation content.
#[derive(Clone, Debug, PartialEq)]
pub struct PresentationState {
    pub background: Rgba8,
    pub transparent_background: bool,
    pub postprocessing: PostprocessProps,
}

impl PresentationState {
    pub fn new(background: Rgba8, postprocessing: PostprocessProps) -> Self {
        Self {
            background,
            transparent_background: false,
            postprocessing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_on_collision() {
        let defaults = PostprocessProps::new()
            .with("occlusion", false)
            .with("outline", false);
        let overrides = PostprocessProps::new()
            .with("occlusion", true)
            .with("fog", 0.5);
        let merged = defaults.merged(&overrides);
        assert_eq!(merged.get_bool("occlusion"), Some(true));
        assert_eq!(merged.get_bool("outline"), Some(false));
        assert_eq!(merged.get_f64("fog"), Some(0.5));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn assignments_parse_json_or_string() {
        let (k, v) = PostprocessProps::parse_assignment("occlusion=true").unwrap();
        assert_eq!(k, "occlusion");
        assert_eq!(v, serde_json::Value::Bool(true));

        let (_, v) = PostprocessProps::parse_assignment("outline_width = 2.5").unwrap();
        assert_eq!(v.as_f64(), Some(2.5));

        let (_, v) = PostprocessProps::parse_assignment("mode=soft").unwrap();
        assert_eq!(v, serde_json::Value::String("soft".to_owned()));

        assert!(PostprocessProps::parse_assignment("novalue").is_err());
        assert!(PostprocessProps::parse_assignment("=1").is_err());
    }
}

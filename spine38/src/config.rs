//! Loader options and the optional JSON mix table.

#[cfg(feature = "serde")]
use crate::{AnimationStateData, Error};

/// Options for [`crate::SkeletonBinary`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoaderOptions {
    /// Multiplier applied to every positional value (bone offsets, vertices, lengths).
    pub scale: f32,
    /// Reject files whose version string does not start with `3.8` instead of warning.
    pub strict_version: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            strict_version: false,
        }
    }
}

impl LoaderOptions {
    pub fn with_scale(scale: f32) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Non-finite or non-positive scales fall back to 1.
    pub(crate) fn effective_scale(&self) -> f32 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }
}

/// Cross-fade durations loaded from JSON:
///
/// ```json
/// { "defaultMix": 0.2, "mixes": [{ "from": "walk", "to": "run", "duration": 0.4 }] }
/// ```
#[cfg(feature = "serde")]
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixConfig {
    #[serde(default)]
    pub default_mix: f32,
    #[serde(default)]
    pub mixes: Vec<MixEntry>,
}

#[cfg(feature = "serde")]
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MixEntry {
    pub from: String,
    pub to: String,
    pub duration: f32,
}

#[cfg(feature = "serde")]
impl MixConfig {
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        if !config.default_mix.is_finite() || config.default_mix < 0.0 {
            return Err(Error::Config {
                message: format!("defaultMix must be a non-negative number, got {}", config.default_mix),
            });
        }
        Ok(config)
    }

    /// Writes the default and every pair onto `state_data`. Names must exist in its skeleton.
    pub fn apply_to(&self, state_data: &mut AnimationStateData) -> Result<(), Error> {
        state_data.default_mix = self.default_mix;
        for mix in &self.mixes {
            state_data.set_mix(&mix.from, &mix.to, mix.duration)?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn mix_config_reads_camel_case_json() {
        let config = MixConfig::from_json(
            r#"{ "defaultMix": 0.25, "mixes": [{ "from": "idle", "to": "walk", "duration": 0.5 }] }"#,
        )
        .unwrap();
        assert_eq!(config.default_mix, 0.25);
        assert_eq!(config.mixes.len(), 1);
        assert_eq!(config.mixes[0].to, "walk");
    }

    #[test]
    fn mix_config_rejects_garbage_and_negative_defaults() {
        assert!(matches!(MixConfig::from_json("{"), Err(Error::Config { .. })));
        assert!(matches!(
            MixConfig::from_json(r#"{ "defaultMix": -1 }"#),
            Err(Error::Config { .. })
        ));
    }
}

//! Animator configuration

use super::ik::IkConfig;
use crate::core::Result;
use serde::{Deserialize, Serialize};

/// Settings applied when an animator binds a model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    pub ik: IkConfig,
    /// Playback speed of the states created for each clip
    pub default_speed: f32,
    /// Looping flag of the states created for each clip
    pub looping: bool,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            ik: IkConfig::default(),
            default_speed: 1.0,
            looping: true,
        }
    }
}

impl AnimatorConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[test]
    fn test_defaults() {
        let config = AnimatorConfig::default();
        assert_eq!(config.ik.max_iterations, 10);
        assert_eq!(config.ik.tolerance, 1.0);
        assert_eq!(config.default_speed, 1.0);
        assert!(config.looping);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnimatorConfig::from_json(r#"{ "looping": false, "ik": { "tolerance": 0.05 } }"#).unwrap();
        assert!(!config.looping);
        assert_eq!(config.ik.tolerance, 0.05);
        assert_eq!(config.ik.max_iterations, 10);
        assert_eq!(config.default_speed, 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let config = AnimatorConfig {
            default_speed: 1.5,
            ..Default::default()
        };
        let parsed = AnimatorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_json() {
        let err = AnimatorConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

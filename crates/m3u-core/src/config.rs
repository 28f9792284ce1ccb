//! Session configuration

use crate::continue_watching::ContinueWatchingPolicy;
use crate::format::{MimeType, DEFAULT_PRIORITY};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Static configuration of a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Attempt order for format hypotheses
    pub format_priority: Vec<MimeType>,
    /// Try a guess from the url extension before the priority list
    pub pre_guess: bool,
    pub continue_watching: ContinueWatchingPolicy,
    /// Depth of the session's command queue
    pub command_queue: usize,
    /// User agent used when the parent playlist sets none
    pub default_user_agent: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format_priority: DEFAULT_PRIORITY.to_vec(),
            pre_guess: true,
            continue_watching: ContinueWatchingPolicy::default(),
            command_queue: 32,
            default_user_agent: None,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_priority.is_empty() {
            return Err(Error::InvalidConfig("format_priority is empty".into()));
        }
        for (i, mime) in self.format_priority.iter().enumerate() {
            if self.format_priority[..i].contains(mime) {
                return Err(Error::InvalidConfig(format!(
                    "format_priority lists {} twice",
                    mime
                )));
            }
        }
        if self.command_queue == 0 {
            return Err(Error::InvalidConfig("command_queue must be at least 1".into()));
        }
        let ratio = self.continue_watching.remaining_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::InvalidConfig(format!(
                "continue_watching.remaining_ratio out of range: {}",
                ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.format_priority, DEFAULT_PRIORITY.to_vec());
        assert!(config.pre_guess);
    }

    #[test]
    fn test_partial_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"format_priority": ["hls", "dash"], "pre_guess": false}"#)
                .unwrap();
        assert_eq!(config.format_priority, vec![MimeType::Hls, MimeType::Dash]);
        assert!(!config.pre_guess);
        assert_eq!(config.command_queue, 32);
    }

    #[test]
    fn test_rejects_bad_priority() {
        let empty = SessionConfig {
            format_priority: vec![],
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(Error::InvalidConfig(_))));

        let duplicated = SessionConfig {
            format_priority: vec![MimeType::Hls, MimeType::Dash, MimeType::Hls],
            ..Default::default()
        };
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_queue() {
        let config = SessionConfig {
            command_queue: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::from_file("/nonexistent/m3u-core.json").unwrap_err();
        assert_eq!(err.error_code(), "IO");
    }
}

//! Configuration for the heartbeat engine.
//!
//! Settings are plain serde structs, typically loaded from a TOML file at
//! startup via the `config` crate.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Startup settings for a [`crate::heartbeat::Heartbeat`].
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval between beats, in milliseconds. May be left unset and
    /// supplied to `start` instead.
    #[serde(default)]
    pub pulse_ms: Option<u64>,

    /// Number of initial beats to suppress.
    #[serde(default)]
    pub beat_skips: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            pulse_ms: None,
            beat_skips: 0,
        }
    }
}

impl HeartbeatConfig {
    /// Loads settings from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("reading config from {}", path.display()))?;
        settings
            .try_deserialize()
            .context("deserializing heartbeat config")
    }

    /// The configured pulse as a `Duration`, if set.
    pub fn pulse(&self) -> Option<Duration> {
        self.pulse_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> HeartbeatConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn parses_full_config() {
        let cfg = parse("pulse_ms = 250\nbeat_skips = 2\n");
        assert_eq!(cfg.pulse_ms, Some(250));
        assert_eq!(cfg.beat_skips, 2);
        assert_eq!(cfg.pulse(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.pulse_ms, None);
        assert_eq!(cfg.beat_skips, 0);
        assert_eq!(cfg.pulse(), None);
    }
}

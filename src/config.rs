use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub overflow_log: OverflowLogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpal,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples per channel in one fragment.
    pub fragment_size: usize,
    /// Fragments held by the ring; the pool has two more.
    pub capacity: usize,
    pub stereo: bool,
    pub sample_rate: u32,
    pub backend: Backend,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fragment_size: 512,
            capacity: 6,
            stereo: true,
            sample_rate: 44_100,
            backend: Backend::Cpal,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverflowLogConfig {
    pub base_interval_ms: u64,
    pub max_interval_factor: u32,
    pub cooldown_ms: u64,
}

impl Default for OverflowLogConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 100,
            max_interval_factor: 9,
            cooldown_ms: 1000,
        }
    }
}

impl OverflowLogConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: &str) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

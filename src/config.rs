use crate::chat::youtube::YOUTUBE_API_BASE;
use crate::poller::PollerSettings;
use crate::resolver::MAX_OPTIONS;
use crate::tally::{CountMode, DisplayMode, LabelMode, MIN_OPTIONS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_DURATION_SECS: u64 = 30;
pub const MAX_DURATION_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub stream: StreamConfig,
    pub poller: PollerConfig,
    pub vote: VoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub live_chat_id: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub api_base: String,
    pub demo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    pub initial_interval_ms: u64,
    pub fallback_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoteConfig {
    pub option_count: usize,
    pub label_mode: LabelMode,
    pub display: DisplayMode,
    pub count_mode: CountMode,
    pub show_total: bool,
    pub option_texts: Vec<String>,
    pub duration_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stream: StreamConfig::default(),
            poller: PollerConfig::default(),
            vote: VoteConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            live_chat_id: String::new(),
            api_key: None,
            access_token: None,
            api_base: YOUTUBE_API_BASE.to_string(),
            demo: false,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            fallback_interval_ms: 100,
        }
    }
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            option_count: 4,
            label_mode: LabelMode::Index,
            display: DisplayMode::Ratio,
            count_mode: CountMode::EveryVote,
            show_total: false,
            option_texts: vec![String::new(); MAX_OPTIONS],
            duration_secs: MIN_DURATION_SECS,
        }
    }
}

impl PollerConfig {
    pub fn settings(&self) -> PollerSettings {
        PollerSettings {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            fallback_interval: Duration::from_millis(self.fallback_interval_ms),
        }
    }
}

/// Values given on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub live_chat_id: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub demo: Option<bool>,
    pub option_count: Option<usize>,
    pub duration_secs: Option<u64>,
    pub count_mode: Option<CountMode>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatvote").join("config.toml"))
    }

    /// Reads the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    /// Applies command-line overrides field by field.
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(id) = overrides.live_chat_id {
            self.stream.live_chat_id = id;
        }
        if let Some(key) = overrides.api_key {
            self.stream.api_key = Some(key);
        }
        if let Some(token) = overrides.access_token {
            self.stream.access_token = Some(token);
        }
        if let Some(demo) = overrides.demo {
            self.stream.demo = demo;
        }
        if let Some(count) = overrides.option_count {
            self.vote.option_count = count;
        }
        if let Some(secs) = overrides.duration_secs {
            self.vote.duration_secs = secs;
        }
        if let Some(mode) = overrides.count_mode {
            self.vote.count_mode = mode;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        self.normalized()
    }

    /// Clamps out-of-range values instead of rejecting them.
    pub fn normalized(mut self) -> Self {
        self.vote.option_count = self.vote.option_count.clamp(MIN_OPTIONS, MAX_OPTIONS);
        self.vote.duration_secs = self
            .vote
            .duration_secs
            .clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);
        self.vote.option_texts.resize(MAX_OPTIONS, String::new());
        self
    }
}

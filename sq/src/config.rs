//! Sequencer configuration types and loading

use chrono::{Datelike, Local, Timelike, Weekday};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main sequencer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Delays between collaborator calls in batch runs
    pub pacing: PacingConfig,

    /// Per-collaborator call timeouts
    pub timeouts: TimeoutConfig,

    /// Shared daily send budget
    pub quota: QuotaConfig,

    /// Signal watcher polling
    pub watcher: WatcherConfig,

    /// Window in which calls may be placed
    #[serde(rename = "calling-hours")]
    pub calling_hours: CallingHours,

    /// Prompt template overrides
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        for (name, ms) in [
            ("directory-ms", t.directory_ms),
            ("writer-ms", t.writer_ms),
            ("email-ms", t.email_ms),
            ("voice-ms", t.voice_ms),
            ("signals-ms", t.signals_ms),
        ] {
            if ms == 0 {
                return Err(eyre::eyre!("timeouts.{} must be greater than zero", name));
            }
        }

        if self.calling_hours.start_hour >= self.calling_hours.end_hour || self.calling_hours.end_hour > 24 {
            return Err(eyre::eyre!(
                "calling-hours must satisfy start-hour < end-hour <= 24 (got {}..{})",
                self.calling_hours.start_hour,
                self.calling_hours.end_hour
            ));
        }

        if self.watcher.poll_interval_secs == 0 {
            return Err(eyre::eyre!("watcher.poll-interval-secs must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// [`Config::search_paths`] wins, and defaults apply when there is none.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path).context(format!("Failed to load config from {}", path.display())),
            None => Ok(Self::load_first(&Self::search_paths())),
        }
    }

    /// Project-local `.outreach.yml`, then `~/.config/outreach/outreach.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".outreach.yml")];
        paths.extend(dirs::config_dir().map(|dir| dir.join("outreach").join("outreach.yml")));
        paths
    }

    /// First candidate that exists and parses; a broken file is skipped
    fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable config"),
            }
        }
        tracing::info!("No config file found, using defaults");
        Self::default()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Delays between consecutive collaborator calls in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay between writer calls in generate-all
    #[serde(rename = "generate-delay-ms")]
    pub generate_delay_ms: u64,

    /// Delay between sends/calls in execute-all
    #[serde(rename = "execute-delay-ms")]
    pub execute_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            generate_delay_ms: 1_500,
            execute_delay_ms: 2_000,
        }
    }
}

impl PacingConfig {
    pub fn generate_delay(&self) -> Duration {
        Duration::from_millis(self.generate_delay_ms)
    }

    pub fn execute_delay(&self) -> Duration {
        Duration::from_millis(self.execute_delay_ms)
    }

    /// No delays; for tests and dry runs
    pub fn none() -> Self {
        Self {
            generate_delay_ms: 0,
            execute_delay_ms: 0,
        }
    }
}

/// Collaborator call timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(rename = "directory-ms")]
    pub directory_ms: u64,

    #[serde(rename = "writer-ms")]
    pub writer_ms: u64,

    #[serde(rename = "email-ms")]
    pub email_ms: u64,

    #[serde(rename = "voice-ms")]
    pub voice_ms: u64,

    #[serde(rename = "signals-ms")]
    pub signals_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            directory_ms: 5_000,
            writer_ms: 60_000,
            email_ms: 15_000,
            voice_ms: 30_000,
            signals_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn directory(&self) -> Duration {
        Duration::from_millis(self.directory_ms)
    }

    pub fn writer(&self) -> Duration {
        Duration::from_millis(self.writer_ms)
    }

    pub fn email(&self) -> Duration {
        Duration::from_millis(self.email_ms)
    }

    pub fn voice(&self) -> Duration {
        Duration::from_millis(self.voice_ms)
    }

    pub fn signals(&self) -> Duration {
        Duration::from_millis(self.signals_ms)
    }
}

/// Daily send budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    #[serde(rename = "daily-send-limit")]
    pub daily_send_limit: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { daily_send_limit: 50 }
    }
}

/// Signal watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Polling interval in seconds
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 300 }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Local-time window in which calls may be placed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallingHours {
    /// First hour calls are allowed (inclusive, 0-23)
    #[serde(rename = "start-hour")]
    pub start_hour: u32,

    /// Hour calls stop (exclusive, 1-24)
    #[serde(rename = "end-hour")]
    pub end_hour: u32,

    #[serde(rename = "weekdays-only")]
    pub weekdays_only: bool,
}

impl Default for CallingHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            weekdays_only: true,
        }
    }
}

impl CallingHours {
    /// Check a local weekday/hour against the window
    pub fn is_open_at(&self, weekday: Weekday, hour: u32) -> bool {
        if self.weekdays_only && matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return false;
        }
        hour >= self.start_hour && hour < self.end_hour
    }

    pub fn is_open_now(&self) -> bool {
        let now = Local::now();
        self.is_open_at(now.weekday(), now.hour())
    }
}

/// Prompt template overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory with `{step_kind}.pmt` overrides
    pub dir: Option<PathBuf>,
}

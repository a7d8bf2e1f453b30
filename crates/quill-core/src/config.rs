//! Configuration for the dispatcher and its channels.
//!
//! One [`Config`] describes all three channels. Per-channel directories are
//! fixed subdirectories of `base_dir` (`info/`, `error/`, `trace/`), and the
//! batch size is selected by [`Mode`], normally read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::Level;

/// Environment variable selecting the batching mode.
pub const MODE_ENV_VAR: &str = "QUILL_ENV";

/// Buffered lines that trigger a batch flush in production mode.
pub const BATCH_SIZE_PRODUCTION: usize = 100;

/// Buffered lines that trigger a batch flush in development mode.
pub const BATCH_SIZE_DEVELOPMENT: usize = 5;

/// Default period of the per-channel background flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(600);

/// Batching mode, normally derived from the environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Large batches; suited to high log volume.
    Production,
    /// Small batches; lines reach disk sooner.
    #[default]
    Development,
}

impl Mode {
    /// Read the mode from [`MODE_ENV_VAR`].
    ///
    /// `"production"` selects production batching; any other value, or an
    /// unset variable, selects development.
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV_VAR) {
            Ok(value) if value == "production" => Mode::Production,
            _ => Mode::Development,
        }
    }

    /// Number of buffered lines that triggers a batch flush.
    pub fn batch_size(self) -> usize {
        match self {
            Mode::Production => BATCH_SIZE_PRODUCTION,
            Mode::Development => BATCH_SIZE_DEVELOPMENT,
        }
    }
}

/// Dispatcher-wide configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `info/`, `error/` and `trace/` channel
    /// directories.
    pub base_dir: PathBuf,

    /// Batching mode; see [`Mode`].
    pub mode: Mode,

    /// Period of the per-channel background flush timer. Zero disables the
    /// timer entirely.
    pub flush_interval: Duration,

    /// Maximum size in bytes of an active log file. Zero means unlimited.
    pub max_file_size: u64,

    /// When a file is full, truncate it in place instead of rotating it to
    /// a numbered backup. Loses the old content by design.
    pub truncate_on_full: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("logs"),
            mode: Mode::Development,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_file_size: 0,
            truncate_on_full: false,
        }
    }
}

impl Config {
    /// Configuration rooted at `base_dir`, with the mode taken from the
    /// environment and defaults everywhere else.
    pub fn from_env(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            mode: Mode::from_env(),
            ..Self::default()
        }
    }

    /// Directory a channel's day files live in.
    pub fn channel_dir(&self, level: Level) -> PathBuf {
        self.base_dir.join(level.as_str())
    }

    /// Resolve the configuration of a single channel.
    pub fn channel(&self, level: Level) -> ChannelConfig {
        ChannelConfig {
            level,
            dir: self.channel_dir(level),
            batch_size: self.mode.batch_size(),
            flush_interval: self.flush_interval,
            max_file_size: self.max_file_size,
            truncate_on_full: self.truncate_on_full,
        }
    }
}

/// Resolved configuration of a single channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Severity tag written into every line on this channel.
    pub level: Level,
    /// Directory the channel's day files live in.
    pub dir: PathBuf,
    /// Buffered lines that trigger a batch flush.
    pub batch_size: usize,
    /// Period of the background flush timer. Zero disables it.
    pub flush_interval: Duration,
    /// Maximum size in bytes of the active file. Zero means unlimited.
    pub max_file_size: u64,
    /// Truncate a full file in place instead of rotating it away.
    pub truncate_on_full: bool,
}

//! Configuration for SampleFlow-RS
//!
//! This module handles:
//! - Engine settings that govern when analysis passes run ([`EngineConfig`])
//! - Experiment descriptors: buffer declarations plus the ordered module list
//!   ([`ExperimentDescriptor`])
//!
//! Both load from JSON or TOML, chosen by file extension (`.toml` means
//! TOML, anything else JSON).
//!
//! # App Data Location
//!
//! Saved experiment states default to the platform data directory:
//! - **Linux**: `~/.local/share/dev.sampleflow.sampleflow-rs/states/`
//! - **macOS**: `~/Library/Application Support/dev.sampleflow.sampleflow-rs/states/`
//! - **Windows**: `%APPDATA%\dev.sampleflow.sampleflow-rs\states\`
//!
//! # Example
//!
//! ```ignore
//! use sampleflow_rs::config::{EngineConfig, ExperimentDescriptor};
//!
//! let engine = EngineConfig::load_or_default("engine.toml");
//! let experiment = ExperimentDescriptor::load("pendulum.json")?;
//! ```

pub mod experiment;

pub use experiment::*;

use crate::error::{Result, SampleFlowError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.sampleflow.sampleflow-rs";

/// Longest throttle delay a pass can be scheduled with (one day)
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// Subdirectory of the app data dir holding saved states
pub const STATES_DIR: &str = "states";

/// Lower bound of the scheduler throttle delay (1/50 s)
pub const DEFAULT_MIN_INTERVAL_SECS: f64 = 0.02;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Default folder for saved experiment states
pub fn default_state_dir() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(STATES_DIR))
}

// ==================== Engine Config ====================

/// Settings for the analysis scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Throttle sleep between passes in seconds
    pub sleep_secs: f64,

    /// Floor for the throttle delay in seconds
    pub min_interval_secs: f64,

    /// Buffer whose latest value overrides `sleep_secs`
    pub dynamic_sleep: Option<String>,

    /// Skip passes while this buffer holds fewer than
    /// `require_fill_threshold` values
    pub require_fill: Option<String>,

    pub require_fill_threshold: usize,

    /// When false, passes repeat back to back while the experiment runs
    pub on_user_input: bool,

    /// Where `save_state` writes by default
    pub state_dir: Option<PathBuf>,

    /// Directory for rolling log files (binary only)
    pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sleep_secs: 0.0,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            dynamic_sleep: None,
            require_fill: None,
            require_fill_threshold: 1,
            on_user_input: true,
            state_dir: None,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Throttle delay given the latest dynamic sleep value, if any.
    pub fn delay(&self, dynamic_sleep: Option<f64>) -> Duration {
        let sleep = dynamic_sleep
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(self.sleep_secs);
        let secs = sleep
            .max(self.min_interval_secs)
            .max(0.0)
            .min(MAX_DELAY_SECS);
        Duration::from_secs_f64(secs)
    }

    /// Resolved state directory
    pub fn state_dir(&self) -> Result<PathBuf> {
        self.state_dir
            .clone()
            .or_else(default_state_dir)
            .ok_or_else(|| SampleFlowError::Config("Could not determine state directory".into()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_file(path.as_ref(), "engine config")
    }

    /// Load engine config, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_file(self, path.as_ref(), "engine config")
    }
}

// ==================== File helpers ====================

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

pub(crate) fn load_file<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SampleFlowError::Config(format!("Failed to read {} {:?}: {}", what, path, e)))?;
    if is_toml(path) {
        toml::from_str(&content)
            .map_err(|e| SampleFlowError::Config(format!("Failed to parse {} {:?}: {}", what, path, e)))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| SampleFlowError::Config(format!("Failed to parse {} {:?}: {}", what, path, e)))
    }
}

pub(crate) fn save_file<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SampleFlowError::Config(format!("Failed to create directory for {}: {}", what, e))
            })?;
        }
    }
    let content = if is_toml(path) {
        toml::to_string_pretty(value)
            .map_err(|e| SampleFlowError::Config(format!("Failed to serialize {}: {}", what, e)))?
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| SampleFlowError::Config(format!("Failed to serialize {}: {}", what, e)))?
    };
    std::fs::write(path, content)
        .map_err(|e| SampleFlowError::Config(format!("Failed to write {} {:?}: {}", what, path, e)))
}

//! Engine configuration
//!
//! Loaded from YAML, with environment overrides for the values that differ
//! between CI and local runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::E2eResult;
use crate::selectors::Selectors;

pub const ENV_BASE_URL: &str = "NOTES_E2E_BASE_URL";
pub const ENV_ADMIN_TOKEN: &str = "NOTES_E2E_ADMIN_TOKEN";
pub const ENV_RUN_ID: &str = "NOTES_E2E_RUN_ID";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Identifies everything this run created; the bulk cleanup key
    pub run_id: String,

    /// Login of the session the engine drives
    pub identity: Option<String>,

    pub mode: ProvisionMode,

    /// Wrap root-level notes and tasks in a generated folder
    pub synthetic_parents: bool,

    pub timeouts: Timeouts,
    pub retry: RetryConfig,
    pub naming: NamingConfig,
    pub save_ack: SaveAck,
    pub selectors: Selectors,
    pub cleanup: CleanupConfig,

    /// Where tree dumps and failure screenshots go
    pub diagnostics_dir: PathBuf,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            identity: None,
            mode: ProvisionMode::Unique,
            synthetic_parents: true,
            timeouts: Timeouts::default(),
            retry: RetryConfig::default(),
            naming: NamingConfig::default(),
            save_ack: SaveAck::default(),
            selectors: Selectors::default(),
            cleanup: CleanupConfig::default(),
            diagnostics_dir: PathBuf::from("test-results/diagnostics"),
        }
    }
}

/// How requested names become labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    /// Every request gets a freshly generated label
    #[default]
    Unique,
    /// The requested name is used as-is and an existing item is reused
    Idempotent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub action_ms: u64,
    pub dialog_close_ms: u64,
    pub readiness_ms: u64,
    /// Window after submit in which a validation indicator counts as a conflict
    pub conflict_window_ms: u64,
    pub save_ack_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action_ms: 5000,
            dialog_close_ms: 5000,
            readiness_ms: 5000,
            conflict_window_ms: 1000,
            save_ack_ms: 5000,
            poll_interval_ms: 50,
        }
    }
}

impl Timeouts {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn dialog_close(&self) -> Duration {
        Duration::from_millis(self.dialog_close_ms)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }

    pub fn conflict_window(&self) -> Duration {
        Duration::from_millis(self.conflict_window_ms)
    }

    pub fn save_ack(&self) -> Duration {
        Duration::from_millis(self.save_ack_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            multiplier: 2.0,
            max_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub separator: String,
    pub synthetic_parent_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            separator: " ".to_string(),
            synthetic_parent_prefix: "Fixture Folder".to_string(),
        }
    }
}

/// How the content populator knows the editor has persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SaveAck {
    /// Wait for a response whose URL matches this regex; `{id}` is replaced
    /// with the escaped resource id
    Network { url_pattern: String },
    /// Sleep for a fixed, conservative delay
    FixedDelay { ms: u64 },
}

impl Default for SaveAck {
    fn default() -> Self {
        SaveAck::Network {
            url_pattern: r"/api/items/{id}(\?.*)?$".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub admin_base_url: Option<String>,
    pub admin_token: Option<String>,
    /// Try the single bulk call before falling back to per-identity deletes
    pub bulk_enabled: bool,
    pub seed_identities: Vec<SeedIdentity>,
    /// Per-request timeout for admin calls
    pub request_timeout_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            admin_base_url: None,
            admin_token: None,
            bulk_enabled: true,
            seed_identities: Vec::new(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedIdentity {
    pub login: String,
    pub password: String,
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it does
    /// not exist, then apply environment overrides.
    pub fn load(path: &Path) -> E2eResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Ok(token) = std::env::var(ENV_ADMIN_TOKEN) {
            self.cleanup.admin_token = Some(token);
        }
        if let Ok(run_id) = std::env::var(ENV_RUN_ID) {
            self.run_id = run_id;
        }
    }

    /// Admin endpoint, defaulting to the application itself.
    pub fn admin_base_url(&self) -> &str {
        self.cleanup.admin_base_url.as_deref().unwrap_or(&self.base_url)
    }
}

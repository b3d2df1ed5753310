use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::campaign::PacingConfig;
use crate::store::FailurePolicy;

/// Placeholder bridge endpoint for local development; real deployments set
/// `bridge.base_url` or `DIALFLOW_BRIDGE_URL`.
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8089";

const SETTINGS_FILE: &str = "dialflow.toml";
const DB_FILE: &str = "dialflow.db";

/// Runtime configuration for dialflow.
///
/// Settings load from `dialflow.toml` in the data directory, then
/// `DIALFLOW_*` environment variables override individual values. CLI flags
/// (handled by the commands) take precedence over both.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub bridge: BridgeSettings,
    pub campaign: CampaignSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BRIDGE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    pub call_spacing_secs: u64,
    pub completion_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            call_spacing_secs: 30,
            completion_timeout_secs: 120,
            failure_policy: FailurePolicy::Halt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Apply `DIALFLOW_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DIALFLOW_BRIDGE_URL") {
            self.bridge.base_url = url;
        }
        if let Some(v) = lookup("DIALFLOW_BRIDGE_TIMEOUT_SECS") {
            self.bridge.request_timeout_secs =
                v.parse().context("Invalid DIALFLOW_BRIDGE_TIMEOUT_SECS")?;
        }
        if let Some(v) = lookup("DIALFLOW_CALL_SPACING_SECS") {
            self.campaign.call_spacing_secs =
                v.parse().context("Invalid DIALFLOW_CALL_SPACING_SECS")?;
        }
        if let Some(v) = lookup("DIALFLOW_COMPLETION_TIMEOUT_SECS") {
            self.campaign.completion_timeout_secs = v
                .parse()
                .context("Invalid DIALFLOW_COMPLETION_TIMEOUT_SECS")?;
        }
        if let Some(v) = lookup("DIALFLOW_FAILURE_POLICY") {
            self.campaign.failure_policy = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid DIALFLOW_FAILURE_POLICY")?;
        }
        if let Some(v) = lookup("DIALFLOW_SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("DIALFLOW_SERVER_PORT") {
            self.server.port = v.parse().context("Invalid DIALFLOW_SERVER_PORT")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge.base_url.trim().is_empty() {
            bail!("bridge.base_url must not be empty");
        }
        if self.bridge.request_timeout_secs == 0 {
            bail!("bridge.request_timeout_secs must be positive");
        }
        if self.campaign.call_spacing_secs == 0 {
            bail!("campaign.call_spacing_secs must be positive");
        }
        if self.campaign.completion_timeout_secs == 0 {
            bail!("campaign.completion_timeout_secs must be positive");
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration rooted at `data_dir` (flag), falling back to
    /// `DIALFLOW_DATA_DIR`, then `.dialflow/` in the working directory.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = data_dir
            .or_else(|| std::env::var("DIALFLOW_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(".dialflow"));

        let settings_path = data_dir.join(SETTINGS_FILE);
        let mut settings = if settings_path.exists() {
            let raw = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", settings_path.display()))?
        } else {
            Settings::default()
        };
        settings.apply_env()?;
        settings.validate()?;

        Ok(Self {
            db_path: data_dir.join(DB_FILE),
            data_dir,
            settings,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        Ok(())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Write the current settings out as a starter `dialflow.toml`.
    pub fn write_settings_file(&self) -> Result<PathBuf> {
        self.ensure_directories()?;
        let path = self.settings_path();
        let rendered =
            toml::to_string_pretty(&self.settings).context("Failed to render settings")?;
        std::fs::write(&path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn pacing(&self) -> PacingConfig {
        PacingConfig {
            call_spacing: Duration::from_secs(self.settings.campaign.call_spacing_secs),
            completion_timeout: Duration::from_secs(self.settings.campaign.completion_timeout_secs),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.bridge.request_timeout_secs)
    }
}

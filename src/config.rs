use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_merge_timeout_secs")]
    pub merge_timeout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_contacts")]
    pub max_contacts: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            merge_timeout_secs: default_merge_timeout_secs(),
            rate_limit_per_sec: default_rate_limit(),
            page_size: default_page_size(),
            max_contacts: default_max_contacts(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.hubapi.com".to_string()
}
fn default_token_env() -> String {
    "HUBSPOT_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_merge_timeout_secs() -> u64 {
    10
}
fn default_rate_limit() -> u32 {
    10
}
fn default_page_size() -> u32 {
    100
}
fn default_max_contacts() -> usize {
    15_000
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    /// Contact property the date window filters on.
    #[serde(default = "default_window_field")]
    pub field: String,
    /// Offset applied to day boundaries, e.g. 330 for IST.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            field: default_window_field(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_window_field() -> String {
    "createdate".to_string()
}

/// Last-activity properties, highest priority first.
#[derive(Debug, Deserialize, Clone)]
pub struct ActivityConfig {
    #[serde(default = "default_activity_fields")]
    pub fields: Vec<String>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            fields: default_activity_fields(),
        }
    }
}

fn default_activity_fields() -> Vec<String> {
    [
        "lastcontactdate",
        "notes_last_contacted",
        "hs_analytics_last_timestamp",
        "hs_latest_meeting_activity",
        "hs_latest_sequence_ended_date",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    /// Pause between the two steps of a three-contact plan.
    #[serde(default = "default_step_pause_ms")]
    pub step_pause_ms: u64,
    #[serde(default = "default_group_pause_ms")]
    pub group_pause_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            step_pause_ms: default_step_pause_ms(),
            group_pause_ms: default_group_pause_ms(),
        }
    }
}

fn default_step_pause_ms() -> u64 {
    3000
}
fn default_group_pause_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

impl CrmConfig {
    /// Read the bearer token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("{} environment variable not set", self.token_env))?;
        if token.trim().is_empty() {
            anyhow::bail!("{} environment variable is empty", self.token_env);
        }
        Ok(token)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let crm = &self.crm;
        if !(crm.base_url.starts_with("http://") || crm.base_url.starts_with("https://")) {
            anyhow::bail!("crm.base_url must start with http:// or https://");
        }
        if crm.rate_limit_per_sec == 0 {
            anyhow::bail!("crm.rate_limit_per_sec must be > 0");
        }
        if !(1..=100).contains(&crm.page_size) {
            anyhow::bail!("crm.page_size must be in [1, 100]");
        }
        if crm.max_contacts == 0 {
            anyhow::bail!("crm.max_contacts must be > 0");
        }
        if crm.timeout_secs == 0 || crm.merge_timeout_secs == 0 {
            anyhow::bail!("crm timeouts must be > 0");
        }
        if crm.token_env.trim().is_empty() {
            anyhow::bail!("crm.token_env must not be empty");
        }

        if self.window.field.trim().is_empty() {
            anyhow::bail!("window.field must not be empty");
        }
        if self.window.utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("window.utc_offset_minutes must be within one day");
        }

        if self.activity.fields.is_empty() {
            anyhow::bail!("activity.fields must list at least one property");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

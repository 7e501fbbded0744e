//! Configuration for locsync.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LOCSYNC_HOME, LOCSYNC_DB, LOCSYNC_TEXTGEN_API_KEY)
//! 2. Config file (.locsync/config.yaml)
//! 3. Defaults (~/.locsync)
//!
//! Config file discovery:
//! - Searches current directory and parents for .locsync/config.yaml
//! - Paths in config file are relative to the .locsync/ directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(flatten)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .locsync/)
    pub home: Option<String>,
    /// SQLite database file (relative to home)
    pub database: Option<String>,
}

/// Everything except paths; each section falls back to its defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub endpoints: EndpointSettings,
    /// OAuth client registrations keyed by platform name
    #[serde(default)]
    pub oauth: BTreeMap<String, OAuthClientSettings>,
    #[serde(default)]
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub text_generation: TextGenerationSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub auto_reply: AutoReplyLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Per-call timeout for every outbound request
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_http_timeout(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Base URLs of the external REST surfaces
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub account_management: String,
    pub business_information: String,
    pub legacy_v4: String,
    pub performance: String,
    pub qanda: String,
    pub facebook_graph: String,
    pub youtube_upload: String,
    pub youtube_data: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            account_management: "https://mybusinessaccountmanagement.googleapis.com/v1".to_string(),
            business_information: "https://mybusinessbusinessinformation.googleapis.com/v1"
                .to_string(),
            legacy_v4: "https://mybusiness.googleapis.com/v4".to_string(),
            performance: "https://businessprofileperformance.googleapis.com/v1".to_string(),
            qanda: "https://mybusinessqanda.googleapis.com/v1".to_string(),
            facebook_graph: "https://graph.facebook.com/v19.0".to_string(),
            youtube_upload: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            youtube_data: "https://www.googleapis.com/youtube/v3".to_string(),
        }
    }
}

/// One OAuth client registration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub auth_url: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Tokens expiring within this many seconds count as expired
    pub expiry_skew_seconds: i64,
    /// Lifetime of an OAuth connect-flow state token
    pub connect_state_ttl_seconds: i64,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            expiry_skew_seconds: 60,
            connect_state_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Cached profile younger than this is served without an upstream call
    pub profile_cache_ttl_seconds: i64,
    /// Days of daily metrics fetched per sync, ending yesterday
    pub metrics_window_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            profile_cache_ttl_seconds: 6 * 3600,
            metrics_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Hosts of our own CDN; media there is re-hosted before publishing
    pub own_cdn_hosts: Vec<String>,
    /// Public base URL substituted for the CDN host as a last resort
    pub public_base_url: Option<String>,
    pub primary_host: Option<ImageHostSettings>,
    pub secondary_host: Option<ImageHostSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageHostSettings {
    pub upload_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextGenerationSettings {
    pub base_url: String,
    pub model: String,
    /// Default key; organizations may store their own
    pub api_key: Option<String>,
}

impl Default for TextGenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

/// Firing intervals of the named jobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub publish_due_seconds: u64,
    pub auto_reply_seconds: u64,
    pub profile_resync_seconds: u64,
    pub state_eviction_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            publish_due_seconds: 60,
            auto_reply_seconds: 5 * 60,
            profile_resync_seconds: 3600,
            state_eviction_seconds: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoReplyLimits {
    /// Reviews answered per location per cycle
    pub per_cycle_cap: usize,
}

impl Default for AutoReplyLimits {
    fn default() -> Self {
        Self { per_cycle_cap: 5 }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to locsync home (state)
    pub home: PathBuf,
    /// SQLite database path
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub settings: Settings,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".locsync").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(serde_yaml::from_str(content)?)
}

/// Resolve a path that may be relative to a base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".locsync");

    let config_file = find_config_file();

    let (home, database, mut settings) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;
        let locsync_dir = config_path.parent().unwrap_or(Path::new("."));

        let home = if let Ok(env_home) = std::env::var("LOCSYNC_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            resolve_path(locsync_dir, home_path)
        } else {
            default_home.clone()
        };

        let database = config
            .paths
            .database
            .as_deref()
            .map(|db| resolve_path(&home, db))
            .unwrap_or_else(|| home.join("locsync.db"));

        (home, database, config.settings)
    } else {
        let home = std::env::var("LOCSYNC_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());
        let database = home.join("locsync.db");

        (home, database, Settings::default())
    };

    let database = std::env::var("LOCSYNC_DB")
        .map(PathBuf::from)
        .unwrap_or(database);

    if let Ok(key) = std::env::var("LOCSYNC_TEXTGEN_API_KEY") {
        settings.text_generation.api_key = Some(key);
    }

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        settings,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

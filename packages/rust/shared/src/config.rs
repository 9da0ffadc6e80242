//! Application configuration for GovSnap.
//!
//! The ingest config is a TOML file passed on the command line, falling back to
//! `~/.govsnap/govsnap.toml`. Every section has defaults so a file containing
//! only `[[sources]]` entries is valid.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{IngestError, Result};
use crate::types::{Sensitivity, SourceDescriptor};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "govsnap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".govsnap";

/// User-Agent sent when the config does not override it.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "GovSnap/",
    env!("CARGO_PKG_VERSION"),
    " (+public-sector ingestion)"
);

// ---------------------------------------------------------------------------
// Config structs (matching govsnap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Snapshot output settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// HTTP fetch policy.
    #[serde(default)]
    pub http: HttpConfig,

    /// Provenance defaults applied to every source.
    #[serde(default)]
    pub provenance: ProvenanceDefaults,

    /// Sources to ingest on this run.
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory of the snapshot tree.
    #[serde(default = "default_output_root")]
    pub root: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
        }
    }
}

fn default_output_root() -> String {
    "snapshots".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Attempts per logical fetch (including the first).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Hard timeout for a single attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Requests per second per domain; 0 disables pacing.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Whether to respect robots.txt.
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,

    /// User-Agent header and robots.txt agent name.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Sources processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            rate_limit: default_rate_limit(),
            respect_robots_txt: true,
            user_agent: default_user_agent(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_rate_limit() -> u32 {
    2
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_concurrency() -> u32 {
    1
}

/// `[provenance]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceDefaults {
    /// Publisher recorded when a source names none.
    #[serde(default = "default_publisher")]
    pub publisher: String,

    /// Sensitivity requested when a source names none.
    #[serde(default)]
    pub default_sensitivity: Sensitivity,

    /// Highest sensitivity any source may request.
    #[serde(default = "default_ceiling")]
    pub sensitivity_ceiling: Sensitivity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_profile: Option<String>,
}

impl Default for ProvenanceDefaults {
    fn default() -> Self {
        Self {
            publisher: default_publisher(),
            default_sensitivity: Sensitivity::Public,
            sensitivity_ceiling: default_ceiling(),
            visibility: None,
            knowledge_profile: None,
        }
    }
}

fn default_publisher() -> String {
    "Unknown publisher".into()
}
fn default_ceiling() -> Sensitivity {
    Sensitivity::Internal
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject malformed sources before any network activity.
    pub fn validate(&self) -> Result<()> {
        if self.output.root.trim().is_empty() {
            return Err(IngestError::config("[output] root must not be empty"));
        }
        if self.http.concurrency == 0 {
            return Err(IngestError::config("[http] concurrency must be at least 1"));
        }
        if self.provenance.default_sensitivity > self.provenance.sensitivity_ceiling {
            tracing::warn!(
                default = %self.provenance.default_sensitivity,
                ceiling = %self.provenance.sensitivity_ceiling,
                "default sensitivity exceeds ceiling and will be clamped"
            );
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            validate_source(source)?;
            if !seen.insert(source.output_path.as_str()) {
                return Err(IngestError::config(format!(
                    "duplicate output_path '{}'",
                    source.output_path
                )));
            }
        }
        Ok(())
    }
}

/// Check one descriptor's URL, destination and sensitivity name.
pub fn validate_source(source: &SourceDescriptor) -> Result<()> {
    let url = Url::parse(&source.url)
        .map_err(|e| IngestError::config(format!("invalid URL '{}': {e}", source.url)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(IngestError::config(format!(
            "unsupported URL scheme in '{}'",
            source.url
        )));
    }
    if url.host_str().is_none() {
        return Err(IngestError::config(format!("URL has no host: {}", source.url)));
    }

    check_relative_path(&source.output_path)?;

    if let Some(level) = &source.sensitivity {
        level.parse::<Sensitivity>().map_err(|_| {
            IngestError::config(format!(
                "unknown sensitivity '{level}' for {}",
                source.url
            ))
        })?;
    }
    Ok(())
}

/// An output path must stay inside the snapshot root.
fn check_relative_path(output_path: &str) -> Result<()> {
    if output_path.trim().is_empty() {
        return Err(IngestError::config("output_path must not be empty"));
    }
    let path = Path::new(output_path);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(IngestError::config(format!(
            "output_path '{output_path}' must be relative and stay inside the snapshot root"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.govsnap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IngestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the default config file (`~/.govsnap/govsnap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the default config file. A missing file is a config error.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;
    if !path.exists() {
        return Err(IngestError::config(format!(
            "no config given and {} does not exist",
            path.display()
        )));
    }
    load_config_from(&path)
}

/// Load and validate the config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IngestError::config(format!("cannot read {}: {e}", path.display()))
    })?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        IngestError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    tracing::debug!(?path, sources = config.sources.len(), "config loaded");
    Ok(config)
}

/// Write a default config file into `dir`. Returns the path to the created file.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| IngestError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IngestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IngestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

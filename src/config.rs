use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use cci_tools::client::{ClientConfig, PaginationOptions, RateLimitConfig, DEFAULT_BASE_URL};
use cci_tools::auth::Token;
use cci_tools::usage::DEFAULT_THRESHOLD;

const CANDIDATES: [&str; 4] = [
    "cci-tools.toml",
    "cci-tools.json",
    "cci-tools.yaml",
    "cci-tools.yml",
];

/// Settings file for cci-tools.
///
/// Lets users keep their token, limits and report preferences out of the
/// command line. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub circleci: CircleCiConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Throttle for step output requests
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub usage: UsageConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircleCiConfig {
    /// Personal API token
    pub token: Option<String>,

    /// Root of the CircleCI installation
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PaginationConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UsageConfig {
    /// Where downloaded usage exports are written
    pub output_dir: Option<String>,

    /// Average CPU/RAM percentage below which a resource class counts as underused
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Default for CircleCiConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            threshold: default_threshold(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_pages() -> usize {
    cci_tools::client::pagination::DEFAULT_MAX_PAGES
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Uses `path` when given, otherwise the first of `cci-tools.toml`,
    /// `cci-tools.json`, `cci-tools.yaml`, `cci-tools.yml` in the current
    /// directory. Returns defaults if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_dir(Path::new(".")),
        }
    }

    fn load_from_dir(dir: &Path) -> Result<Self> {
        match CANDIDATES.iter().map(|name| dir.join(name)).find(|p| p.exists()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
        }
    }

    /// Save configuration to a file, format chosen by extension (TOML otherwise).
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn pagination_options(&self) -> PaginationOptions {
        PaginationOptions::default()
            .with_max_pages(self.pagination.max_pages)
            .with_timeout(Duration::from_millis(self.pagination.timeout_ms))
    }

    /// Client settings, with command-line/env values taking precedence over the file.
    pub fn client_config(&self, token: Option<&str>, base_url: Option<&str>) -> Result<ClientConfig> {
        let token = token
            .or(self.circleci.token.as_deref())
            .map(Token::from)
            .filter(|t| !t.is_empty())
            .context("No CircleCI token: pass --token, set CIRCLECI_TOKEN or add [circleci] token")?;
        let base_url = base_url.unwrap_or(&self.circleci.base_url);

        Ok(ClientConfig::new(token)?
            .with_base_url(base_url)?
            .with_pagination(self.pagination_options())
            .with_step_output_rate_limit(self.rate_limit.clone()))
    }
}

//! Configuration loading and root folder resolution
//!
//! Config file resolution priority:
//! 1. Command-line `--config` path (highest priority)
//! 2. `MAGICWORD_CONFIG` environment variable
//! 3. `~/.config/magicword/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file is not an error; the compiled defaults apply. A file that
//! exists but fails to parse is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MAGICWORD_CONFIG";

/// Environment variable overriding `generation.api_key`
pub const API_KEY_ENV_VAR: &str = "MAGICWORD_API_KEY";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "magicword.db";

/// What the study queue shows when nothing is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDuePolicy {
    /// Nothing due means nothing to study
    #[default]
    Strict,
    /// Nothing due replays every entry of the selected libraries
    ReplayAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` still wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

/// OpenAI-compatible chat completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1/".to_string(),
            api_key: None,
            model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Library used when a caller selects no libraries
    pub current_library_id: Option<i64>,
    pub empty_due_policy: EmptyDuePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Candidates per synthesis call
    pub chunk_size: usize,
    /// Chunks in flight per wave
    pub concurrency: usize,
    /// Re-queues allowed per chunk before it is reported as failed
    pub max_retries: u32,
    pub extraction_attempts: u32,
    pub extraction_retry_delay_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3,
            concurrency: 3,
            max_retries: 3,
            extraction_attempts: 3,
            extraction_retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog service root; catalog commands are unavailable without it
    pub base_url: Option<String>,
    pub batch_size: usize,
    pub max_pages_per_call: usize,
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            batch_size: 10,
            max_pages_per_call: 5,
            request_timeout_secs: 30,
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub generation: GenerationConfig,
    pub study: StudyConfig,
    pub import: ImportConfig,
    pub catalog: CatalogConfig,
}

impl TomlConfig {
    /// Configured root folder, or the platform default
    pub fn root_folder(&self) -> PathBuf {
        self.root_folder.clone().unwrap_or_else(default_root_folder)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder().join(DATABASE_FILE_NAME)
    }

    /// API key from `MAGICWORD_API_KEY`, falling back to `generation.api_key`
    ///
    /// Blank values count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                self.generation
                    .api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
            })
    }
}

/// Pick the config file to read, if any exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|path| path.exists())
}

/// `~/.config/magicword/config.toml` (platform equivalent elsewhere)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("magicword").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("magicword"))
        .unwrap_or_else(|| PathBuf::from("./magicword_data"))
}

/// Parse a config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Resolve and load the effective configuration
///
/// An explicitly named file that does not exist is logged and replaced by
/// defaults, so a first run never fails on configuration.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "Loading config file");
            load_toml_config(&path)
        }
        Some(path) => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(TomlConfig::default())
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Write the config atomically (temp file + rename)
///
/// The file holds an API key, so on Unix it is restricted to 0600.
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = target.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, target) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    tracing::info!(path = %target.display(), "Wrote config file");
    Ok(())
}

/// Whether group/other can read the config file
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

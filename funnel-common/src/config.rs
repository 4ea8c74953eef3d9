//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration loaded from `funnel-session.toml` in the root folder.
/// Every field has a default so a missing file means "run with defaults".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port the session service listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout around the single atomic counter increment. Exceeding it
    /// takes the degraded no-visitor-number path, not a user-facing error.
    #[serde(default = "default_allocator_timeout_ms")]
    pub allocator_timeout_ms: u64,

    /// Path returned by branching evaluation when no rule matches and no
    /// "default" rule is present
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,

    /// File name (relative to the root folder) of the experiment catalog
    #[serde(default = "default_experiments_file")]
    pub experiments_file: String,
}

fn default_port() -> u16 {
    5741
}

fn default_allocator_timeout_ms() -> u64 {
    750
}

fn default_fallback_path() -> String {
    "default".to_string()
}

fn default_experiments_file() -> String {
    "experiments.toml".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            allocator_timeout_ms: default_allocator_timeout_ms(),
            fallback_path: default_fallback_path(),
            experiments_file: default_experiments_file(),
        }
    }
}

impl ServiceConfig {
    /// Load from `<root>/funnel-session.toml`; defaults when the file is absent
    pub fn load(root_folder: &Path) -> Result<Self> {
        let path = root_folder.join("funnel-session.toml");
        if !path.exists() {
            tracing::info!("No service config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = load_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Get default configuration file path for the platform
fn load_config_file() -> Result<PathBuf> {
    let config_dir = if cfg!(target_os = "linux") {
        // Try ~/.config/funnel/config.toml first, then /etc/funnel/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("funnel").join("config.toml"));
        let system_config = PathBuf::from("/etc/funnel/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    } else {
        dirs::config_dir()
            .map(|d| d.join("funnel").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
    };

    if config_dir.exists() {
        Ok(config_dir)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_dir
        )))
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("funnel"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/funnel"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("funnel"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/funnel"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("funnel"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\funnel"))
    } else {
        PathBuf::from("./funnel_data")
    }
}

/// Database file path inside the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("funnel.db")
}

/// Uploads directory inside the root folder (local file storage collaborator)
pub fn uploads_dir(root_folder: &Path) -> PathBuf {
    root_folder.join("uploads")
}

/// Create the root folder (and uploads directory) if missing
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    std::fs::create_dir_all(root_folder)?;
    std::fs::create_dir_all(uploads_dir(root_folder))?;
    Ok(())
}

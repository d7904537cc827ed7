//! Configuration Vault – reads/writes `~/.knowrep/config.toml`.

use knowrep_memory::StoreOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Persisted user configuration stored in `~/.knowrep/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Location of the SQLite knowledge database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Milliseconds a write waits for a competing process to release the
    /// database lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String {
    home_dir()
        .join(".knowrep")
        .join("knowledge.db")
        .to_string_lossy()
        .into_owned()
}
fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Config {
    /// Connection options for [`knowrep_memory::LongTermMemory::open_with`].
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.knowrep/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir().to_string_lossy())
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".knowrep").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `KNOWREP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KNOWREP_DATABASE_PATH` | `database_path` |
/// | `KNOWREP_BUSY_TIMEOUT_MS` | `busy_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KNOWREP_DATABASE_PATH") {
        cfg.database_path = v;
    }
    if let Ok(v) = std::env::var("KNOWREP_BUSY_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.busy_timeout_ms = ms;
        }
}

/// Save the config to disk, creating `~/.knowrep/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

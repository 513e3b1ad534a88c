//! Settings vault – reads/writes `~/.motionsvc/config.toml`.
//!
//! Relative data-file paths are resolved against the vault directory, so the
//! default layout keeps everything under `~/.motionsvc/`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device list (JSON).
    #[serde(default = "default_devices_file")]
    pub devices_file: PathBuf,

    /// Taught positions written by `/save` (JSON).
    #[serde(default = "default_positions_file")]
    pub positions_file: PathBuf,

    /// Routing graphs (JSON).
    #[serde(default = "default_graphs_file")]
    pub graphs_file: PathBuf,

    /// Sampling period of `/monitor on`.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Speed applied to every connected device at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_speed: Option<f64>,

    /// How many "is moving" polls a simulated move lasts.
    #[serde(default = "default_sim_motion_polls")]
    pub sim_motion_polls: u32,
}

fn default_devices_file() -> PathBuf {
    PathBuf::from("devices.json")
}
fn default_positions_file() -> PathBuf {
    PathBuf::from("positions.json")
}
fn default_graphs_file() -> PathBuf {
    PathBuf::from("graphs.json")
}
fn default_monitor_interval_ms() -> u64 {
    500
}
fn default_sim_motion_polls() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices_file: default_devices_file(),
            positions_file: default_positions_file(),
            graphs_file: default_graphs_file(),
            monitor_interval_ms: default_monitor_interval_ms(),
            default_speed: None,
            sim_motion_polls: default_sim_motion_polls(),
        }
    }
}

/// The three data files with relative paths already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFiles {
    pub devices: PathBuf,
    pub positions: PathBuf,
    pub graphs: PathBuf,
}

impl Config {
    pub fn data_files(&self, base: &Path) -> DataFiles {
        DataFiles {
            devices: resolve(base, &self.devices_file),
            positions: resolve(base, &self.positions_file),
            graphs: resolve(base, &self.graphs_file),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return `~/.motionsvc`.
pub fn config_dir() -> PathBuf {
    config_dir_for_home(&home_dir())
}

/// Return `~/.motionsvc/config.toml`.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub(crate) fn config_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".motionsvc")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MOTIONSVC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOTIONSVC_DEVICES` | `devices_file` |
/// | `MOTIONSVC_POSITIONS` | `positions_file` |
/// | `MOTIONSVC_GRAPHS` | `graphs_file` |
/// | `MOTIONSVC_MONITOR_INTERVAL_MS` | `monitor_interval_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MOTIONSVC_DEVICES") {
        cfg.devices_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("MOTIONSVC_POSITIONS") {
        cfg.positions_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("MOTIONSVC_GRAPHS") {
        cfg.graphs_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("MOTIONSVC_MONITOR_INTERVAL_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.monitor_interval_ms = ms;
    }
}

/// Save the config, creating `~/.motionsvc/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Held by every test that reads or writes `MOTIONSVC_*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_from(&dir.path().join("config.toml")).unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            monitor_interval_ms: 250,
            default_speed: Some(4.5),
            ..Config::default()
        };
        save_to(&cfg, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), Some(cfg));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "sim_motion_polls = 3\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.sim_motion_polls, 3);
        assert_eq!(cfg.graphs_file, PathBuf::from("graphs.json"));
        assert_eq!(cfg.default_speed, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "monitor_interval_ms = \"soon\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let cfg = Config {
            graphs_file: PathBuf::from("/opt/cell/graphs.json"),
            ..Config::default()
        };
        let files = cfg.data_files(Path::new("/home/op/.motionsvc"));
        assert_eq!(files.devices, PathBuf::from("/home/op/.motionsvc/devices.json"));
        assert_eq!(files.graphs, PathBuf::from("/opt/cell/graphs.json"));
    }

    #[test]
    fn config_dir_is_under_home() {
        assert_eq!(
            config_dir_for_home("/home/op"),
            PathBuf::from("/home/op/.motionsvc")
        );
    }

    #[test]
    fn monitor_interval_override() {
        let _env = env_lock();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe { std::env::set_var("MOTIONSVC_MONITOR_INTERVAL_MS", "125") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe { std::env::remove_var("MOTIONSVC_MONITOR_INTERVAL_MS") };
        assert_eq!(cfg.monitor_interval_ms, 125);
    }

    #[test]
    fn unparsable_interval_override_is_ignored() {
        let _env = env_lock();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("MOTIONSVC_GRAPHS", "cell.json");
            std::env::set_var("MOTIONSVC_MONITOR_INTERVAL_MS", "soon");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("MOTIONSVC_GRAPHS");
            std::env::remove_var("MOTIONSVC_MONITOR_INTERVAL_MS");
        }
        assert_eq!(cfg.graphs_file, PathBuf::from("cell.json"));
        assert_eq!(cfg.monitor_interval_ms, 500);
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::{clamp_weight, DEFAULT_WEIGHT};
use library::scan::DEFAULT_AUDIO_EXTENSIONS;
use library::store::DEFAULT_STORE_FILE;
use library::{PersistMode, ReconcileOptions, ScanOptions, Workspace, DEFAULT_DISABLED_DIR};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistSetting {
    #[default]
    PerSong,
    Batch,
}

impl From<PersistSetting> for PersistMode {
    fn from(value: PersistSetting) -> Self {
        match value {
            PersistSetting::PerSong => PersistMode::PerSong,
            PersistSetting::Batch => PersistMode::Batch,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    pub version: u32,
    pub store_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_songs_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_orders_path: Option<String>,
    pub disabled_dir: String,
    pub default_weight: i64,
    pub persist: PersistSetting,
    pub write_tags: bool,
    pub audio_extensions: Vec<String>,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            store_path: DEFAULT_STORE_FILE.to_string(),
            legacy_songs_path: None,
            legacy_orders_path: None,
            disabled_dir: DEFAULT_DISABLED_DIR.to_string(),
            default_weight: i64::from(DEFAULT_WEIGHT),
            persist: PersistSetting::PerSong,
            write_tags: true,
            audio_extensions: default_extensions(),
        }
    }
}

impl PlaylistConfig {
    pub fn workspace(&self, folder: impl Into<PathBuf>) -> Workspace {
        Workspace::new(folder).with_disabled_dir(self.disabled_dir.clone())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            extensions: self.audio_extensions.clone(),
            default_weight: clamp_weight(self.default_weight),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            persist: self.persist.into(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("PLAYLIST_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("playlist.yaml"))
            .unwrap_or_else(|| PathBuf::from("playlist.yaml")),
        Err(_) => PathBuf::from("playlist.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(PlaylistConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: PlaylistConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.store_path.trim().is_empty() {
            config.store_path = DEFAULT_STORE_FILE.to_string();
        }
        if config.disabled_dir.trim().is_empty() {
            config.disabled_dir = DEFAULT_DISABLED_DIR.to_string();
        }
        config.default_weight = i64::from(clamp_weight(config.default_weight));
        config.audio_extensions.retain(|ext| !ext.trim().is_empty());
        if config.audio_extensions.is_empty() {
            config.audio_extensions = default_extensions();
        }
        for value in [&mut config.legacy_songs_path, &mut config.legacy_orders_path] {
            if value.as_deref().is_some_and(|path| path.trim().is_empty()) {
                *value = None;
            }
        }
        return Ok((config, false));
    }

    let config = PlaylistConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &PlaylistConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

fn default_extensions() -> Vec<String> {
    DEFAULT_AUDIO_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("playlist.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config.store_path, DEFAULT_STORE_FILE);
        assert_eq!(config.persist, PersistSetting::PerSong);
        assert!(path.exists());

        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again.disabled_dir, DEFAULT_DISABLED_DIR);
    }

    #[test]
    fn partial_config_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.yaml");
        fs::write(
            &path,
            "version: 0\nstore_path: ''\ndisabled_dir: Parked\ndefault_weight: 40\npersist: batch\naudio_extensions: []\nlegacy_songs_path: ''\n",
        )
        .unwrap();

        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.store_path, DEFAULT_STORE_FILE);
        assert_eq!(config.default_weight, 10);
        assert_eq!(config.audio_extensions.len(), DEFAULT_AUDIO_EXTENSIONS.len());
        assert!(config.legacy_songs_path.is_none());
        assert_eq!(config.reconcile_options().persist, PersistMode::Batch);
        assert_eq!(
            config.workspace("/music/mix").disabled_path(),
            PathBuf::from("/music/mix/Parked")
        );
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let config_path = Path::new("/etc/playlist/playlist.yaml");
        assert_eq!(
            resolve_path(config_path, "playlist.json"),
            PathBuf::from("/etc/playlist/playlist.json")
        );
        assert_eq!(
            resolve_path(config_path, "/data/playlist.json"),
            PathBuf::from("/data/playlist.json")
        );
        assert_eq!(
            resolve_path(Path::new("playlist.yaml"), "playlist.json"),
            PathBuf::from("./playlist.json")
        );
    }
}

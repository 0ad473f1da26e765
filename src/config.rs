use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "vidgrab";
const CONFIG_FILE: &str = "config.json";

/// Startup settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial download folder; the home directory when unset
    pub download_folder: Option<PathBuf>,
    /// Explicit yt-dlp binary
    pub ytdlp_path: Option<PathBuf>,
    /// Where thumbnails are cached
    pub thumbnail_dir: Option<PathBuf>,
    /// Used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_folder: None,
            ytdlp_path: None,
            thumbnail_dir: None,
            log_filter: "vidgrab=info".to_string(),
        }
    }
}

impl Config {
    /// Loads from `$VIDGRAB_CONFIG` or the platform config directory.
    /// A missing or broken file falls back to defaults.
    pub fn load() -> Self {
        let path = env::var_os("VIDGRAB_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)));

        let mut config = Self::load_from(path);
        if let Some(bin) = env::var_os("VIDGRAB_YTDLP") {
            config.ytdlp_path = Some(PathBuf::from(bin));
        }
        config
    }

    /// Reads `path` when it exists; defaults otherwise or when it cannot be parsed.
    pub fn load_from(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if path.exists() => Self::from_file(&path).unwrap_or_else(|e| {
                // Logging is not up yet.
                eprintln!("ignoring config {}: {:#}", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn download_folder(&self) -> PathBuf {
        self.download_folder
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.thumbnail_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(env::temp_dir)
                .join(APP_DIR)
                .join("thumbnails")
        })
    }
}

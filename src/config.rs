use serde::Deserialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const APP_NAME: &str = "wallpaper-picker";
pub const PICKER_EXECUTABLE: &str = "wallpaper-picker";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const SOCKET_NAME: &str = "wallpicker-menu.sock";
pub const GRID_COLUMNS: usize = 3;

/// Fallback folder for the direct front-end when nothing is configured.
pub fn default_wallpaper_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Pictures").join("Wallpapers"))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub wall_dirs: Vec<PathBuf>,
    pub picture_mode: Option<String>,
}

#[derive(Deserialize)]
struct RawConfig {
    wall_dirs: Option<Vec<String>>,
    wall_dir: Option<String>,
    picture_mode: Option<String>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let dirs = match (raw.wall_dirs, raw.wall_dir) {
            (Some(dirs), _) => dirs,
            // older files stored a single folder
            (None, Some(dir)) => vec![dir],
            (None, None) => Vec::new(),
        };
        Self {
            wall_dirs: dirs
                .into_iter()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect(),
            picture_mode: raw.picture_mode.filter(|mode| !mode.is_empty()),
        }
    }
}

/// Read-only view of the picker's `config.json`. Every query reads the file again.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
        Self::new(base.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Config {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no config file");
                return Config::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), "config unreadable: {err}");
                return Config::default();
            }
        };
        match serde_json::from_str::<RawConfig>(&text) {
            Ok(raw) => {
                let config = Config::from(raw);
                if config.wall_dirs.is_empty() {
                    warn!(path = %self.path.display(), "config lists no wallpaper directory");
                }
                config
            }
            Err(err) => {
                warn!(path = %self.path.display(), "config is not valid JSON: {err}");
                Config::default()
            }
        }
    }

    pub fn primary_directory(&self) -> Option<PathBuf> {
        let primary = self.load().wall_dirs.into_iter().next();
        if primary.is_none() {
            debug!("no wallpaper directory configured");
        }
        primary
    }
}

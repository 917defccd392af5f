use std::path::PathBuf;

use directories::ProjectDirs;

/// Per-user directories for the config file and logs.
///
/// Linux and Windows use the platform conventions from `directories`
/// (`~/.config/{name}`, `%APPDATA%\{name}\config`, ...). On macOS the config
/// lives in `~/.config/{name}` like on Linux.
pub struct ProjectPaths {
    name: String,
    dirs: ProjectDirs,
}

impl ProjectPaths {
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        let dirs = ProjectDirs::from("", "", name)?;
        Some(ProjectPaths {
            name: name.to_string(),
            dirs,
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            if let Some(base) = directories::BaseDirs::new() {
                return base.home_dir().join(".config").join(&self.name);
            }
        }

        self.dirs.config_dir().to_path_buf()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dirs.data_dir().to_path_buf()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

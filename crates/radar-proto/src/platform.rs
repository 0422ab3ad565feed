use std::path::PathBuf;

const APP_DIR: &str = "radar-viewer";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/radar-viewer/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join(APP_DIR)
    }
    #[cfg(windows)]
    {
        // Portable installs keep a data/ directory next to the executable
        if let Some(dir) = beside_exe("data") {
            return dir;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(config) = beside_exe("config.toml") {
            if let Some(dir) = config.parent() {
                return dir.to_path_buf();
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join(APP_DIR)
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

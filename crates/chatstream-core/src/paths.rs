use std::env;
use std::path::PathBuf;

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Result<String, String> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(home);
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Ok(profile);
        }
    }

    Err("Home directory not set".to_string())
}

/// `~/.config/chatstream`, or `$XDG_CONFIG_HOME/chatstream` when set.
pub fn config_dir() -> Result<PathBuf, String> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("chatstream"));
        }
    }

    get_home_dir().map(|home| PathBuf::from(home).join(".config").join("chatstream"))
}

/// Default location of the client config file.
pub fn default_config_path() -> Result<PathBuf, String> {
    config_dir().map(|dir| dir.join("config.json"))
}

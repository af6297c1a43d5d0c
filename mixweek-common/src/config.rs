//! Settings resolution for the weekly playlist bot
//!
//! Every setting resolves with ENV -> TOML priority: the environment
//! variable wins, the config file fills in anything the environment
//! leaves unset, and a setting found in neither fails startup.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Runtime settings for a single bot run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Discord bot token
    pub discord_token: String,
    /// Channel scanned for links and used for announcements
    pub discord_channel_id: String,
    /// Spotify application client id
    pub spotify_client_id: String,
    /// Spotify application client secret
    pub spotify_client_secret: String,
    /// Long-lived refresh token for the playlist owner account
    pub spotify_refresh_token: String,
    /// Exact name of the destination playlist
    pub playlist_name: String,
}

/// Optional file-based settings, deserialized from `config.toml`
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    discord_token: Option<String>,
    discord_channel_id: Option<String>,
    spotify_client_id: Option<String>,
    spotify_client_secret: Option<String>,
    spotify_refresh_token: Option<String>,
    playlist_name: Option<String>,
}

impl Settings {
    /// Load settings from the process environment, falling back to the
    /// platform config file for unset keys.
    pub fn load() -> Result<Self> {
        let file = match default_config_path() {
            Some(path) if path.exists() => load_file(&path)?,
            _ => FileSettings::default(),
        };

        Ok(Settings {
            discord_token: resolve("DISCORD_TOKEN", file.discord_token)?,
            discord_channel_id: require_numeric(
                "DISCORD_CHANNEL_ID",
                resolve("DISCORD_CHANNEL_ID", file.discord_channel_id)?,
            )?,
            spotify_client_id: resolve("SPOTIFY_CLIENT_ID", file.spotify_client_id)?,
            spotify_client_secret: resolve("SPOTIFY_CLIENT_SECRET", file.spotify_client_secret)?,
            spotify_refresh_token: resolve("SPOTIFY_REFRESH_TOKEN", file.spotify_refresh_token)?,
            playlist_name: resolve("PLAYLIST_NAME", file.playlist_name)?,
        })
    }
}

/// Resolve one setting with ENV -> TOML priority
fn resolve(env_key: &str, file_value: Option<String>) -> Result<String> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            debug!(setting = env_key, source = "environment", "Setting resolved");
            return Ok(value);
        }
        warn!(setting = env_key, "Environment variable set but empty, ignoring");
    }

    if let Some(value) = file_value {
        debug!(setting = env_key, source = "config file", "Setting resolved");
        return Ok(value);
    }

    Err(Error::Config(format!("Please set the setting: {}", env_key)))
}

/// Channel ids are snowflakes; anything but a decimal string is a
/// misconfiguration worth failing on before any remote call
fn require_numeric(key: &str, value: String) -> Result<String> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be a numeric id, got: {}",
            key, value
        )))
    }
}

fn load_file(path: &Path) -> Result<FileSettings> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Platform config file location, e.g. `~/.config/mixweek/config.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mixweek").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "DISCORD_TOKEN",
            "DISCORD_CHANNEL_ID",
            "SPOTIFY_CLIENT_ID",
            "SPOTIFY_CLIENT_SECRET",
            "SPOTIFY_REFRESH_TOKEN",
            "PLAYLIST_NAME",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn resolve_prefers_environment() {
        std::env::set_var("DISCORD_TOKEN", "env-token");
        let value = resolve("DISCORD_TOKEN", Some("file-token".to_string())).unwrap();
        assert_eq!(value, "env-token");
        std::env::remove_var("DISCORD_TOKEN");
    }

    #[test]
    #[serial]
    fn resolve_falls_back_to_file() {
        clear_env();
        let value = resolve("DISCORD_TOKEN", Some("file-token".to_string())).unwrap();
        assert_eq!(value, "file-token");
    }

    #[test]
    #[serial]
    fn missing_setting_names_the_key() {
        clear_env();
        let err = resolve("PLAYLIST_NAME", None).unwrap_err();
        assert!(err.to_string().contains("PLAYLIST_NAME"));
    }

    #[test]
    fn numeric_channel_id_passes() {
        let value = require_numeric("DISCORD_CHANNEL_ID", "123456789012345678".to_string());
        assert_eq!(value.unwrap(), "123456789012345678");
    }

    #[test]
    fn non_numeric_channel_id_is_invalid_input() {
        let err = require_numeric("DISCORD_CHANNEL_ID", "general".to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("DISCORD_CHANNEL_ID"));

        let err = require_numeric("DISCORD_CHANNEL_ID", String::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn file_settings_parse() {
        let parsed: FileSettings = toml::from_str(
            r#"
            discord_token = "t"
            playlist_name = "Weekly Mix"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.discord_token.as_deref(), Some("t"));
        assert_eq!(parsed.playlist_name.as_deref(), Some("Weekly Mix"));
        assert!(parsed.spotify_client_id.is_none());
    }
}

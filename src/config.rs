//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Application directory name under the per-user data directory
const APP_DIR: &str = "hotkey-guard";

/// Daemon configuration: where runtime files live
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// User settings (`config.json`)
    pub settings_path: PathBuf,

    /// Lockout snapshot (`security_state.json`)
    pub state_path: PathBuf,

    /// Security audit trail (`security.log`)
    pub security_log_path: PathBuf,

    /// Heartbeat results (`requests.log`)
    pub request_log_path: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = resolve_data_dir(|key| std::env::var(key).ok())?;
        Ok(Self::in_dir(data_dir))
    }

    /// Configuration rooted at `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            socket_path: data_dir.join("daemon.sock"),
            settings_path: data_dir.join("config.json"),
            state_path: data_dir.join("security_state.json"),
            security_log_path: data_dir.join("security.log"),
            request_log_path: data_dir.join("requests.log"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

/// Pick the data directory from `HOTKEY_GUARD_DATA_DIR`, `XDG_DATA_HOME` or `HOME`
fn resolve_data_dir(lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(dir) = non_empty("HOTKEY_GUARD_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_DATA_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    let home = non_empty("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".local").join("share").join(APP_DIR))
}

/// User-editable settings, stored as `config.json`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    #[serde(rename = "ShowTrayIcon")]
    pub show_tray_icon: bool,

    /// Shared code compared verbatim against challenge input
    #[serde(rename = "Valid2FA")]
    pub valid_code: String,

    #[serde(rename = "ApiEndpoint")]
    pub api_endpoint: String,

    #[serde(rename = "ApiToken")]
    pub api_token: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            show_tray_icon: true,
            valid_code: "246813".to_string(),
            api_endpoint: "http://127.0.0.1:8787".to_string(),
            api_token: "Bearer YOUR_TOKEN".to_string(),
        }
    }
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("show_tray_icon", &self.show_tray_icon)
            .field("valid_code", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults on any failure
    pub fn load(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(?path, "no settings file, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(?path, error = %e, "malformed settings, using defaults");
                Self::default()
            }
        }
    }

    /// Write settings as indented JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create settings directory")?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Flip tray visibility and save; returns the new visibility
    pub fn toggle_tray_icon(&mut self, path: &Path) -> bool {
        self.show_tray_icon = !self.show_tray_icon;
        if let Err(e) = self.save(path) {
            warn!(error = %e, "failed to save settings after tray toggle");
        }
        self.show_tray_icon
    }

    /// Exact comparison against the configured code
    pub fn verify_code(&self, input: &str) -> bool {
        input == self.valid_code
    }
}

/// `<hostname>_<username>` identifying this machine to the backend
pub fn client_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
        });
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok();
    identity_from(host, user)
}

fn identity_from(host: Option<String>, user: Option<String>) -> String {
    let part = |value: Option<String>| {
        value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    };
    format!("{}_{}", part(host), part(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_config_layout() {
        let config = Config::in_dir("/tmp/hotkey-guard-test");
        assert!(config.socket_path.ends_with("daemon.sock"));
        assert!(config.state_path.ends_with("security_state.json"));
        assert!(config.security_log_path.starts_with(&config.data_dir));
    }

    #[test]
    fn test_data_dir_resolution_order() {
        let dir = resolve_data_dir(env(&[
            ("HOTKEY_GUARD_DATA_DIR", "/custom"),
            ("XDG_DATA_HOME", "/xdg"),
            ("HOME", "/home/u"),
        ]))
        .unwrap();
        assert_eq!(dir, PathBuf::from("/custom"));

        let dir = resolve_data_dir(env(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/u")])).unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/hotkey-guard"));

        let dir = resolve_data_dir(env(&[("XDG_DATA_HOME", ""), ("HOME", "/home/u")])).unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.local/share/hotkey-guard"));

        assert!(resolve_data_dir(env(&[])).is_err());
    }

    #[test]
    fn test_settings_original_field_names() {
        let json = r#"{"ShowTrayIcon":false,"Valid2FA":"135790","ApiEndpoint":"https://api.test","ApiToken":"Bearer t"}"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert!(!settings.show_tray_icon);
        assert_eq!(settings.valid_code, "135790");
        assert_eq!(settings.api_endpoint, "https://api.test");
    }

    #[test]
    fn test_settings_partial_file_uses_defaults() {
        let settings: AppSettings = serde_json::from_str(r#"{"Valid2FA":"999"}"#).unwrap();
        assert_eq!(settings.valid_code, "999");
        assert!(settings.show_tray_icon);
    }

    #[test]
    fn test_settings_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(AppSettings::load(&path), AppSettings::default());

        std::fs::write(&path, "[1, 2").unwrap();
        assert_eq!(AppSettings::load(&path), AppSettings::default());
    }

    #[test]
    fn test_toggle_tray_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut settings = AppSettings::default();

        assert!(!settings.toggle_tray_icon(&path));
        assert!(!AppSettings::load(&path).show_tray_icon);
        assert!(settings.toggle_tray_icon(&path));
        assert!(AppSettings::load(&path).show_tray_icon);
    }

    #[test]
    fn test_verify_code_is_exact() {
        let settings = AppSettings::default();
        assert!(settings.verify_code("246813"));
        assert!(!settings.verify_code(" 246813"));
        assert!(!settings.verify_code("24681"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", AppSettings::default());
        assert!(!rendered.contains("246813"));
        assert!(!rendered.contains("YOUR_TOKEN"));
    }

    #[test]
    fn test_identity_from() {
        assert_eq!(
            identity_from(Some("desk".into()), Some("ana".into())),
            "desk_ana"
        );
        assert_eq!(identity_from(None, Some(" ".into())), "unknown_unknown");
    }
}

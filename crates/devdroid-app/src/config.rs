//! Session configuration
//!
//! An optional `devdroid.toml` in the project root overrides the defaults.
//! The application package id falls back to the `identifier` field of the
//! project's Tauri configuration, so most projects need no config file at
//! all.

use std::path::Path;

use serde::Deserialize;

use devdroid_core::prelude::*;

const CONFIG_FILENAME: &str = "devdroid.toml";

/// Resolved session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Application package id. Read from `src-tauri/tauri.conf.json` when
    /// not set here.
    pub package: Option<String>,
    /// Component started on the device.
    pub activity: String,
    /// Port the dev server listens on.
    pub local_port: u16,
    /// Device port reversed back to this host.
    pub remote_port: u16,
    /// Dev-server command line; `--host <addr>` is appended.
    pub dev_server_command: Vec<String>,
    /// Debug-build command line; `--target <arch>` is appended when the
    /// device architecture is known.
    pub build_command: Vec<String>,
    /// Tag allow-list for log streaming when the app's pid can't be found.
    pub log_tags: Vec<String>,
    /// Extra address prefixes to exclude from LAN discovery.
    pub excluded_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package: None,
            activity: ".MainActivity".to_string(),
            local_port: 1420,
            remote_port: 1420,
            dev_server_command: vec!["pnpm".to_string(), "dev".to_string()],
            build_command: vec![
                "pnpm".to_string(),
                "tauri".to_string(),
                "android".to_string(),
                "build".to_string(),
                "--debug".to_string(),
            ],
            log_tags: vec![
                "Tauri".to_string(),
                "RustStdoutStderr".to_string(),
                "WebView".to_string(),
                "chromium".to_string(),
            ],
            excluded_prefixes: Vec::new(),
        }
    }
}

impl Config {
    /// Load the configuration for a project.
    ///
    /// Missing `devdroid.toml` is fine; a malformed one is a hard error so
    /// typos don't silently fall back to defaults.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILENAME);
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        if config.package.is_none() {
            config.package = read_tauri_identifier(project_root);
        }
        Ok(config)
    }

    /// The launch target, or a configuration error naming what to set.
    pub fn require_package(&self) -> Result<&str> {
        self.package.as_deref().ok_or_else(|| {
            Error::config(
                "no application package id; set `package` in devdroid.toml \
                 or an `identifier` in src-tauri/tauri.conf.json",
            )
        })
    }
}

#[derive(Deserialize)]
struct TauriConf {
    identifier: Option<String>,
}

fn read_tauri_identifier(project_root: &Path) -> Option<String> {
    let path = project_root.join("src-tauri").join("tauri.conf.json");
    let text = std::fs::read_to_string(&path).ok()?;
    let conf: TauriConf = serde_json::from_str(&text).ok()?;
    let identifier = conf.identifier.filter(|id| !id.is_empty())?;
    debug!("Package id {} read from {}", identifier, path.display());
    Some(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.local_port, 1420);
        assert_eq!(config.remote_port, 1420);
        assert_eq!(config.activity, ".MainActivity");
        assert_eq!(config.dev_server_command, vec!["pnpm", "dev"]);
        assert!(config.package.is_none());
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.local_port, 1420);
        assert!(config.package.is_none());
    }

    #[test]
    fn test_load_merges_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"
package = "com.example.app"
local_port = 5173
"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.package.as_deref(), Some("com.example.app"));
        assert_eq!(config.local_port, 5173);
        // untouched fields keep their defaults
        assert_eq!(config.remote_port, 1420);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "pakage = \"typo\"\n").unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_package_falls_back_to_tauri_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let tauri_dir = dir.path().join("src-tauri");
        std::fs::create_dir_all(&tauri_dir).unwrap();
        std::fs::write(
            tauri_dir.join("tauri.conf.json"),
            r#"{"productName": "Example", "identifier": "com.example.app", "version": "0.1.0"}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.package.as_deref(), Some("com.example.app"));
    }

    #[test]
    fn test_explicit_package_wins_over_tauri_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let tauri_dir = dir.path().join("src-tauri");
        std::fs::create_dir_all(&tauri_dir).unwrap();
        std::fs::write(
            tauri_dir.join("tauri.conf.json"),
            r#"{"identifier": "com.example.app"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            "package = \"com.example.dev\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.package.as_deref(), Some("com.example.dev"));
    }

    #[test]
    fn test_require_package_errors_when_unset() {
        let config = Config::default();
        let err = config.require_package().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}

//! Dev server configuration.
//!
//! Merging follows a fixed priority: CLI overrides > environment > config
//! file > defaults. The merge is a pure function of those inputs; the
//! environment is snapshotted once per load, never polled.

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry in the ordered proxy table.
///
/// A bare string is shorthand for `{ "target": "..." }`, matching the
/// common case of forwarding a prefix to a single upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyEntry {
    /// Shorthand: the upstream target URL.
    Target(String),
    /// Full form with an optional match filter overriding the table key.
    Detailed {
        /// Upstream target URL.
        target: String,
        /// Path prefix to match instead of the table key.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
}

impl ProxyEntry {
    /// The upstream target URL.
    pub fn target(&self) -> &str {
        match self {
            ProxyEntry::Target(target) => target,
            ProxyEntry::Detailed { target, .. } => target,
        }
    }

    /// The explicit match filter, if any.
    pub fn filter(&self) -> Option<&str> {
        match self {
            ProxyEntry::Target(_) => None,
            ProxyEntry::Detailed { filter, .. } => filter.as_deref(),
        }
    }
}

/// Configuration for the supervised watch-mode build command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundlerConfig {
    /// Program to run, e.g. `"npx"`.
    #[serde(default)]
    pub command: String,

    /// Arguments, e.g. `["webpack", "--watch"]`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Case-insensitive stdout substring marking a completed build.
    #[serde(default = "defaults::ready_pattern")]
    pub ready_pattern: String,

    /// Case-insensitive stdout substring marking a failed build. Empty
    /// disables error detection.
    #[serde(default = "defaults::error_pattern")]
    pub error_pattern: String,

    /// Working directory for the build command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            ready_pattern: defaults::ready_pattern(),
            error_pattern: defaults::error_pattern(),
            cwd: None,
        }
    }
}

/// Development server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevConfig {
    /// Preferred HTTP port; the allocator scans upward when it is taken.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Open a browser once the server is up. Advisory: acted on by the CLI,
    /// ignored by the core.
    #[serde(default)]
    pub auto_open_browser: bool,

    /// Ordered proxy table: path prefix to upstream target. Declaration
    /// order is match order.
    #[serde(default)]
    pub proxy_table: IndexMap<String, ProxyEntry>,

    /// URL prefix where bundler output is served.
    #[serde(default = "defaults::assets_public_path")]
    pub assets_public_path: String,

    /// Directory of raw static assets, served under its own name inside the
    /// public path.
    #[serde(default = "defaults::assets_sub_directory")]
    pub assets_sub_directory: String,

    /// Surface rebuild failures as error-level notifications.
    #[serde(default)]
    pub notify_on_errors: bool,

    /// Bundler output directory; the root document and compiled assets are
    /// served from here.
    #[serde(default = "defaults::out_dir")]
    pub out_dir: PathBuf,

    /// On a failed restart, rebuild from the last known good configuration
    /// instead of leaving the server down.
    #[serde(default)]
    pub restart_fallback: bool,

    /// Debounce window for config-change notifications, in milliseconds.
    #[serde(default = "defaults::watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Environment mode indicator ("development" unless overridden).
    #[serde(default = "defaults::mode")]
    pub mode: String,

    /// Watch-mode build command settings.
    #[serde(default)]
    pub bundler: BundlerConfig,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            auto_open_browser: false,
            proxy_table: IndexMap::new(),
            assets_public_path: defaults::assets_public_path(),
            assets_sub_directory: defaults::assets_sub_directory(),
            notify_on_errors: false,
            out_dir: defaults::out_dir(),
            restart_fallback: false,
            watch_debounce_ms: defaults::watch_debounce_ms(),
            mode: defaults::mode(),
            bundler: BundlerConfig::default(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(super) fn port() -> u16 {
        3000
    }

    pub(super) fn assets_public_path() -> String {
        "/".to_string()
    }

    pub(super) fn assets_sub_directory() -> String {
        "static".to_string()
    }

    pub(super) fn out_dir() -> PathBuf {
        PathBuf::from("dist")
    }

    pub(super) fn watch_debounce_ms() -> u64 {
        100
    }

    pub(super) fn mode() -> String {
        "development".to_string()
    }

    pub(super) fn ready_pattern() -> String {
        "compiled successfully".to_string()
    }

    pub(super) fn error_pattern() -> String {
        "error".to_string()
    }
}

impl DevConfig {
    /// Load configuration from multiple sources.
    /// Priority: environment > config file > defaults.
    ///
    /// The `PORT` and `QUAY_ENV` variables are read once here, matching the
    /// startup-only environment contract.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            figment = figment.merge(Json::file(path));
        }

        // QUAY_ENV is read explicitly below, not merged as a field.
        figment = figment.merge(Env::prefixed("QUAY_").ignore(&["env"]).split("_"));

        let mut config: Self = figment.extract()?;

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!("ignoring unparseable PORT override: {port}"),
            }
        }
        if let Ok(mode) = std::env::var("QUAY_ENV") {
            config.mode = mode;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: "0".to_string(),
                hint: "Use a port between 1 and 65535".to_string(),
            });
        }

        if self.bundler.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bundler.command".to_string(),
                value: String::new(),
                hint: "Set the watch-mode build command, e.g. \"npx\" with args [\"webpack\", \"--watch\"]".to_string(),
            });
        }

        for (prefix, entry) in &self.proxy_table {
            if entry.target().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("proxyTable.{prefix}"),
                    value: String::new(),
                    hint: "Proxy targets must be absolute URLs, e.g. http://localhost:9000".to_string(),
                });
            }
            if !entry.filter().unwrap_or(prefix).starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: format!("proxyTable.{prefix}"),
                    value: prefix.clone(),
                    hint: "Proxy prefixes must start with '/'".to_string(),
                });
            }
        }

        Ok(())
    }

    /// URL prefix for the raw static-asset mount: the public path joined
    /// with the sub directory, posix style.
    pub fn assets_base(&self) -> String {
        let public = self.assets_public_path.trim_end_matches('/');
        let sub = self.assets_sub_directory.trim_matches('/');
        format!("{public}/{sub}")
    }
}

/// Recomputes the merged configuration on demand.
///
/// The lifecycle manager calls this on every restart; implementations must
/// be pure over their captured inputs plus the environment snapshot.
pub trait ConfigLoad: Send + 'static {
    /// Produce the merged configuration.
    fn load(&self) -> Result<DevConfig, ConfigError>;
}

impl<F> ConfigLoad for F
where
    F: Fn() -> Result<DevConfig, ConfigError> + Send + 'static,
{
    fn load(&self) -> Result<DevConfig, ConfigError> {
        (self)()
    }
}

/// File-backed loader with CLI-level overrides applied on every reload.
pub struct FileConfigLoader {
    path: Option<PathBuf>,
    port_override: Option<u16>,
}

impl FileConfigLoader {
    /// Loader for an explicit config path.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            port_override: None,
        }
    }

    /// Loader using `quay.config.json` from the working directory when it
    /// exists, defaults-only otherwise.
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let path = explicit.or_else(|| {
            let default_path = Path::new("quay.config.json");
            default_path.exists().then(|| default_path.to_path_buf())
        });
        Self {
            path,
            port_override: None,
        }
    }

    /// Apply a port override that survives reloads (the `--port` flag).
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port_override = port;
        self
    }

    /// Path of the watched config file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl ConfigLoad for FileConfigLoader {
    fn load(&self) -> Result<DevConfig, ConfigError> {
        let mut config = DevConfig::load(self.path.as_deref())?;
        if let Some(port) = self.port_override {
            config.port = port;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn valid_config() -> DevConfig {
        DevConfig {
            bundler: BundlerConfig {
                command: "npx".to_string(),
                args: vec!["webpack".to_string(), "--watch".to_string()],
                ..BundlerConfig::default()
            },
            ..DevConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = DevConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.assets_public_path, "/");
        assert_eq!(config.assets_sub_directory, "static");
        assert_eq!(config.out_dir, PathBuf::from("dist"));
        assert!(!config.auto_open_browser);
        assert!(config.proxy_table.is_empty());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut config = valid_config();
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_bundler_command() {
        let config = DevConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bundler.command"));
    }

    #[test]
    fn test_validate_rejects_relative_proxy_prefix() {
        let mut config = valid_config();
        config.proxy_table.insert(
            "api".to_string(),
            ProxyEntry::Target("http://localhost:9000".to_string()),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_entry_forms() {
        let bare: ProxyEntry = serde_json::from_str(r#""http://localhost:9000""#).unwrap();
        assert_eq!(bare.target(), "http://localhost:9000");
        assert_eq!(bare.filter(), None);

        let detailed: ProxyEntry =
            serde_json::from_str(r#"{"target": "http://localhost:9000", "filter": "/v2/api"}"#)
                .unwrap();
        assert_eq!(detailed.target(), "http://localhost:9000");
        assert_eq!(detailed.filter(), Some("/v2/api"));
    }

    #[test]
    fn test_proxy_table_preserves_declaration_order() {
        let json = r#"{
            "proxyTable": {
                "/api/v2": "http://localhost:9002",
                "/api": "http://localhost:9000",
                "/ws": "http://localhost:9001"
            }
        }"#;
        let config: DevConfig = serde_json::from_str(json).unwrap();
        let prefixes: Vec<&str> = config.proxy_table.keys().map(String::as_str).collect();
        assert_eq!(prefixes, vec!["/api/v2", "/api", "/ws"]);
    }

    #[test]
    #[serial]
    fn test_load_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay.config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "port": 4000,
                "notifyOnErrors": true,
                "bundler": {{ "command": "npx", "args": ["webpack", "--watch"] }}
            }}"#
        )
        .unwrap();

        std::env::remove_var("PORT");
        std::env::remove_var("QUAY_ENV");

        let config = DevConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 4000);
        assert!(config.notify_on_errors);
        // untouched fields keep their defaults
        assert_eq!(config.assets_sub_directory, "static");
    }

    #[test]
    #[serial]
    fn test_port_env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay.config.json");
        std::fs::write(
            &path,
            r#"{ "port": 4000, "bundler": { "command": "npx" } }"#,
        )
        .unwrap();

        std::env::set_var("PORT", "5000");
        let config = DevConfig::load(Some(&path)).unwrap();
        std::env::remove_var("PORT");

        assert_eq!(config.port, 5000);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_is_an_error() {
        let err = DevConfig::load(Some(Path::new("/nonexistent/quay.config.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_assets_base_joins_posix_style() {
        let config = DevConfig::default();
        assert_eq!(config.assets_base(), "/static");

        let mut config = DevConfig::default();
        config.assets_public_path = "/app/".to_string();
        config.assets_sub_directory = "assets".to_string();
        assert_eq!(config.assets_base(), "/app/assets");
    }

    #[test]
    fn test_file_loader_port_override_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay.config.json");
        std::fs::write(
            &path,
            r#"{ "port": 4000, "bundler": { "command": "npx" } }"#,
        )
        .unwrap();

        let loader = FileConfigLoader::new(path).with_port(Some(8123));
        assert_eq!(loader.load().unwrap().port, 8123);
        // a second load recomputes from the file but keeps the override
        assert_eq!(loader.load().unwrap().port, 8123);
    }
}

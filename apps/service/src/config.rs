use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}")]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to write config file {0}")]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub screenshots: ScreenshotSettings,
    pub retention: RetentionSettings,
    pub notifications: NotificationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between scan rounds
    pub interval_seconds: u64,
    /// HTTP probe timeout
    pub timeout_seconds: u64,
    pub run_once: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { interval_seconds: 60, timeout_seconds: 10, run_once: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub max_connections: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "pagewatch.db".into(), max_connections: 16 }
    }
}

/// Artifact storage backend, selected once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageSettings {
    Local(LocalStorageSettings),
    S3(S3StorageSettings),
    Gateway(GatewayStorageSettings),
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::Local(LocalStorageSettings::default())
    }
}

impl StorageSettings {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::S3(_) => "s3",
            Self::Gateway(_) => "gateway",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStorageSettings {
    pub root: String,
    /// Path prefix under which the hosting web layer proxies artifacts
    pub public_prefix: String,
}

impl Default for LocalStorageSettings {
    fn default() -> Self {
        Self { root: "screenshots".into(), public_prefix: DEFAULT_PUBLIC_PREFIX.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3StorageSettings {
    pub bucket: String,
    pub region: String,
    /// Empty means AWS proper
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub key_prefix: String,
    pub presign_expiry_seconds: u32,
    pub path_style: bool,
}

impl Default for S3StorageSettings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".into(),
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            key_prefix: "screenshots".into(),
            presign_expiry_seconds: 3600,
            path_style: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayStorageSettings {
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    /// Leave both keys empty for anonymous access
    pub access_key: String,
    pub secret_key: String,
    pub key_prefix: String,
    pub public_prefix: String,
}

impl Default for GatewayStorageSettings {
    fn default() -> Self {
        Self {
            bucket: "screenshots".into(),
            region: "us-east-1".into(),
            endpoint: "http://localhost:8333".into(),
            access_key: String::new(),
            secret_key: String::new(),
            key_prefix: String::new(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.into(),
        }
    }
}

pub const DEFAULT_PUBLIC_PREFIX: &str = "/api/screenshots";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotSettings {
    pub jpeg_quality: u8,
    pub thumbnail_width: u32,
    pub thumbnail_quality: u8,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub capture_timeout_ms: u64,
    /// Explicit Chrome/Chromium binary; autodetected when unset
    pub chrome_path: Option<String>,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 82,
            thumbnail_width: 480,
            thumbnail_quality: 55,
            viewport_width: 1280,
            viewport_height: 720,
            capture_timeout_ms: 30_000,
            chrome_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub max_screenshots_per_page: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self { max_screenshots_per_page: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub site_base_url: String,
    pub from_address: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            site_base_url: "http://localhost:8000".into(),
            from_address: "webmon@localhost".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// "compact" or "json"
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pagewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pagewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Scan interval (s)", &self.scheduler.interval_seconds)?;
        write_1(f, "Probe timeout (s)", &self.scheduler.timeout_seconds)?;
        write_1(f, "Run once", &self.scheduler.run_once)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Backend", &self.storage.backend_name())?;
        match &self.storage {
            StorageSettings::Local(local) => write_1(f, "Root", &local.root)?,
            StorageSettings::S3(s3) => {
                write_1(f, "Bucket", &s3.bucket)?;
                write_1(f, "Endpoint", &display_or(&s3.endpoint, "AWS"))?;
            }
            StorageSettings::Gateway(gateway) => {
                write_1(f, "Bucket", &gateway.bucket)?;
                write_1(f, "Endpoint", &gateway.endpoint)?;
                let auth = if gateway.access_key.is_empty() { "anonymous" } else { "keys" };
                write_1(f, "Auth", &auth)?;
            }
        }
        write_title_1(f, "Screenshots")?;
        write_1(f, "JPEG quality", &self.screenshots.jpeg_quality)?;
        write_1(
            f,
            "Viewport",
            &format!("{}x{}", self.screenshots.viewport_width, self.screenshots.viewport_height),
        )?;
        write_title_1(f, "Retention")?;
        write_1(f, "Max screenshots per page", &self.retention.max_screenshots_per_page)?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Site base URL", &self.notifications.site_base_url)?;

        Ok(())
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pagewatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// let cfg = pagewatch::config::Config::from_config(None::<&std::path::Path>).unwrap();
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|err| ConfigError::ReadFailed(config_path.clone(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ConfigError::WriteFailed(parent.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| ConfigError::WriteFailed(path.to_path_buf(), err))
    }

    /// Apply `PAGEWATCH_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok().filter(|value| !value.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("PAGEWATCH_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(base_url) = lookup("PAGEWATCH_SITE_BASE_URL") {
            self.notifications.site_base_url = base_url;
        }

        let access_key = lookup("PAGEWATCH_S3_ACCESS_KEY");
        let secret_key = lookup("PAGEWATCH_S3_SECRET_KEY");
        match &mut self.storage {
            StorageSettings::Local(local) => {
                if let Some(root) = lookup("PAGEWATCH_STORAGE_ROOT") {
                    local.root = root;
                }
            }
            StorageSettings::S3(s3) => {
                if let Some(key) = access_key {
                    s3.access_key = key;
                }
                if let Some(secret) = secret_key {
                    s3.secret_key = secret;
                }
            }
            StorageSettings::Gateway(gateway) => {
                if let Some(key) = access_key {
                    gateway.access_key = key;
                }
                if let Some(secret) = secret_key {
                    gateway.secret_key = secret;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.interval_seconds, 60);
        assert_eq!(config.scheduler.timeout_seconds, 10);
        assert_eq!(config.screenshots.jpeg_quality, 82);
        assert_eq!(config.screenshots.thumbnail_width, 480);
        assert_eq!(config.retention.max_screenshots_per_page, 30);
        assert!(matches!(config.storage, StorageSettings::Local(_)));
    }

    #[test]
    fn test_from_config_writes_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.database.path, "pagewatch.db");
        assert!(dir.path().join("nested/config.toml").exists());

        // Second load reads the file back
        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.storage.backend_name(), "local");
    }

    #[test]
    fn test_parse_gateway_backend() {
        let raw = r#"
            [scheduler]
            interval_seconds = 30

            [storage]
            backend = "gateway"
            bucket = "shots"
            endpoint = "http://seaweed:8333"
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.scheduler.interval_seconds, 30);
        assert_eq!(config.scheduler.timeout_seconds, 10);
        match config.storage {
            StorageSettings::Gateway(gateway) => {
                assert_eq!(gateway.bucket, "shots");
                assert_eq!(gateway.endpoint, "http://seaweed:8333");
                assert!(gateway.access_key.is_empty());
                assert_eq!(gateway.public_prefix, DEFAULT_PUBLIC_PREFIX);
            }
            other => panic!("expected gateway backend, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config: Config = toml::from_str(
            r#"
            [storage]
            backend = "s3"
            bucket = "b"
        "#,
        )
        .unwrap();

        let vars: HashMap<&str, &str> = [
            ("PAGEWATCH_DATABASE_PATH", "/var/lib/pagewatch.db"),
            ("PAGEWATCH_S3_ACCESS_KEY", "AKIA"),
            ("PAGEWATCH_S3_SECRET_KEY", "secret"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.database.path, "/var/lib/pagewatch.db");
        match config.storage {
            StorageSettings::S3(s3) => {
                assert_eq!(s3.access_key, "AKIA");
                assert_eq!(s3.secret_key, "secret");
                assert_eq!(s3.presign_expiry_seconds, 3600);
            }
            other => panic!("expected s3 backend, got {other:?}"),
        }
    }
}

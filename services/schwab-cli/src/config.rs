//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The app key and secret come from SCHWAB_APP_KEY / SCHWAB_APP_SECRET or
//! from the files named by app_key_file / app_secret_file, never from the
//! TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use schwab_auth::AppCredentials;
use schwab_client::ClientConfig;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub tokens: TokensConfig,
}

/// Registered application settings
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    #[serde(default)]
    pub app_key_file: Option<PathBuf>,
    #[serde(default)]
    pub app_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub app_key: Option<Secret<String>>,
    #[serde(skip)]
    pub app_secret: Option<Secret<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            callback_url: default_callback_url(),
            app_key_file: None,
            app_secret_file: None,
            app_key: None,
            app_secret: None,
        }
    }
}

/// `[client]` table, mapped onto [`ClientConfig`]
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_true")]
    pub use_shared_transport: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            use_shared_transport: true,
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokensConfig {
    #[serde(default = "default_tokens_path")]
    pub path: PathBuf,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            path: default_tokens_path(),
        }
    }
}

fn default_callback_url() -> String {
    schwab_auth::DEFAULT_CALLBACK_URL.to_owned()
}

fn default_timeout() -> u64 {
    10
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    schwab_client::config::DEFAULT_BASE_URL.to_owned()
}

fn default_tokens_path() -> PathBuf {
    PathBuf::from("tokens.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// App key resolution order (secret likewise):
    /// 1. SCHWAB_APP_KEY env var
    /// 2. app_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config
            .client_config()
            .validate()
            .map_err(|e| match e {
                schwab_client::Error::Config(msg) => common::Error::Config(msg),
                other => common::Error::Config(other.to_string()),
            })?;

        config.app.app_key = resolve_secret("SCHWAB_APP_KEY", config.app.app_key_file.as_deref())?;
        config.app.app_secret =
            resolve_secret("SCHWAB_APP_SECRET", config.app.app_secret_file.as_deref())?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("schwab.toml")
    }

    /// App credentials, or a config error naming what is missing.
    pub fn credentials(&self) -> common::Result<AppCredentials> {
        let key = self.app.app_key.as_ref().ok_or_else(|| {
            common::Error::Config("app key missing: set SCHWAB_APP_KEY or app_key_file".into())
        })?;
        let secret = self.app.app_secret.as_ref().ok_or_else(|| {
            common::Error::Config(
                "app secret missing: set SCHWAB_APP_SECRET or app_secret_file".into(),
            )
        })?;
        Ok(AppCredentials::new(
            key.expose().as_str(),
            secret.expose().as_str(),
        ))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.client.timeout_secs),
            refresh_interval: Duration::from_secs(self.client.refresh_interval_secs),
            use_shared_transport: self.client.use_shared_transport,
            base_url: self.client.base_url.clone(),
            ..ClientConfig::default()
        }
    }
}

/// Env var wins; otherwise read the file, treating whitespace-only content as unset.
fn resolve_secret(env_key: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_key) {
        return Ok(Some(Secret::new(value)));
    }
    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {}: {e}", file.display()))
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| Secret::new(value.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_app_env() {
        unsafe {
            remove_env("SCHWAB_APP_KEY");
            remove_env("SCHWAB_APP_SECRET");
        }
    }

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("schwab.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.app.callback_url, "https://127.0.0.1");
        assert_eq!(config.client.timeout_secs, 10);
        assert_eq!(config.client.refresh_interval_secs, 30);
        assert!(config.client.use_shared_transport);
        assert_eq!(config.client.base_url, "https://api.schwabapi.com");
        assert_eq!(config.tokens.path, PathBuf::from("tokens.json"));
        assert!(config.app.app_key.is_none());
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_client_section_maps_to_client_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
[client]
timeout_secs = 5
refresh_interval_secs = 60
use_shared_transport = false
base_url = "http://127.0.0.1:9000"

[tokens]
path = "/var/lib/schwab/tokens.json"
"#,
        );

        let config = Config::load(&path).unwrap();
        let client = config.client_config();
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert_eq!(client.refresh_interval, Duration::from_secs(60));
        assert!(!client.use_shared_transport);
        assert_eq!(client.base_url, "http://127.0.0.1:9000");
        assert!(client.validate().is_ok());
        assert_eq!(
            config.tokens.path,
            PathBuf::from("/var/lib/schwab/tokens.json")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/schwab.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[client]\ntimeout_secs = 0\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("timeout must be greater than 0"), "got: {err}");
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[client]\ntimeout_secs = -1\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[client]\nrefresh_interval_secs = 0\n");
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("refresh_interval must be greater than 0"), "got: {err}");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[client]\nbase_url = \"api.schwabapi.com\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_app_credentials_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");

        unsafe {
            set_env("SCHWAB_APP_KEY", "key-from-env");
            set_env("SCHWAB_APP_SECRET", "secret-from-env");
        }
        let config = Config::load(&path).unwrap();
        clear_app_env();

        let app = config.credentials().unwrap();
        assert_eq!(app.key.expose(), "key-from-env");
        assert_eq!(app.secret.expose(), "secret-from-env");
    }

    #[test]
    fn test_app_credentials_from_files() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("app_key");
        let secret_path = dir.path().join("app_secret");
        std::fs::write(&key_path, "key-from-file\n").unwrap();
        std::fs::write(&secret_path, "secret-from-file").unwrap();
        let path = write_config(
            dir.path(),
            &format!(
                "[app]\napp_key_file = \"{}\"\napp_secret_file = \"{}\"\n",
                key_path.display(),
                secret_path.display()
            ),
        );

        let config = Config::load(&path).unwrap();
        let app = config.credentials().unwrap();
        assert_eq!(app.key.expose(), "key-from-file");
        assert_eq!(app.secret.expose(), "secret-from-file");
    }

    #[test]
    fn test_env_overrides_missing_key_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[app]\napp_key_file = \"/nonexistent/app_key\"\n",
        );

        assert!(
            Config::load(&path).is_err(),
            "nonexistent app_key_file must return an error"
        );

        unsafe { set_env("SCHWAB_APP_KEY", "env-wins") };
        let config = Config::load(&path).unwrap();
        clear_app_env();
        assert_eq!(config.app.app_key.as_ref().unwrap().expose(), "env-wins");
    }

    #[test]
    fn test_whitespace_key_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_app_env();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("app_key");
        std::fs::write(&key_path, "  \n  ").unwrap();
        let path = write_config(
            dir.path(),
            &format!("[app]\napp_key_file = \"{}\"\n", key_path.display()),
        );

        let config = Config::load(&path).unwrap();
        assert!(config.app.app_key.is_none());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("schwab.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }
}

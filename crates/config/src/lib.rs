use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "chatwire.toml",
    "config/chatwire.toml",
    "crates/config/chatwire.toml",
    "../chatwire.toml",
    "../config/chatwire.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    /// Reject combinations that would leave the delivery core unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.auth.jwt_secret.trim().is_empty(),
            "auth.jwt_secret must not be empty"
        );
        ensure!(
            self.database.max_connections > 0,
            "database.max_connections must be greater than zero"
        );
        self.realtime.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://chatwire.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Settings for bearer-token verification.
///
/// ```
/// use chatwire_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.token_ttl_seconds, 3_600);
/// assert!(!auth.jwt_secret.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl AuthConfig {
    fn default_secret() -> String {
        "change-me-in-production".to_string()
    }

    const fn default_token_ttl() -> u64 {
        3_600
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_secret(),
            token_ttl_seconds: Self::default_token_ttl(),
        }
    }
}

/// Operational parameters of the connection coordinator and the
/// per-connection reader/writer loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "RealtimeConfig::default_inbox_capacity")]
    pub coordinator_inbox_capacity: usize,
    #[serde(default = "RealtimeConfig::default_ping_interval")]
    pub ping_interval_seconds: u64,
    #[serde(default = "RealtimeConfig::default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl RealtimeConfig {
    const fn default_outbound_queue_capacity() -> usize {
        64
    }

    const fn default_inbox_capacity() -> usize {
        1024
    }

    const fn default_ping_interval() -> u64 {
        30
    }

    const fn default_idle_timeout() -> u64 {
        90
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.outbound_queue_capacity > 0,
            "realtime.outbound_queue_capacity must be greater than zero"
        );
        ensure!(
            self.coordinator_inbox_capacity > 0,
            "realtime.coordinator_inbox_capacity must be greater than zero"
        );
        ensure!(
            self.ping_interval_seconds > 0,
            "realtime.ping_interval_seconds must be greater than zero"
        );
        ensure!(
            self.idle_timeout_seconds > self.ping_interval_seconds,
            "realtime.idle_timeout_seconds must exceed realtime.ping_interval_seconds"
        );
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: Self::default_outbound_queue_capacity(),
            coordinator_inbox_capacity: Self::default_inbox_capacity(),
            ping_interval_seconds: Self::default_ping_interval(),
            idle_timeout_seconds: Self::default_idle_timeout(),
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use chatwire_config::load;
///
/// std::env::remove_var("CHATWIRE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            to_i64(defaults.auth.token_ttl_seconds),
        )?
        .set_default(
            "realtime.outbound_queue_capacity",
            to_i64(defaults.realtime.outbound_queue_capacity as u64),
        )?
        .set_default(
            "realtime.coordinator_inbox_capacity",
            to_i64(defaults.realtime.coordinator_inbox_capacity as u64),
        )?
        .set_default(
            "realtime.ping_interval_seconds",
            to_i64(defaults.realtime.ping_interval_seconds),
        )?
        .set_default(
            "realtime.idle_timeout_seconds",
            to_i64(defaults.realtime.idle_timeout_seconds),
        )?;

    let environment_overrides = config::Environment::with_prefix("CHATWIRE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CHATWIRE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CHATWIRE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    config.validate().context("configuration failed validation")?;

    debug!(?config, "loaded backend configuration");
    Ok(config)
}

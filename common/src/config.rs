// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use config::{Config as ConfigFile, ConfigError, File, Environment};

/// Central configuration for the token service and the chat client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web_server_addr: String,
    /// Browser origin allowed by CORS
    pub client_url: String,
    pub run_mode: String,
    pub log_level: String,
    /// Shared secret the identity provider presents on webhook calls
    pub webhook_secret: String,

    pub identity: IdentityConfig,
    pub platform: PlatformConfig,
    pub rate_limit: RateLimitConfig,
    pub client: ClientConfig,
    pub reporting: ReportingConfig,
}

/// How bearer tokens from the identity provider are verified
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// HS256 secret shared with the identity provider
    pub jwt_secret: String,
    /// RS256 public key; takes precedence over `jwt_secret` when set
    pub public_key_pem: Option<String>,
    pub issuer: Option<String>,
    pub leeway_secs: u64,
}

/// Realtime chat/video platform credentials
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Credential lifetime; `None` or 0 leaves expiry to the platform
    pub credential_ttl_secs: Option<u64>,
    pub ws_url: String,
    pub request_timeout_ms: u64,
    /// Channels every new user joins
    pub public_channels: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub paths: Vec<String>,
    pub max_requests: usize,
    pub window_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the token service, including the `/api` prefix
    pub api_base_url: String,
    pub request_timeout_ms: u64,
}

/// Error-reporting service; reporting is off without a DSN
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub dsn: Option<String>,
    /// Defaults to the run mode
    pub environment: Option<String>,
    pub sample_rate: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web_server_addr: "127.0.0.1:5001".to_string(),
            client_url: "http://localhost:5173".to_string(),
            run_mode: "development".to_string(),
            log_level: "info".to_string(),
            webhook_secret: "dev_webhook_secret".to_string(),
            identity: IdentityConfig::default(),
            platform: PlatformConfig::default(),
            rate_limit: RateLimitConfig::default(),
            client: ClientConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev_identity_secret".to_string(),
            public_key_pem: None,
            issuer: None,
            leeway_secs: 60,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_key: "dev_api_key".to_string(),
            api_secret: "dev_api_secret".to_string(),
            credential_ttl_secs: Some(3600),
            ws_url: "ws://127.0.0.1:8080/connect".to_string(),
            request_timeout_ms: 5000,
            public_channels: vec!["general".to_string()],
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            paths: vec!["/api/chat/token".to_string()],
            max_requests: 30,
            window_secs: 60,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5001/api".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        Self::load_from(&config_dir, &run_mode)
    }

    /// Load `default.toml`, `{run_mode}.toml` and `local.toml` from
    /// `config_dir`, then `APP__` environment overrides
    pub fn load_from(config_dir: &Path, run_mode: &str) -> Result<Self, ConfigError> {
        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let mut config: Config = ConfigFile::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // APP__PLATFORM__API_SECRET=... overrides platform.api_secret
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        config.run_mode = run_mode.to_string();
        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");
                Self::from_plain_env(|key| env::var(key).ok())
            }
        }
    }

    /// Build a configuration from unprefixed variables such as `PLATFORM_API_SECRET`
    pub fn from_plain_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);
        let number = |key: &str, default: u64| {
            lookup(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
        };

        let credential_ttl_secs = match lookup("PLATFORM_CREDENTIAL_TTL_SECS") {
            Some(v) => v.parse::<u64>().ok(),
            None => defaults.platform.credential_ttl_secs,
        };

        let public_channels = lookup("PLATFORM_PUBLIC_CHANNELS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.platform.public_channels);

        Self {
            web_server_addr: text("WEB_SERVER_ADDR", defaults.web_server_addr),
            client_url: text("CLIENT_URL", defaults.client_url),
            run_mode: text("RUN_MODE", defaults.run_mode),
            log_level: text("LOG_LEVEL", defaults.log_level),
            webhook_secret: text("WEBHOOK_SECRET", defaults.webhook_secret),
            identity: IdentityConfig {
                jwt_secret: text("IDENTITY_JWT_SECRET", defaults.identity.jwt_secret),
                public_key_pem: lookup("IDENTITY_PUBLIC_KEY_PEM"),
                issuer: lookup("IDENTITY_ISSUER"),
                leeway_secs: number("IDENTITY_LEEWAY_SECS", defaults.identity.leeway_secs),
            },
            platform: PlatformConfig {
                api_key: text("PLATFORM_API_KEY", defaults.platform.api_key),
                api_secret: text("PLATFORM_API_SECRET", defaults.platform.api_secret),
                credential_ttl_secs,
                ws_url: text("PLATFORM_WS_URL", defaults.platform.ws_url),
                request_timeout_ms: number("PLATFORM_REQUEST_TIMEOUT_MS", defaults.platform.request_timeout_ms),
                public_channels,
            },
            rate_limit: RateLimitConfig {
                paths: defaults.rate_limit.paths,
                max_requests: number("RATE_LIMIT_MAX_REQUESTS", defaults.rate_limit.max_requests as u64) as usize,
                window_secs: number("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit.window_secs),
            },
            client: ClientConfig {
                api_base_url: text("API_BASE_URL", defaults.client.api_base_url),
                request_timeout_ms: number("CLIENT_REQUEST_TIMEOUT_MS", defaults.client.request_timeout_ms),
            },
            reporting: ReportingConfig {
                dsn: lookup("SENTRY_DSN").filter(|v| !v.trim().is_empty()),
                environment: lookup("SENTRY_ENVIRONMENT"),
                sample_rate: lookup("SENTRY_SAMPLE_RATE")
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(defaults.reporting.sample_rate),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    /// Reject configurations that would run production with development secrets
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.platform.api_key.is_empty() || self.platform.api_secret.is_empty() {
            return Err(ConfigError::Message("platform api key and secret are required".into()));
        }
        if self.identity.jwt_secret.is_empty() && self.identity.public_key_pem.is_none() {
            return Err(ConfigError::Message("identity verification key is required".into()));
        }
        if self.is_production() {
            let defaults = Self::default();
            if self.platform.api_secret == defaults.platform.api_secret
                || self.webhook_secret == defaults.webhook_secret
                || (self.identity.public_key_pem.is_none()
                    && self.identity.jwt_secret == defaults.identity.jwt_secret)
            {
                return Err(ConfigError::Message("development secrets are not allowed in production".into()));
            }
        }
        Ok(())
    }
}

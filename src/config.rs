use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Bounds applied to user input. Configuration, not hard-coded policy.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub anon_max_expiration_secs: u64,
    pub owner_max_expiration_secs: u64,
    /// Chat defaults must satisfy `0 < secs < chat_max_expiration_secs`.
    pub chat_max_expiration_secs: u64,
    pub chat_default_expiration_secs: u64,
    pub max_password_len: usize,
    pub max_display_name_len: usize,
    pub max_collision_attempts: u32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            anon_max_expiration_secs: 86_400,
            owner_max_expiration_secs: 7 * 86_400,
            chat_max_expiration_secs: 86_400,
            chat_default_expiration_secs: 3_600,
            max_password_len: 10,
            max_display_name_len: 15,
            max_collision_attempts: 5,
        }
    }
}

impl AccessPolicy {
    pub fn max_expiration_for(&self, authenticated: bool) -> u64 {
        if authenticated {
            self.owner_max_expiration_secs
        } else {
            self.anon_max_expiration_secs
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub links_table: String,
    pub media_table: String,
    pub chat_defaults_table: String,
    pub owner_index: String,
    pub media_bucket: Option<String>,
    pub media_prefix: String,
    pub domain: String,
    /// When set, JWT callers must carry this `iss`.
    pub auth_issuer: Option<String>,
    pub request_timeout: Duration,
    pub sweep_batch: usize,
    pub policy: AccessPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            links_table: "short_links".into(),
            media_table: "media_resources".into(),
            chat_defaults_table: "chat_user_defaults".into(),
            owner_index: "GSI1-owner".into(),
            media_bucket: None,
            media_prefix: "media".into(),
            domain: "go.privalink.app".into(),
            auth_issuer: None,
            request_timeout: Duration::from_secs(10),
            sweep_batch: 100,
            policy: AccessPolicy::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(s) if !s.is_empty() => s.parse().map_err(|_| ConfigError::Invalid { key, value: s }),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Config::default();
        let p = AccessPolicy::default();
        let policy = AccessPolicy {
            anon_max_expiration_secs: env_parse("ANON_MAX_EXPIRATION_SECS", p.anon_max_expiration_secs)?,
            owner_max_expiration_secs: env_parse("OWNER_MAX_EXPIRATION_SECS", p.owner_max_expiration_secs)?,
            chat_max_expiration_secs: env_parse("CHAT_MAX_EXPIRATION_SECS", p.chat_max_expiration_secs)?,
            chat_default_expiration_secs: env_parse(
                "CHAT_DEFAULT_EXPIRATION_SECS",
                p.chat_default_expiration_secs,
            )?,
            max_password_len: env_parse("MAX_PASSWORD_LEN", p.max_password_len)?,
            max_display_name_len: env_parse("MAX_DISPLAY_NAME_LEN", p.max_display_name_len)?,
            max_collision_attempts: env_parse("MAX_COLLISION_ATTEMPTS", p.max_collision_attempts)?,
        };
        if policy.max_collision_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_COLLISION_ATTEMPTS",
                value: "0".into(),
            });
        }

        Ok(Self {
            links_table: env_or("LINKS_TABLE", &d.links_table),
            media_table: env_or("MEDIA_TABLE", &d.media_table),
            chat_defaults_table: env_or("CHAT_DEFAULTS_TABLE", &d.chat_defaults_table),
            owner_index: env_or("OWNER_INDEX", &d.owner_index),
            media_bucket: std::env::var("MEDIA_BUCKET").ok().filter(|s| !s.is_empty()),
            media_prefix: env_or("MEDIA_PREFIX", &d.media_prefix),
            domain: env_or("PUBLIC_DOMAIN", &d.domain),
            auth_issuer: std::env::var("AUTH_ISSUER").ok().filter(|s| !s.is_empty()),
            request_timeout: Duration::from_millis(env_parse("REQUEST_TIMEOUT_MS", 10_000u64)?),
            sweep_batch: env_parse("SWEEP_BATCH", d.sweep_batch)?,
            policy,
        })
    }

    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.media_bucket
            .as_deref()
            .ok_or(ConfigError::Missing("MEDIA_BUCKET"))
    }

    pub fn short_url(&self, code: &str) -> String {
        crate::util::short_url(&self.domain, code)
    }
}

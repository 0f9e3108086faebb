// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`AppConfig`] struct that is
//! built once at startup and handed to every component through `AppState`.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | HS256 signing secret | Required in release builds; random per process in debug builds |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | Access token lifetime | `1440` |
//! | `REFRESH_TOKEN_EXPIRE_MINUTES` | Refresh token lifetime | `2880` |
//! | `ACCESS_TOKEN_REFRESH_BUFFER_MINUTES` | Near-expiry window for the refresh hint, below the access lifetime | `30` |
//! | `OAUTH_ENABLE` | Resolve identities on open routes | `true` |
//! | `LOGIN_LOG_RECORD` | Persist login attempts | `true` |
//! | `LOGIN_AUDIT_DEFERRED` | Write login records off the response path | `true` |
//! | `IP_PARSE_ENABLE` | Resolve login IPs to locations | `false` |
//! | `IP_PARSE_TOKEN` | ip138 API token | Optional |
//! | `PERMISSION_CACHE_TTL_SECONDS` | Permission cache TTL (`0` disables) | `60` |
//! | `PERMISSION_CACHE_CAPACITY` | Permission cache entries | `1024` |
//! | `SEED_ADMIN_PHONE` | Bootstrap super-admin phone | Optional |
//! | `SEED_ADMIN_PASSWORD` | Bootstrap super-admin password | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable name for the database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const ACCESS_TTL_ENV: &str = "ACCESS_TOKEN_EXPIRE_MINUTES";
pub const REFRESH_TTL_ENV: &str = "REFRESH_TOKEN_EXPIRE_MINUTES";
pub const REFRESH_BUFFER_ENV: &str = "ACCESS_TOKEN_REFRESH_BUFFER_MINUTES";
pub const OAUTH_ENABLE_ENV: &str = "OAUTH_ENABLE";
pub const LOGIN_LOG_RECORD_ENV: &str = "LOGIN_LOG_RECORD";
pub const LOGIN_AUDIT_DEFERRED_ENV: &str = "LOGIN_AUDIT_DEFERRED";
pub const IP_PARSE_ENABLE_ENV: &str = "IP_PARSE_ENABLE";
pub const IP_PARSE_TOKEN_ENV: &str = "IP_PARSE_TOKEN";
pub const PERMISSION_CACHE_TTL_ENV: &str = "PERMISSION_CACHE_TTL_SECONDS";
pub const PERMISSION_CACHE_CAPACITY_ENV: &str = "PERMISSION_CACHE_CAPACITY";
pub const SEED_ADMIN_PHONE_ENV: &str = "SEED_ADMIN_PHONE";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Name of the database file inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "auth.redb";

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 1440;
const DEFAULT_REFRESH_BUFFER_MINUTES: i64 = 30;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Token lifetimes and signing material.
#[derive(Clone)]
pub struct AuthSettings {
    /// Symmetric HS256 secret.
    pub secret: String,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    /// Window before access-token expiry in which clients are told to refresh.
    pub refresh_buffer: chrono::Duration,
    /// When false, open routes always see an anonymous identity.
    pub oauth_enabled: bool,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refresh_buffer", &self.refresh_buffer)
            .field("oauth_enabled", &self.oauth_enabled)
            .finish()
    }
}

impl AuthSettings {
    /// Settings with the default lifetimes and the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: chrono::Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: chrono::Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES * 2),
            refresh_buffer: chrono::Duration::minutes(DEFAULT_REFRESH_BUFFER_MINUTES),
            oauth_enabled: true,
        }
    }
}

/// Login-audit behaviour.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Persist a record for every login attempt.
    pub enabled: bool,
    /// Spawn the write instead of awaiting it before responding.
    pub deferred: bool,
    pub ip_parse_enabled: bool,
    pub ip_parse_token: Option<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            deferred: true,
            ip_parse_enabled: false,
            ip_parse_token: None,
        }
    }
}

/// Optional permission cache in front of the resolver.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Zero disables the cache.
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            capacity: 1024,
        }
    }
}

/// Application configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub auth: AuthSettings,
    pub audit: AuditSettings,
    pub cache: CacheSettings,
    /// `(phone, password)` of the super-admin to create on first start.
    pub seed_admin: Option<(String, String)>,
}

impl AppConfig {
    /// Configuration suitable for tests and local tooling.
    pub fn for_secret(secret: impl Into<String>) -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            auth: AuthSettings::with_secret(secret),
            audit: AuditSettings::default(),
            cache: CacheSettings::default(),
            seed_admin: None,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// A missing `JWT_SECRET` is only tolerated in debug builds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup_with(lookup, cfg!(debug_assertions))
    }

    /// [`from_lookup`](Self::from_lookup) with an explicit choice of whether a
    /// missing secret may be replaced by an ephemeral one.
    pub fn from_lookup_with<F>(lookup: F, allow_dev_secret: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup(JWT_SECRET_ENV).filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None if allow_dev_secret => {
                tracing::warn!(
                    "{JWT_SECRET_ENV} not set, generating an ephemeral secret; tokens will not survive a restart"
                );
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
            None => return Err(ConfigError::Missing { var: JWT_SECRET_ENV }),
        };

        let access_minutes = parse_or(&lookup, ACCESS_TTL_ENV, DEFAULT_ACCESS_TTL_MINUTES)?;
        let refresh_minutes = parse_or(&lookup, REFRESH_TTL_ENV, access_minutes.saturating_mul(2))?;
        let buffer_minutes = parse_or(&lookup, REFRESH_BUFFER_ENV, DEFAULT_REFRESH_BUFFER_MINUTES)?;
        require_positive(ACCESS_TTL_ENV, access_minutes)?;
        require_positive(REFRESH_TTL_ENV, refresh_minutes)?;
        let access_ttl = minutes(ACCESS_TTL_ENV, access_minutes)?;
        let refresh_ttl = minutes(REFRESH_TTL_ENV, refresh_minutes)?;
        let refresh_buffer = minutes(REFRESH_BUFFER_ENV, buffer_minutes)?;
        if buffer_minutes < 0 || buffer_minutes >= access_minutes {
            return Err(ConfigError::InvalidValue {
                var: REFRESH_BUFFER_ENV,
                value: buffer_minutes.to_string(),
                reason: format!("must be at least 0 and below {ACCESS_TTL_ENV} ({access_minutes})"),
            });
        }

        let seed_admin = match (lookup(SEED_ADMIN_PHONE_ENV), lookup(SEED_ADMIN_PASSWORD_ENV)) {
            (Some(phone), Some(password)) => Some((phone, password)),
            _ => None,
        };

        Ok(Self {
            data_dir: PathBuf::from(lookup(DATA_DIR_ENV).unwrap_or_else(|| "./data".to_string())),
            host: lookup(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, PORT_ENV, 8080u16)?,
            auth: AuthSettings {
                secret,
                access_ttl,
                refresh_ttl,
                refresh_buffer,
                oauth_enabled: parse_bool_or(&lookup, OAUTH_ENABLE_ENV, true)?,
            },
            audit: AuditSettings {
                enabled: parse_bool_or(&lookup, LOGIN_LOG_RECORD_ENV, true)?,
                deferred: parse_bool_or(&lookup, LOGIN_AUDIT_DEFERRED_ENV, true)?,
                ip_parse_enabled: parse_bool_or(&lookup, IP_PARSE_ENABLE_ENV, false)?,
                ip_parse_token: lookup(IP_PARSE_TOKEN_ENV).filter(|s| !s.is_empty()),
            },
            cache: CacheSettings {
                ttl: Duration::from_secs(parse_or(&lookup, PERMISSION_CACHE_TTL_ENV, 60u64)?),
                capacity: parse_or(&lookup, PERMISSION_CACHE_CAPACITY_ENV, 1024usize)?,
            },
            seed_admin,
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}

fn parse_bool_or<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                value,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}

fn require_positive(var: &'static str, minutes: i64) -> Result<(), ConfigError> {
    if minutes > 0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            var,
            value: minutes.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}

fn minutes(var: &'static str, minutes: i64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::try_minutes(minutes).ok_or_else(|| ConfigError::InvalidValue {
        var,
        value: minutes.to_string(),
        reason: "out of range".to_string(),
    })
}

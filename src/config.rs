use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::tryon::keys::ApiKeyPolicy;
use crate::tryon::normalize::{NormalizeOptions, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};
use crate::tryon::poller::{PollSchedule, DEFAULT_POLL_BUDGET, DEFAULT_POLL_INTERVAL};
use crate::tryon::provider::ProviderEndpoints;
use crate::tryon::service::ServiceSettings;

pub const DEFAULT_ENDPOINT_URL: &str = "https://api.fashn.ai/v1";
pub const DEFAULT_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(".env could not be loaded: {0}")]
    DotEnv(String),
    #[error("{key} has invalid value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind: SocketAddr,
    pub endpoint_url: Url,
    pub key_policy: ApiKeyPolicy,
    pub schedule: PollSchedule,
    pub normalize: NormalizeOptions,
    pub http_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl BridgeConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        check_dotenv(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind = parse_or("TRYON_BIND", get("TRYON_BIND"), || {
            DEFAULT_BIND.parse().map_err(|_| String::new())
        })?;
        let endpoint_url = parse_endpoint(get("FASHN_ENDPOINT_URL"))?;

        let key_policy = ApiKeyPolicy {
            server_key: get("FASHN_API_KEY"),
            allow_caller_key: parse_bool("TRYON_ALLOW_CALLER_KEY", get("TRYON_ALLOW_CALLER_KEY"), true)?,
            fallback_key: get("TRYON_FALLBACK_API_KEY"),
        };

        let budget_secs: u64 = parse_or("TRYON_POLL_BUDGET_SECS", get("TRYON_POLL_BUDGET_SECS"), || {
            Ok(DEFAULT_POLL_BUDGET.as_secs())
        })?;
        let interval_ms: u64 = parse_or("TRYON_POLL_INTERVAL_MS", get("TRYON_POLL_INTERVAL_MS"), || {
            Ok(DEFAULT_POLL_INTERVAL.as_millis() as u64)
        })?;
        ensure_positive("TRYON_POLL_BUDGET_SECS", budget_secs)?;
        ensure_positive("TRYON_POLL_INTERVAL_MS", interval_ms)?;

        let max_dimension: u32 = parse_or(
            "TRYON_MAX_IMAGE_DIMENSION",
            get("TRYON_MAX_IMAGE_DIMENSION"),
            || Ok(DEFAULT_MAX_DIMENSION),
        )?;
        ensure_positive("TRYON_MAX_IMAGE_DIMENSION", u64::from(max_dimension))?;
        let jpeg_quality: u8 = parse_or("TRYON_JPEG_QUALITY", get("TRYON_JPEG_QUALITY"), || {
            Ok(DEFAULT_JPEG_QUALITY)
        })?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "TRYON_JPEG_QUALITY",
                value: jpeg_quality.to_string(),
                reason: String::from("expected 1..=100"),
            });
        }

        let http_timeout_secs: u64 = parse_or(
            "TRYON_HTTP_TIMEOUT_SECS",
            get("TRYON_HTTP_TIMEOUT_SECS"),
            || Ok(DEFAULT_HTTP_TIMEOUT.as_secs()),
        )?;
        ensure_positive("TRYON_HTTP_TIMEOUT_SECS", http_timeout_secs)?;
        let body_limit_bytes: usize = parse_or(
            "TRYON_BODY_LIMIT_BYTES",
            get("TRYON_BODY_LIMIT_BYTES"),
            || Ok(DEFAULT_BODY_LIMIT_BYTES),
        )?;
        ensure_positive("TRYON_BODY_LIMIT_BYTES", body_limit_bytes as u64)?;

        Ok(Self {
            bind,
            endpoint_url,
            key_policy,
            schedule: PollSchedule {
                budget: Duration::from_secs(budget_secs),
                interval: Duration::from_millis(interval_ms),
            },
            normalize: NormalizeOptions {
                max_dimension,
                jpeg_quality,
            },
            http_timeout: Duration::from_secs(http_timeout_secs),
            body_limit_bytes,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            endpoints: ProviderEndpoints::new(self.endpoint_url.clone()),
            key_policy: self.key_policy.clone(),
            schedule: self.schedule,
            normalize: self.normalize,
        }
    }

    /// Printable view with every key replaced by a presence flag.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            bind: self.bind.to_string(),
            endpoint_url: self.endpoint_url.to_string(),
            server_key_configured: self.key_policy.server_key.is_some(),
            allow_caller_key: self.key_policy.allow_caller_key,
            fallback_key_configured: self.key_policy.fallback_key.is_some(),
            poll_budget_secs: self.schedule.budget.as_secs(),
            poll_interval_ms: self.schedule.interval.as_millis() as u64,
            max_image_dimension: self.normalize.max_dimension,
            jpeg_quality: self.normalize.jpeg_quality,
            http_timeout_secs: self.http_timeout.as_secs(),
            body_limit_bytes: self.body_limit_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub bind: String,
    pub endpoint_url: String,
    pub server_key_configured: bool,
    pub allow_caller_key: bool,
    pub fallback_key_configured: bool,
    pub poll_budget_secs: u64,
    pub poll_interval_ms: u64,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub http_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

/// A missing `.env` is fine; an unreadable or malformed one is not.
fn check_dotenv(result: Result<(), dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(()) => Ok(()),
        Err(error) if error.not_found() => Ok(()),
        Err(error) => Err(ConfigError::DotEnv(error.to_string())),
    }
}

fn parse_endpoint(raw: Option<String>) -> Result<Url, ConfigError> {
    let raw = raw.unwrap_or_else(|| String::from(DEFAULT_ENDPOINT_URL));
    let url = Url::parse(raw.as_str()).map_err(|e| ConfigError::InvalidValue {
        key: "FASHN_ENDPOINT_URL",
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "FASHN_ENDPOINT_URL",
            value: raw,
            reason: String::from("expected an http or https URL"),
        });
    }
    Ok(url)
}

fn parse_or<T>(
    key: &'static str,
    raw: Option<String>,
    default: impl FnOnce() -> Result<T, String>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
        None => default().map_err(|reason| ConfigError::InvalidValue {
            key,
            value: String::new(),
            reason,
        }),
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: String::from("expected a boolean"),
        }),
    }
}

fn ensure_positive(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: String::from("0"),
            reason: String::from("must be greater than zero"),
        });
    }
    Ok(())
}

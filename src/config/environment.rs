// ABOUTME: Environment-based configuration loading with fail-fast validation
// ABOUTME: Defines CoreConfig and its sub-settings for vault, marketplace, pacing, and retries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! Environment configuration.
//!
//! [`CoreConfig::from_env`] reads every `QUAYSIDE_*` variable, applies
//! defaults from [`crate::constants`], and validates fail-fast: a missing or
//! wrong-length encryption key, a half-configured global credential pair, or
//! an unparsable URL is a startup error, never a silent degrade.

use std::env;
use std::time::Duration;

use url::Url;

use crate::constants::{aggregation, env_vars, rate_limits, retries, tokens};
use crate::crypto::KEY_LEN;
use crate::errors::{AppError, AppResult};

/// Operator-wide fallback application credentials.
#[derive(Debug, Clone)]
pub struct GlobalAppCredentials {
    /// Marketplace-issued client identifier.
    pub app_id: String,
    /// Plaintext application secret (configuration-sourced, never persisted).
    pub app_secret: String,
}

/// Marketplace endpoint configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// OAuth token endpoint.
    pub token_url: String,
    /// Catalog API base URL.
    pub catalog_base_url: String,
    /// Offer API base URL.
    pub offer_base_url: String,
    /// Legacy XML selling API endpoint.
    pub legacy_api_url: String,
}

/// Access-token lifecycle settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Freshness buffer before expiry; clamped to at least 60 seconds.
    pub expiry_buffer: chrono::Duration,
}

/// Request pacing settings.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Minimum spacing between calls sharing a `(tenant, resource)` key.
    pub resource_spacing: Duration,
    /// Minimum spacing when switching to a different tenant's work.
    pub tenant_switch_spacing: Duration,
}

/// Retry policy settings for transient failures.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum total attempts (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap applied to any single delay.
    pub max_delay: Duration,
}

/// Aggregation and cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Catalog page size.
    pub catalog_page_size: u32,
    /// Bound on concurrently awaited offer fetches.
    pub offer_concurrency: usize,
    /// TTL of the aggregation result cache.
    pub listings_cache_ttl: Duration,
}

/// Complete core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// SQLite URL for credential storage.
    pub database_url: String,
    /// 32-byte vault key.
    pub encryption_key: Vec<u8>,
    /// Operator-wide fallback credentials, if configured.
    pub global_app: Option<GlobalAppCredentials>,
    /// Marketplace endpoints.
    pub marketplace: MarketplaceConfig,
    /// Token lifecycle settings.
    pub token: TokenSettings,
    /// Request pacing settings.
    pub rate_limit: RateLimitSettings,
    /// Retry policy settings.
    pub retry: RetrySettings,
    /// Aggregation and cache settings.
    pub cache: CacheSettings,
}

impl CoreConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a required variable is missing, the
    /// encryption key is not 64 hex chars, only half of the global
    /// credential pair is set, or an endpoint URL does not parse.
    pub fn from_env() -> AppResult<Self> {
        let database_url = env::var(env_vars::DATABASE_URL)
            .unwrap_or_else(|_| "sqlite:quayside.db".to_owned());

        let encryption_key = load_encryption_key()?;
        let global_app = load_global_app()?;
        let marketplace = load_marketplace()?;

        let buffer_secs = parse_env_i64(env_vars::TOKEN_BUFFER_SECS, tokens::DEFAULT_EXPIRY_BUFFER_SECS)?
            .max(tokens::MIN_EXPIRY_BUFFER_SECS);

        let config = Self {
            database_url,
            encryption_key,
            global_app,
            marketplace,
            token: TokenSettings {
                expiry_buffer: chrono::Duration::seconds(buffer_secs),
            },
            rate_limit: RateLimitSettings {
                resource_spacing: Duration::from_millis(parse_env_u64(
                    env_vars::RESOURCE_SPACING_MS,
                    rate_limits::DEFAULT_RESOURCE_SPACING_MS,
                )?),
                tenant_switch_spacing: Duration::from_millis(parse_env_u64(
                    env_vars::TENANT_SWITCH_SPACING_MS,
                    rate_limits::DEFAULT_TENANT_SWITCH_SPACING_MS,
                )?),
            },
            retry: RetrySettings {
                max_attempts: u32::try_from(parse_env_u64(
                    env_vars::RETRY_MAX_ATTEMPTS,
                    u64::from(retries::DEFAULT_MAX_ATTEMPTS),
                )?)
                .map_err(|_| AppError::config("Retry attempt count out of range"))?,
                base_delay: Duration::from_millis(parse_env_u64(
                    env_vars::RETRY_BASE_DELAY_MS,
                    retries::DEFAULT_BASE_DELAY_MS,
                )?),
                max_delay: Duration::from_millis(parse_env_u64(
                    env_vars::RETRY_MAX_DELAY_MS,
                    retries::DEFAULT_MAX_DELAY_MS,
                )?),
            },
            cache: CacheSettings {
                catalog_page_size: u32::try_from(parse_env_u64(
                    env_vars::CATALOG_PAGE_SIZE,
                    u64::from(aggregation::DEFAULT_CATALOG_PAGE_SIZE),
                )?)
                .map_err(|_| AppError::config("Catalog page size out of range"))?,
                offer_concurrency: usize::try_from(parse_env_u64(
                    env_vars::OFFER_CONCURRENCY,
                    aggregation::DEFAULT_OFFER_CONCURRENCY as u64,
                )?)
                .map_err(|_| AppError::config("Offer concurrency out of range"))?,
                listings_cache_ttl: Duration::from_secs(parse_env_u64(
                    env_vars::LISTINGS_CACHE_TTL_SECS,
                    aggregation::DEFAULT_LISTINGS_CACHE_TTL_SECS,
                )?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` on any violated invariant.
    pub fn validate(&self) -> AppResult<()> {
        if self.encryption_key.len() != KEY_LEN {
            return Err(AppError::config(format!(
                "Encryption key must be {KEY_LEN} bytes, got {}",
                self.encryption_key.len()
            )));
        }
        if self.token.expiry_buffer < chrono::Duration::seconds(tokens::MIN_EXPIRY_BUFFER_SECS) {
            return Err(AppError::config(
                "Token expiry buffer must be at least 60 seconds",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::config("Retry attempt count must be at least 1"));
        }
        if self.cache.catalog_page_size == 0 {
            return Err(AppError::config("Catalog page size must be at least 1"));
        }
        if self.cache.offer_concurrency == 0 {
            return Err(AppError::config("Offer concurrency must be at least 1"));
        }
        for (name, value) in [
            ("token URL", &self.marketplace.token_url),
            ("catalog base URL", &self.marketplace.catalog_base_url),
            ("offer base URL", &self.marketplace.offer_base_url),
            ("legacy API URL", &self.marketplace.legacy_api_url),
        ] {
            Url::parse(value)
                .map_err(|e| AppError::config(format!("Invalid marketplace {name}: {e}")))?;
        }
        Ok(())
    }
}

fn load_encryption_key() -> AppResult<Vec<u8>> {
    let raw = env::var(env_vars::ENCRYPTION_KEY).map_err(|_| {
        AppError::config(format!(
            "{} is required (64 hex chars)",
            env_vars::ENCRYPTION_KEY
        ))
    })?;
    let key = hex::decode(raw.trim())
        .map_err(|e| AppError::config(format!("{} is not valid hex: {e}", env_vars::ENCRYPTION_KEY)))?;
    if key.len() != KEY_LEN {
        return Err(AppError::config(format!(
            "{} must decode to {KEY_LEN} bytes, got {}",
            env_vars::ENCRYPTION_KEY,
            key.len()
        )));
    }
    Ok(key)
}

fn load_global_app() -> AppResult<Option<GlobalAppCredentials>> {
    let app_id = env::var(env_vars::APP_ID).ok().filter(|v| !v.is_empty());
    let app_secret = env::var(env_vars::APP_SECRET).ok().filter(|v| !v.is_empty());
    match (app_id, app_secret) {
        (Some(app_id), Some(app_secret)) => Ok(Some(GlobalAppCredentials { app_id, app_secret })),
        (None, None) => Ok(None),
        _ => Err(AppError::config(format!(
            "{} and {} must be set together",
            env_vars::APP_ID,
            env_vars::APP_SECRET
        ))),
    }
}

fn load_marketplace() -> AppResult<MarketplaceConfig> {
    Ok(MarketplaceConfig {
        token_url: require_env(env_vars::TOKEN_URL)?,
        catalog_base_url: require_env(env_vars::CATALOG_URL)?,
        offer_base_url: require_env(env_vars::OFFER_URL)?,
        legacy_api_url: require_env(env_vars::LEGACY_API_URL)?,
    })
}

fn require_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::config(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| AppError::config(format!("{name} is not a valid integer: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> AppResult<i64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|e| AppError::config(format!("{name} is not a valid integer: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn test_config() -> CoreConfig {
        CoreConfig {
            database_url: "sqlite::memory:".into(),
            encryption_key: vec![1u8; KEY_LEN],
            global_app: None,
            marketplace: MarketplaceConfig {
                token_url: "https://auth.example.com/oauth2/token".into(),
                catalog_base_url: "https://api.example.com/catalog".into(),
                offer_base_url: "https://api.example.com/sell".into(),
                legacy_api_url: "https://legacy.example.com/ws/api".into(),
            },
            token: TokenSettings {
                expiry_buffer: chrono::Duration::seconds(60),
            },
            rate_limit: RateLimitSettings {
                resource_spacing: Duration::from_millis(300),
                tenant_switch_spacing: Duration::from_millis(1500),
            },
            retry: RetrySettings {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(10),
            },
            cache: CacheSettings {
                catalog_page_size: 100,
                offer_concurrency: 4,
                listings_cache_ttl: Duration::from_secs(300),
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        test_config().validate().unwrap();
    }

    #[test]
    fn short_key_fails_validation() {
        let mut config = test_config();
        config.encryption_key = vec![1u8; 16];
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_buffer_fails_validation() {
        let mut config = test_config();
        config.token.expiry_buffer = chrono::Duration::seconds(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_url_fails_validation() {
        let mut config = test_config();
        config.marketplace.token_url = "not a url".into();
        assert!(config.validate().is_err());
    }
}

// ABOUTME: Application constants and default configuration values
// ABOUTME: Centralizes timing defaults, limits, and environment variable names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! Application-wide constants.
//!
//! Every tunable has an environment override (see [`crate::config`]); the
//! values here are the defaults applied when the variable is unset.

/// Token lifecycle defaults
pub mod tokens {
    /// Minimum freshness buffer before access-token expiry, in seconds.
    ///
    /// A cached token is only handed out while `now + buffer < expires_at`,
    /// so a token can never expire mid-call. The buffer is clamped to at
    /// least this value even when configured lower.
    pub const MIN_EXPIRY_BUFFER_SECS: i64 = 60;

    /// Default freshness buffer, in seconds.
    pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;
}

/// Rate limiting defaults
pub mod rate_limits {
    /// Minimum spacing between calls sharing a `(tenant, resource)` key.
    pub const DEFAULT_RESOURCE_SPACING_MS: u64 = 300;

    /// Minimum spacing when the limiter switches to a different tenant's
    /// batch of work.
    pub const DEFAULT_TENANT_SWITCH_SPACING_MS: u64 = 1_500;
}

/// Retry policy defaults for transient marketplace failures
pub mod retries {
    /// Maximum total attempts (first try included).
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff, in milliseconds.
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

    /// Cap applied to any single backoff delay, in milliseconds.
    pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
}

/// Aggregation defaults
pub mod aggregation {
    /// Page size requested from the catalog API.
    pub const DEFAULT_CATALOG_PAGE_SIZE: u32 = 100;

    /// Upper bound on concurrently awaited offer fetches per aggregation.
    /// Actual throughput is governed by the rate limiter, not this bound.
    pub const DEFAULT_OFFER_CONCURRENCY: usize = 4;

    /// TTL for the short-lived aggregation result cache, in seconds.
    pub const DEFAULT_LISTINGS_CACHE_TTL_SECS: u64 = 300;
}

/// Rate-limiter resource keys used by the aggregation pipeline
pub mod resources {
    /// Catalog page fetches.
    pub const CATALOG: &str = "catalog";

    /// Per-SKU offer fetches.
    pub const OFFER: &str = "offer";

    /// Legacy bulk statistics calls.
    pub const STATISTICS: &str = "statistics";

    /// Token endpoint exchanges.
    pub const TOKEN: &str = "token";
}

/// Environment variable names read by [`crate::config::environment`]
pub mod env_vars {
    /// SQLite database URL for credential storage.
    pub const DATABASE_URL: &str = "QUAYSIDE_DATABASE_URL";

    /// 64-hex-char (32-byte) vault encryption key.
    pub const ENCRYPTION_KEY: &str = "QUAYSIDE_ENCRYPTION_KEY";

    /// Operator-wide fallback application id.
    pub const APP_ID: &str = "QUAYSIDE_APP_ID";

    /// Operator-wide fallback application secret.
    pub const APP_SECRET: &str = "QUAYSIDE_APP_SECRET";

    /// OAuth token endpoint URL.
    pub const TOKEN_URL: &str = "QUAYSIDE_TOKEN_URL";

    /// Catalog API base URL.
    pub const CATALOG_URL: &str = "QUAYSIDE_CATALOG_URL";

    /// Offer API base URL.
    pub const OFFER_URL: &str = "QUAYSIDE_OFFER_URL";

    /// Legacy XML selling API endpoint URL.
    pub const LEGACY_API_URL: &str = "QUAYSIDE_LEGACY_API_URL";

    /// Access-token expiry buffer override, in seconds.
    pub const TOKEN_BUFFER_SECS: &str = "QUAYSIDE_TOKEN_BUFFER_SECS";

    /// Per-resource spacing override, in milliseconds.
    pub const RESOURCE_SPACING_MS: &str = "QUAYSIDE_RESOURCE_SPACING_MS";

    /// Tenant-switch spacing override, in milliseconds.
    pub const TENANT_SWITCH_SPACING_MS: &str = "QUAYSIDE_TENANT_SWITCH_SPACING_MS";

    /// Retry attempt count override.
    pub const RETRY_MAX_ATTEMPTS: &str = "QUAYSIDE_RETRY_MAX_ATTEMPTS";

    /// Retry base delay override, in milliseconds.
    pub const RETRY_BASE_DELAY_MS: &str = "QUAYSIDE_RETRY_BASE_DELAY_MS";

    /// Retry delay cap override, in milliseconds.
    pub const RETRY_MAX_DELAY_MS: &str = "QUAYSIDE_RETRY_MAX_DELAY_MS";

    /// Catalog page size override.
    pub const CATALOG_PAGE_SIZE: &str = "QUAYSIDE_CATALOG_PAGE_SIZE";

    /// Offer fan-out bound override.
    pub const OFFER_CONCURRENCY: &str = "QUAYSIDE_OFFER_CONCURRENCY";

    /// Listings cache TTL override, in seconds.
    pub const LISTINGS_CACHE_TTL_SECS: &str = "QUAYSIDE_LISTINGS_CACHE_TTL_SECS";
}

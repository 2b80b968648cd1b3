// ABOUTME: Marketplace API clients behind a single trait for the three upstream surfaces
// ABOUTME: Handles bearer auth, one-shot 401 recovery, and response classification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Marketplace API Clients
//!
//! One trait, three surfaces: the modern catalog API, the modern offer API,
//! and the legacy XML statistics API all sit behind [`MarketplaceApi`],
//! implemented over HTTP by [`RestMarketplaceClient`]. Aggregation and
//! tests depend on the trait only.
//!
//! Every call authenticates with a bearer token from the
//! [`TokenService`](crate::token_service::TokenService). A 401 on a
//! downstream call (the marketplace can revoke a token early despite a
//! seemingly valid cache entry) invalidates the cached token and retries
//! the call once with a fresh one before surfacing
//! `MarketplaceAuthFailed`.

/// Catalog API: paginated item listing
pub mod catalog;
/// Offer API: per-SKU commercial data
pub mod offers;
/// Legacy XML selling API: bulk engagement statistics
pub mod stats;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::MarketplaceConfig;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::TenantId;
use crate::token_service::TokenService;

pub use catalog::{CatalogItem, CatalogPage};
pub use offers::{OfferData, OfferPrice};
pub use stats::EngagementStats;

/// Live API handle for one tenant, internally backed by the token service.
///
/// Opaque to external collaborators: the only operations are fetching a
/// bearer token and invalidating it after a marketplace-side revocation.
#[derive(Clone)]
pub struct ApiHandle {
    tenant_id: TenantId,
    tokens: Arc<TokenService>,
}

impl ApiHandle {
    /// Create a handle for one tenant.
    #[must_use]
    pub fn new(tenant_id: TenantId, tokens: Arc<TokenService>) -> Self {
        Self { tenant_id, tokens }
    }

    /// The tenant this handle authenticates as.
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// A valid bearer token, refreshed if needed.
    ///
    /// # Errors
    ///
    /// Propagates token acquisition failures.
    pub async fn bearer_token(&self) -> AppResult<String> {
        self.tokens.get_access_token(self.tenant_id).await
    }

    /// Drop the cached token after a downstream 401.
    pub fn invalidate(&self) {
        self.tokens.invalidate(self.tenant_id);
    }
}

/// Unified interface over the three marketplace API surfaces.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Fetch one page of catalog items.
    ///
    /// # Errors
    ///
    /// Any failure aborts the whole aggregation (no partial catalog).
    async fn fetch_catalog_page(
        &self,
        tenant_id: TenantId,
        offset: u32,
        limit: u32,
    ) -> AppResult<CatalogPage>;

    /// Fetch the commercial offer for one SKU. `Ok(None)` when the SKU has
    /// no offer.
    ///
    /// # Errors
    ///
    /// Individual failures are recorded as partial failures by the caller.
    async fn fetch_offer(&self, tenant_id: TenantId, sku: &str) -> AppResult<Option<OfferData>>;

    /// Fetch engagement counters for all listings in one batched legacy
    /// call, keyed by marketplace listing id.
    ///
    /// # Errors
    ///
    /// Failures degrade gracefully: the caller zeroes engagement fields and
    /// records a warning.
    async fn fetch_bulk_statistics(
        &self,
        tenant_id: TenantId,
        listing_ids: &[String],
    ) -> AppResult<HashMap<String, EngagementStats>>;
}

/// Classify a non-success downstream HTTP status into the error taxonomy.
pub(crate) fn classify_status(status: reqwest::StatusCode, surface: &str) -> AppError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return AppError::auth_failed(format!("{surface} rejected the access token (HTTP 401)"));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AppError::rate_limited(format!("{surface} throttled the request (HTTP 429)"));
    }
    if status.is_server_error() {
        return AppError::unavailable(format!("{surface} returned HTTP {status}"));
    }
    AppError::invalid_input(format!("{surface} rejected the request (HTTP {status})"))
}

/// Extract a retry-after hint from a 429 response, if present.
pub(crate) fn retry_after_hint(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// HTTP client for all three marketplace surfaces.
pub struct RestMarketplaceClient {
    http: reqwest::Client,
    config: MarketplaceConfig,
    tokens: Arc<TokenService>,
}

impl RestMarketplaceClient {
    /// Create a client over the configured endpoints.
    #[must_use]
    pub fn new(http: reqwest::Client, config: MarketplaceConfig, tokens: Arc<TokenService>) -> Self {
        Self {
            http,
            config,
            tokens,
        }
    }

    /// Run an authorized call, retrying once with a fresh token if the
    /// marketplace reports the cached token invalid.
    async fn with_token<T, F, Fut>(&self, tenant_id: TenantId, call: F) -> AppResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let token = self.tokens.get_access_token(tenant_id).await?;
        match call(token).await {
            Err(err) if err.code() == ErrorCode::MarketplaceAuthFailed => {
                debug!(
                    tenant_id = %tenant_id,
                    "Downstream 401 despite cached token, refreshing once"
                );
                self.tokens.invalidate(tenant_id);
                let token = self.tokens.get_access_token(tenant_id).await?;
                call(token).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl MarketplaceApi for RestMarketplaceClient {
    async fn fetch_catalog_page(
        &self,
        tenant_id: TenantId,
        offset: u32,
        limit: u32,
    ) -> AppResult<CatalogPage> {
        self.with_token(tenant_id, |token| {
            catalog::fetch_page(
                &self.http,
                &self.config.catalog_base_url,
                token,
                offset,
                limit,
            )
        })
        .await
    }

    async fn fetch_offer(&self, tenant_id: TenantId, sku: &str) -> AppResult<Option<OfferData>> {
        self.with_token(tenant_id, |token| {
            offers::fetch_by_sku(&self.http, &self.config.offer_base_url, token, sku)
        })
        .await
    }

    async fn fetch_bulk_statistics(
        &self,
        tenant_id: TenantId,
        listing_ids: &[String],
    ) -> AppResult<HashMap<String, EngagementStats>> {
        self.with_token(tenant_id, |token| {
            stats::fetch_bulk(&self.http, &self.config.legacy_api_url, token, listing_ids)
        })
        .await
    }
}

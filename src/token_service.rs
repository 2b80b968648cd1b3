// ABOUTME: Access-token lifecycle: refresh exchange, in-memory caching, single-flight refresh
// ABOUTME: Classifies marketplace responses into the fatal/transient error taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Token Service
//!
//! Exchanges a tenant's long-lived refresh token for a short-lived access
//! token at the marketplace token endpoint, caches the result in memory,
//! and keeps it silently fresh.
//!
//! Per tenant, a token moves through `NoToken → Fetching → Valid →
//! Expiring → Fetching → Valid → …`; an outright rejection of the refresh
//! token (HTTP 400/401) is terminal until the tenant reconnects.
//!
//! Concurrency contract: refresh for a given tenant is strictly
//! single-flight. Concurrent callers with no cached token attach to the one
//! in-flight exchange and receive its result, success or failure, rather
//! than issuing their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::credentials::CredentialResolver;
use crate::errors::{AppError, AppResult};
use crate::models::{CachedToken, TenantId};
use crate::rate_limiting::RequestCoalescer;
use crate::retry::RetryPolicy;

/// A successful token grant from the marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    /// Opaque bearer string.
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: String,
}

/// Exchanges a refresh token for an access token.
///
/// The HTTP implementation is [`HttpTokenExchanger`]; tests substitute a
/// scripted fake.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Perform one refresh-token exchange.
    ///
    /// # Errors
    ///
    /// - `MarketplaceAuthFailed` on HTTP 400/401 (never retried)
    /// - `RateLimited` on HTTP 429, carrying any retry-after hint
    /// - `MarketplaceUnavailable` on HTTP 5xx or network failure
    async fn exchange(
        &self,
        app_id: &str,
        app_secret: &str,
        refresh_token: &str,
    ) -> AppResult<TokenGrant>;
}

/// HTTP implementation against the marketplace OAuth token endpoint.
pub struct HttpTokenExchanger {
    client: reqwest::Client,
    token_url: String,
}

impl HttpTokenExchanger {
    /// Create an exchanger for the given token endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(
        &self,
        app_id: &str,
        app_secret: &str,
        refresh_token: &str,
    ) -> AppResult<TokenGrant> {
        let basic = BASE64.encode(format!("{app_id}:{app_secret}"));
        let response = self
            .client
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::unavailable(format!("Token endpoint unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenGrant>()
                .await
                .map_err(|e| AppError::unavailable(format!("Malformed token response: {e}")));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let mut err = AppError::rate_limited("Token endpoint throttled the exchange");
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            return Err(err);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::auth_failed(format!(
                "Marketplace rejected the refresh token (HTTP {status}): {body}"
            )));
        }

        Err(AppError::unavailable(format!(
            "Token endpoint returned HTTP {status}"
        )))
    }
}

/// Caches access tokens per tenant and refreshes them single-flight.
pub struct TokenService {
    resolver: Arc<CredentialResolver>,
    exchanger: Arc<dyn TokenExchanger>,
    retry: RetryPolicy,
    expiry_buffer: chrono::Duration,
    cache: Arc<DashMap<TenantId, CachedToken>>,
    inflight: RequestCoalescer<TenantId, CachedToken>,
}

impl TokenService {
    /// Create a token service.
    ///
    /// The cache is an explicit, injected object with process lifetime; the
    /// service holds no ambient global state, so tests can construct
    /// isolated instances.
    #[must_use]
    pub fn new(
        resolver: Arc<CredentialResolver>,
        exchanger: Arc<dyn TokenExchanger>,
        retry: RetryPolicy,
        expiry_buffer: chrono::Duration,
    ) -> Self {
        Self {
            resolver,
            exchanger,
            retry,
            expiry_buffer,
            cache: Arc::new(DashMap::new()),
            inflight: RequestCoalescer::new(),
        }
    }

    /// Get a valid access token for a tenant, refreshing if needed.
    ///
    /// A cached token is returned without a network call while
    /// `now + buffer < expires_at`. Auth rejections are not retried and not
    /// negatively cached: every call after a `MarketplaceAuthFailed` re-hits
    /// the token endpoint once, until the tenant reconnects.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors (`CredentialsNotConfigured`,
    /// `NotConnected`, `MigrationRequired`, `MalformedCiphertext`) and
    /// exchange errors (`MarketplaceAuthFailed`, `MarketplaceUnavailable`
    /// after retry exhaustion).
    pub async fn get_access_token(&self, tenant_id: TenantId) -> AppResult<String> {
        if let Some(cached) = self.cache.get(&tenant_id) {
            if cached.is_fresh(self.expiry_buffer) {
                debug!(tenant_id = %tenant_id, "Returning cached access token");
                return Ok(cached.token.clone());
            }
        }

        let resolver = Arc::clone(&self.resolver);
        let exchanger = Arc::clone(&self.exchanger);
        let retry = self.retry.clone();
        let cache = Arc::clone(&self.cache);
        let buffer = self.expiry_buffer;

        let token = self
            .inflight
            .run(tenant_id, move || async move {
                // Re-check under single-flight: a refresh that completed
                // while this caller was queueing is still fresh.
                if let Some(cached) = cache.get(&tenant_id) {
                    if cached.is_fresh(buffer) {
                        return Ok(cached.clone());
                    }
                }

                info!(tenant_id = %tenant_id, "Refreshing marketplace access token");
                let creds = resolver.resolve(tenant_id).await?;
                let grant = retry
                    .run("token_exchange", || {
                        exchanger.exchange(&creds.app_id, &creds.app_secret, &creds.refresh_token)
                    })
                    .await
                    .map_err(|err| {
                        warn!(tenant_id = %tenant_id, error = %err, "Token refresh failed");
                        err
                    })?;

                let token = CachedToken {
                    token: grant.access_token,
                    expires_at: Utc::now() + chrono::Duration::seconds(grant.expires_in.max(0)),
                };
                cache.insert(tenant_id, token.clone());
                Ok(token)
            })
            .await?;

        Ok(token.token)
    }

    /// Drop a tenant's cached token.
    ///
    /// Used after a downstream call fails with 401 despite a seemingly valid
    /// cached token, which covers marketplace-side early revocation.
    pub fn invalidate(&self, tenant_id: TenantId) {
        if self.cache.remove(&tenant_id).is_some() {
            debug!(tenant_id = %tenant_id, "Invalidated cached access token");
        }
    }

    /// Seed the cache directly. Test-support hook; production code always
    /// goes through `get_access_token`.
    pub fn seed_cache(&self, tenant_id: TenantId, token: CachedToken) {
        self.cache.insert(tenant_id, token);
    }

    /// Whether a fresh token is currently cached for the tenant.
    #[must_use]
    pub fn has_fresh_token(&self, tenant_id: TenantId) -> bool {
        self.cache
            .get(&tenant_id)
            .is_some_and(|t| t.is_fresh(self.expiry_buffer))
    }
}

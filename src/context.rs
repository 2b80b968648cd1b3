// ABOUTME: Dependency injection context assembling the core from configuration
// ABOUTME: Constructs vault, database, resolver, token service, clients, and services once per process
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Core Resources
//!
//! One-stop construction of the whole core from a [`CoreConfig`]. Every
//! shared object (vault, database, token cache, rate limiter) is built
//! exactly once here and injected into its consumers; nothing in the crate
//! reaches for ambient global state, so tests can assemble isolated
//! instances from the same parts.

use std::sync::Arc;

use crate::aggregation::HybridAggregationClient;
use crate::config::environment::CoreConfig;
use crate::connection::ConnectionService;
use crate::credentials::CredentialResolver;
use crate::crypto::CredentialVault;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::marketplace::RestMarketplaceClient;
use crate::rate_limiting::PacingLimiter;
use crate::retry::RetryPolicy;
use crate::token_service::{HttpTokenExchanger, TokenService};

/// Fully wired core, one instance per process.
pub struct CoreResources {
    /// Credential storage.
    pub database: Arc<Database>,
    /// Token lifecycle manager.
    pub tokens: Arc<TokenService>,
    /// Connection lifecycle surface.
    pub connections: ConnectionService,
    /// Unified listing aggregation surface.
    pub aggregation: HybridAggregationClient,
}

impl CoreResources {
    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns configuration, vault, or database errors; construction fails
    /// fast rather than deferring problems to the first request.
    pub async fn initialize(config: CoreConfig) -> AppResult<Self> {
        config.validate()?;

        let vault = Arc::new(CredentialVault::new(config.encryption_key.clone())?);
        let database = Arc::new(Database::new(&config.database_url).await?);

        let has_global_credentials = config.global_app.is_some();
        let resolver = Arc::new(CredentialResolver::new(
            Arc::clone(&database),
            Arc::clone(&vault),
            config.global_app.clone(),
        ));

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))?;

        let retry = RetryPolicy::from_settings(&config.retry);
        let tokens = Arc::new(TokenService::new(
            resolver,
            Arc::new(HttpTokenExchanger::new(
                http.clone(),
                config.marketplace.token_url.clone(),
            )),
            retry,
            config.token.expiry_buffer,
        ));

        let limiter = Arc::new(PacingLimiter::new(
            config.rate_limit.resource_spacing,
            config.rate_limit.tenant_switch_spacing,
        ));

        let api = Arc::new(RestMarketplaceClient::new(
            http,
            config.marketplace.clone(),
            Arc::clone(&tokens),
        ));

        let aggregation = HybridAggregationClient::new(
            api,
            limiter,
            config.cache.catalog_page_size,
            config.cache.offer_concurrency,
            config.cache.listings_cache_ttl,
        );

        let connections = ConnectionService::new(
            Arc::clone(&database),
            vault,
            Arc::clone(&tokens),
            has_global_credentials,
        );

        Ok(Self {
            database,
            tokens,
            connections,
            aggregation,
        })
    }
}

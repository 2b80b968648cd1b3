// ABOUTME: Shared test utilities and scripted fakes for integration tests
// ABOUTME: Provides in-memory database setup, a scripted token exchanger, and a mock marketplace
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(dead_code, missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quayside::credentials::CredentialResolver;
use quayside::crypto::CredentialVault;
use quayside::database::Database;
use quayside::errors::{AppError, AppResult};
use quayside::marketplace::{
    CatalogItem, CatalogPage, EngagementStats, MarketplaceApi, OfferData, OfferPrice,
};
use quayside::models::TenantId;
use quayside::retry::RetryPolicy;
use quayside::token_service::{TokenExchanger, TokenGrant, TokenService};
use tokio::sync::Mutex;

pub const TEST_KEY: [u8; 32] = [42u8; 32];

/// Initialize test logging once per process; controlled by `RUST_LOG`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn test_vault() -> Arc<CredentialVault> {
    Arc::new(CredentialVault::new(TEST_KEY.to_vec()).expect("valid test key"))
}

pub async fn test_database() -> Arc<Database> {
    Arc::new(
        Database::new("sqlite::memory:")
            .await
            .expect("Failed to create test database"),
    )
}

/// Store app credentials and a refresh token so the tenant resolves as
/// connected.
pub async fn connect_tenant(
    db: &Database,
    vault: &CredentialVault,
    tenant: TenantId,
    app_id: &str,
    app_secret: &str,
    refresh_token: &str,
) {
    let secret_blob = vault.encrypt(app_secret).expect("encrypt secret");
    db.upsert_app_credentials(tenant, app_id, &secret_blob)
        .await
        .expect("store app credentials");
    let token_blob = vault.encrypt(refresh_token).expect("encrypt refresh token");
    db.store_refresh_token(tenant, &token_blob, Some("market-user-1"))
        .await
        .expect("store refresh token");
}

/// Token exchanger that replays a script of responses.
///
/// Once the script is exhausted every further call returns the configured
/// fallback, so tests can model both one-shot and steady-state behavior.
pub struct ScriptedExchanger {
    calls: AtomicU32,
    script: Mutex<VecDeque<AppResult<TokenGrant>>>,
    fallback: AppResult<TokenGrant>,
    delay: Duration,
    // When set, the success fallback mints a distinct access token per
    // exchange rather than cloning a single pre-built grant.
    regenerate: bool,
}

impl ScriptedExchanger {
    pub fn new(script: Vec<AppResult<TokenGrant>>, fallback: AppResult<TokenGrant>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            regenerate: false,
        }
    }

    /// Always succeed with a fresh grant.
    pub fn always_ok(expires_in: i64) -> Self {
        let mut this = Self::new(Vec::new(), Ok(grant(expires_in)));
        this.regenerate = true;
        this
    }

    /// Always fail with the given error.
    pub fn always_err(err: AppError) -> Self {
        Self::new(Vec::new(), Err(err))
    }

    /// Delay each exchange, widening the single-flight window.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchanger for ScriptedExchanger {
    async fn exchange(
        &self,
        _app_id: &str,
        _app_secret: &str,
        _refresh_token: &str,
    ) -> AppResult<TokenGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().await.pop_front();
        if let Some(result) = scripted {
            return result;
        }
        match &self.fallback {
            Ok(g) if self.regenerate => Ok(TokenGrant {
                access_token: format!("access-{}", uuid::Uuid::new_v4()),
                expires_in: g.expires_in,
                token_type: g.token_type.clone(),
            }),
            other => other.clone(),
        }
    }
}

pub fn grant(expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: format!("access-{}", uuid::Uuid::new_v4()),
        expires_in,
        token_type: "Bearer".to_owned(),
    }
}

/// Build a token service over an in-memory connected tenant.
pub async fn token_service_for(
    tenant: TenantId,
    exchanger: Arc<dyn TokenExchanger>,
) -> Arc<TokenService> {
    let db = test_database().await;
    let vault = test_vault();
    connect_tenant(&db, &vault, tenant, "app-1", "app-secret", "refresh-1").await;
    let resolver = Arc::new(CredentialResolver::new(db, vault, None));
    Arc::new(TokenService::new(
        resolver,
        exchanger,
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        chrono::Duration::seconds(60),
    ))
}

pub fn catalog_item(sku: &str, item_id: &str, title: &str) -> CatalogItem {
    CatalogItem {
        sku: sku.to_owned(),
        item_id: item_id.to_owned(),
        title: title.to_owned(),
        description: format!("{title} description"),
        image_urls: vec![format!("https://img.example.com/{sku}.jpg")],
        quantity: 5,
        condition: "NEW".to_owned(),
        category: "collectibles".to_owned(),
    }
}

pub fn offer(sku: &str, listing_id: &str, price: &str) -> OfferData {
    OfferData {
        offer_id: format!("offer-{sku}"),
        sku: sku.to_owned(),
        listing_id: listing_id.to_owned(),
        price: OfferPrice {
            value: price.to_owned(),
            currency: "EUR".to_owned(),
        },
        status: "PUBLISHED".to_owned(),
        marketplace_id: "SITE_DE".to_owned(),
    }
}

/// Scripted marketplace covering all three API surfaces.
pub struct MockMarketplace {
    pub items: Vec<CatalogItem>,
    pub catalog_error: Option<AppError>,
    /// Per-SKU offer outcomes; SKUs absent from the map resolve to no offer.
    pub offers: HashMap<String, AppResult<Option<OfferData>>>,
    /// Per-SKU artificial latency, for exercising completion-order effects.
    pub offer_delays: HashMap<String, Duration>,
    pub stats: AppResult<HashMap<String, EngagementStats>>,
    pub catalog_calls: AtomicU32,
    pub offer_calls: AtomicU32,
    pub stats_calls: AtomicU32,
}

impl MockMarketplace {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items,
            catalog_error: None,
            offers: HashMap::new(),
            offer_delays: HashMap::new(),
            stats: Ok(HashMap::new()),
            catalog_calls: AtomicU32::new(0),
            offer_calls: AtomicU32::new(0),
            stats_calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn with_offer(mut self, sku: &str, outcome: AppResult<Option<OfferData>>) -> Self {
        self.offers.insert(sku.to_owned(), outcome);
        self
    }

    #[must_use]
    pub fn with_offer_delay(mut self, sku: &str, delay: Duration) -> Self {
        self.offer_delays.insert(sku.to_owned(), delay);
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: AppResult<HashMap<String, EngagementStats>>) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_catalog_error(mut self, err: AppError) -> Self {
        self.catalog_error = Some(err);
        self
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplace {
    async fn fetch_catalog_page(
        &self,
        _tenant_id: TenantId,
        offset: u32,
        limit: u32,
    ) -> AppResult<CatalogPage> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.catalog_error {
            return Err(err.clone());
        }
        let start = offset as usize;
        let end = (start + limit as usize).min(self.items.len());
        let items = if start >= self.items.len() {
            Vec::new()
        } else {
            self.items[start..end].to_vec()
        };
        Ok(CatalogPage {
            items,
            total: self.items.len() as u32,
        })
    }

    async fn fetch_offer(&self, _tenant_id: TenantId, sku: &str) -> AppResult<Option<OfferData>> {
        self.offer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.offer_delays.get(sku) {
            tokio::time::sleep(*delay).await;
        }
        self.offers
            .get(sku)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn fetch_bulk_statistics(
        &self,
        _tenant_id: TenantId,
        _listing_ids: &[String],
    ) -> AppResult<HashMap<String, EngagementStats>> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats.clone()
    }
}

// ABOUTME: Three-stage fetch (catalog, offers, legacy statistics) and deterministic merge
// ABOUTME: Partial offer/statistics failures degrade gracefully; only catalog/token failures abort
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Hybrid Aggregation Client
//!
//! Per aggregation request the client runs three stages:
//!
//! 1. **Catalog fetch**: all pages; any failure aborts the aggregation
//! 2. **Offer fetch**: one call per SKU, coalesced and paced through the
//!    rate limiter; individual failures are recorded, not raised
//! 3. **Bulk statistics fetch**: one batched legacy call; failure zeroes
//!    the engagement fields and records a warning
//!
//! The merge joins all three by item identity and is deterministic: given
//! the same three inputs, the output is identical regardless of the order
//! in which offer fetches completed. Listings keep the catalog fetch's
//! original order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::resources;
use crate::errors::AppResult;
use crate::marketplace::{CatalogItem, EngagementStats, MarketplaceApi, OfferData};
use crate::models::{PartialFailure, TenantId, UnifiedListingRecord};
use crate::rate_limiting::{PacingLimiter, RequestCoalescer, RequestKey};

/// Per-request cache behavior for aggregation results.
///
/// Mirrors the cache-aside pattern: use, bypass entirely, or force a
/// refresh that replaces the cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Use cache if fresh, fetch and cache on miss (default).
    #[default]
    UseCache,
    /// Always fetch fresh data; do not read or update the cache.
    Bypass,
    /// Fetch fresh data and replace the cached entry.
    Refresh,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationOutcome {
    /// Unified records in catalog order.
    pub listings: Vec<UnifiedListingRecord>,
    /// Partial failures; the aggregation as a whole still succeeded.
    pub errors: Vec<PartialFailure>,
}

struct CachedOutcome {
    outcome: AggregationOutcome,
    stored_at: Instant,
}

/// Orchestrates the three-stage fetch and merge for one tenant at a time.
pub struct HybridAggregationClient {
    api: Arc<dyn MarketplaceApi>,
    limiter: Arc<PacingLimiter>,
    offers_inflight: RequestCoalescer<RequestKey, Option<OfferData>>,
    listings_cache: RwLock<HashMap<TenantId, CachedOutcome>>,
    catalog_page_size: u32,
    offer_concurrency: usize,
    cache_ttl: Duration,
}

impl HybridAggregationClient {
    /// Create an aggregation client.
    #[must_use]
    pub fn new(
        api: Arc<dyn MarketplaceApi>,
        limiter: Arc<PacingLimiter>,
        catalog_page_size: u32,
        offer_concurrency: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            api,
            limiter,
            offers_inflight: RequestCoalescer::new(),
            listings_cache: RwLock::new(HashMap::new()),
            catalog_page_size: catalog_page_size.max(1),
            offer_concurrency: offer_concurrency.max(1),
            cache_ttl,
        }
    }

    /// Fetch the unified listing set for a tenant, default cache policy.
    ///
    /// # Errors
    ///
    /// Fails outright only if token acquisition or the catalog fetch fails;
    /// offer and statistics failures are returned as partial failures on a
    /// successful outcome.
    pub async fn fetch_all_listings(&self, tenant_id: TenantId) -> AppResult<AggregationOutcome> {
        self.fetch_all_listings_with_policy(tenant_id, CachePolicy::UseCache)
            .await
    }

    /// Fetch the unified listing set with explicit cache behavior.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_all_listings`].
    pub async fn fetch_all_listings_with_policy(
        &self,
        tenant_id: TenantId,
        policy: CachePolicy,
    ) -> AppResult<AggregationOutcome> {
        if policy == CachePolicy::UseCache {
            let cache = self.listings_cache.read().await;
            if let Some(entry) = cache.get(&tenant_id) {
                if entry.stored_at.elapsed() < self.cache_ttl {
                    debug!(tenant_id = %tenant_id, "Returning cached aggregation outcome");
                    return Ok(entry.outcome.clone());
                }
            }
        }

        let outcome = self.aggregate(tenant_id).await?;

        if policy != CachePolicy::Bypass && self.cache_ttl > Duration::ZERO {
            let mut cache = self.listings_cache.write().await;
            cache.insert(
                tenant_id,
                CachedOutcome {
                    outcome: outcome.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        Ok(outcome)
    }

    /// Drop a tenant's cached aggregation outcome.
    pub async fn invalidate_cache(&self, tenant_id: TenantId) {
        self.listings_cache.write().await.remove(&tenant_id);
    }

    async fn aggregate(&self, tenant_id: TenantId) -> AppResult<AggregationOutcome> {
        let synced_at = Utc::now();

        let items = self.fetch_catalog(tenant_id).await?;
        info!(
            tenant_id = %tenant_id,
            item_count = items.len(),
            "Catalog fetch complete, fanning out offer fetches"
        );

        let (offers, mut errors) = self.fetch_offers(tenant_id, &items).await;
        let stats = self.fetch_statistics(tenant_id, &items, &mut errors).await;

        let listings = merge_listings(&items, &offers, &stats, synced_at);
        info!(
            tenant_id = %tenant_id,
            listing_count = listings.len(),
            partial_failures = errors.len(),
            "Aggregation complete"
        );

        Ok(AggregationOutcome { listings, errors })
    }

    /// Stage 1: list all catalog pages. Failure aborts the aggregation.
    async fn fetch_catalog(&self, tenant_id: TenantId) -> AppResult<Vec<CatalogItem>> {
        let mut items: Vec<CatalogItem> = Vec::new();
        let mut offset = 0u32;
        loop {
            self.limiter.acquire(tenant_id, resources::CATALOG).await;
            let page = self
                .api
                .fetch_catalog_page(tenant_id, offset, self.catalog_page_size)
                .await?;
            let fetched = page.items.len() as u32;
            items.extend(page.items);
            if fetched == 0 || fetched < self.catalog_page_size || items.len() as u32 >= page.total
            {
                break;
            }
            offset += fetched;
        }
        Ok(items)
    }

    /// Stage 2: fetch offers with bounded fan-out. Individual failures are
    /// recorded in catalog order, never raised.
    async fn fetch_offers(
        &self,
        tenant_id: TenantId,
        items: &[CatalogItem],
    ) -> (HashMap<String, OfferData>, Vec<PartialFailure>) {
        let results: Vec<(String, AppResult<Option<OfferData>>)> =
            stream::iter(items.iter().map(|item| item.sku.clone()))
                .map(|sku| {
                    let api = Arc::clone(&self.api);
                    let limiter = Arc::clone(&self.limiter);
                    let coalescer = &self.offers_inflight;
                    let key = RequestKey::new(tenant_id, resources::OFFER, sku.clone());
                    async move {
                        let fetch_sku = sku.clone();
                        let result = coalescer
                            .run(key, move || async move {
                                limiter.acquire(tenant_id, resources::OFFER).await;
                                api.fetch_offer(tenant_id, &fetch_sku).await
                            })
                            .await;
                        (sku, result)
                    }
                })
                .buffer_unordered(self.offer_concurrency)
                .collect()
                .await;

        let mut by_sku: HashMap<String, AppResult<Option<OfferData>>> =
            results.into_iter().collect();

        let mut offers = HashMap::new();
        let mut failures = Vec::new();
        // Walk the catalog order so the failure list is deterministic
        // regardless of offer completion order.
        for item in items {
            match by_sku.remove(&item.sku) {
                Some(Ok(Some(offer))) => {
                    offers.insert(item.sku.clone(), offer);
                }
                Some(Ok(None)) | None => {}
                Some(Err(err)) => {
                    warn!(
                        tenant_id = %tenant_id,
                        sku = %item.sku,
                        error = %err,
                        "Offer fetch failed, keeping descriptive fields with defaults"
                    );
                    failures.push(PartialFailure::offer(&item.sku, &err));
                }
            }
        }
        (offers, failures)
    }

    /// Stage 3: one batched legacy statistics call. Failure degrades
    /// gracefully to zeroed engagement fields plus a warning entry.
    async fn fetch_statistics(
        &self,
        tenant_id: TenantId,
        items: &[CatalogItem],
        errors: &mut Vec<PartialFailure>,
    ) -> HashMap<String, EngagementStats> {
        let listing_ids: Vec<String> = items
            .iter()
            .map(|item| item.item_id.clone())
            .filter(|id| !id.is_empty())
            .collect();

        if listing_ids.is_empty() {
            return HashMap::new();
        }

        self.limiter.acquire(tenant_id, resources::STATISTICS).await;
        match self.api.fetch_bulk_statistics(tenant_id, &listing_ids).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(
                    tenant_id = %tenant_id,
                    error = %err,
                    "Bulk statistics fetch failed, zeroing engagement fields"
                );
                errors.push(PartialFailure::statistics(&err));
                HashMap::new()
            }
        }
    }
}

/// Join the three sources by item identity.
///
/// Pure and deterministic: output order is the catalog order, and fields
/// from a source that returned no data default to zero/empty rather than
/// being omitted.
#[must_use]
pub fn merge_listings(
    items: &[CatalogItem],
    offers: &HashMap<String, OfferData>,
    stats: &HashMap<String, EngagementStats>,
    synced_at: DateTime<Utc>,
) -> Vec<UnifiedListingRecord> {
    items
        .iter()
        .map(|item| {
            let offer = offers.get(&item.sku);
            let marketplace_item_id = if item.item_id.is_empty() {
                offer.map(|o| o.listing_id.clone()).unwrap_or_default()
            } else {
                item.item_id.clone()
            };
            let engagement = stats
                .get(&marketplace_item_id)
                .copied()
                .unwrap_or_default();

            UnifiedListingRecord {
                sku: item.sku.clone(),
                marketplace_item_id,
                title: item.title.clone(),
                description: item.description.clone(),
                image_urls: item.image_urls.clone(),
                quantity: item.quantity,
                condition: item.condition.clone(),
                category: item.category.clone(),
                price: offer
                    .and_then(|o| o.price.value.parse::<f64>().ok())
                    .unwrap_or(0.0),
                currency: offer.map(|o| o.price.currency.clone()).unwrap_or_default(),
                listing_status: offer.map(|o| o.status.clone()).unwrap_or_default(),
                marketplace_scope: offer
                    .map(|o| o.marketplace_id.clone())
                    .unwrap_or_default(),
                view_count: engagement.view_count,
                watch_count: engagement.watch_count,
                last_synced_at: synced_at,
            }
        })
        .collect()
}

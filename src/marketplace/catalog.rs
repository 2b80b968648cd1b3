// ABOUTME: Catalog API client: paginated listing of a tenant's catalog items
// ABOUTME: Yields item identity and descriptive fields for the aggregation merge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

use serde::{Deserialize, Serialize};

use super::{classify_status, retry_after_hint};
use crate::errors::{AppError, AppResult};

/// One catalog item: identity plus descriptive fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Seller-assigned stock keeping unit.
    pub sku: String,
    /// Marketplace listing identifier; empty until the item is published.
    #[serde(rename = "itemId", default)]
    pub item_id: String,
    /// Listing title.
    #[serde(default)]
    pub title: String,
    /// Listing description.
    #[serde(default)]
    pub description: String,
    /// Image URLs.
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Vec<String>,
    /// Available quantity.
    #[serde(default)]
    pub quantity: u32,
    /// Item condition, e.g. `NEW`.
    #[serde(default)]
    pub condition: String,
    /// Marketplace category.
    #[serde(default)]
    pub category: String,
}

/// One page of catalog items.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    /// Items on this page, in catalog order.
    #[serde(default)]
    pub items: Vec<CatalogItem>,
    /// Total items across all pages.
    #[serde(default)]
    pub total: u32,
}

/// Fetch one catalog page.
///
/// # Errors
///
/// Returns a classified error on any non-success response; catalog failures
/// abort the whole aggregation.
pub(crate) async fn fetch_page(
    http: &reqwest::Client,
    base_url: &str,
    token: String,
    offset: u32,
    limit: u32,
) -> AppResult<CatalogPage> {
    let url = format!("{base_url}/catalog/items");
    let response = http
        .get(&url)
        .bearer_auth(token)
        .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
        .send()
        .await
        .map_err(|e| AppError::unavailable(format!("Catalog API unreachable: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let mut err = classify_status(status, "Catalog API");
        if let Some(delay) = retry_after_hint(&response) {
            err = err.with_retry_after(delay);
        }
        return Err(err);
    }

    response
        .json::<CatalogPage>()
        .await
        .map_err(|e| AppError::unavailable(format!("Malformed catalog response: {e}")))
}

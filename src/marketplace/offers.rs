// ABOUTME: Offer API client: per-SKU commercial data lookup
// ABOUTME: Yields price, currency, status, and marketplace scope for the merge
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

use serde::{Deserialize, Serialize};

use super::{classify_status, retry_after_hint};
use crate::errors::{AppError, AppResult};

/// Monetary amount as the marketplace sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferPrice {
    /// Decimal value as a string, e.g. `"19.99"`.
    #[serde(default)]
    pub value: String,
    /// ISO currency code, e.g. `"EUR"`.
    #[serde(default)]
    pub currency: String,
}

/// Commercial offer data for one SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferData {
    /// Marketplace offer identifier.
    #[serde(rename = "offerId", default)]
    pub offer_id: String,
    /// SKU the offer belongs to.
    pub sku: String,
    /// Marketplace listing identifier the offer published to.
    #[serde(rename = "listingId", default)]
    pub listing_id: String,
    /// Price and currency.
    #[serde(default)]
    pub price: OfferPrice,
    /// Offer status, e.g. `PUBLISHED`.
    #[serde(default)]
    pub status: String,
    /// Marketplace scope the offer targets, e.g. a site id.
    #[serde(rename = "marketplaceId", default)]
    pub marketplace_id: String,
}

#[derive(Debug, Deserialize)]
struct OfferLookupResponse {
    #[serde(default)]
    offers: Vec<OfferData>,
}

/// Fetch the offer for one SKU. `Ok(None)` when the SKU has no offer
/// (HTTP 404 or an empty offer list).
///
/// # Errors
///
/// Returns a classified error on other non-success responses.
pub(crate) async fn fetch_by_sku(
    http: &reqwest::Client,
    base_url: &str,
    token: String,
    sku: &str,
) -> AppResult<Option<OfferData>> {
    let url = format!("{base_url}/offers");
    let response = http
        .get(&url)
        .bearer_auth(token)
        .query(&[("sku", sku)])
        .send()
        .await
        .map_err(|e| AppError::unavailable(format!("Offer API unreachable: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let mut err = classify_status(status, "Offer API");
        if let Some(delay) = retry_after_hint(&response) {
            err = err.with_retry_after(delay);
        }
        return Err(err);
    }

    let lookup = response
        .json::<OfferLookupResponse>()
        .await
        .map_err(|e| AppError::unavailable(format!("Malformed offer response: {e}")))?;

    Ok(lookup.offers.into_iter().next())
}

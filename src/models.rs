// ABOUTME: Common data models for tenants, credential records, and unified listings
// ABOUTME: Defines the persisted credential shape and the merged three-source listing record
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! Core data models.
//!
//! [`TenantCredentialRecord`] is the only persisted shape; everything else is
//! process-local or derived per fetch. [`UnifiedListingRecord`] always
//! carries every field with zero/empty defaults so downstream consumers
//! never branch on missing keys.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, ErrorCode};

/// Opaque tenant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Generate a fresh tenant id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Connection state of a tenant's marketplace authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No refresh token on file.
    Disconnected,
    /// Refresh token on file and last known good.
    Connected,
    /// Marketplace rejected the refresh token; tenant must reconnect.
    Expired,
}

impl ConnectionStatus {
    /// Stable string form used in persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connected" => Ok(Self::Connected),
            "expired" => Ok(Self::Expired),
            other => Err(AppError::database(format!(
                "Unknown connection status in storage: {other}"
            ))),
        }
    }
}

/// Persisted marketplace credentials for one tenant.
///
/// Secrets are vault ciphertext blobs (`nonceHex:cipherHex`); plaintext
/// never reaches storage. Rows are created on first credential submission,
/// mutated on reconnect/disconnect, and never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCredentialRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Marketplace-issued application (client) identifier, plaintext.
    pub app_id: Option<String>,
    /// Encrypted application secret.
    pub app_secret_encrypted: Option<String>,
    /// Encrypted long-lived refresh token; `None` when disconnected.
    pub refresh_token_encrypted: Option<String>,
    /// Marketplace-side user id, set after first successful authorization.
    pub marketplace_user_id: Option<String>,
    /// Current connection state.
    pub connection_status: ConnectionStatus,
    /// When the tenant last completed authorization.
    pub connected_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl TenantCredentialRecord {
    /// Whether the record carries a complete tenant-specific app credential
    /// pair (id and encrypted secret).
    #[must_use]
    pub fn has_app_credentials(&self) -> bool {
        self.app_id.as_ref().is_some_and(|id| !id.is_empty())
            && self
                .app_secret_encrypted
                .as_ref()
                .is_some_and(|s| !s.is_empty())
    }
}

/// Process-local cached access token. Never persisted.
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// Opaque bearer string.
    pub token: String,
    /// Absolute expiry reported by the marketplace.
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Usable only while `now + buffer < expires_at`, so a token can never
    /// expire mid-call.
    #[must_use]
    pub fn is_fresh(&self, buffer: chrono::Duration) -> bool {
        Utc::now() + buffer < self.expires_at
    }
}

/// Where resolved application credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Tenant-specific credentials from storage.
    Tenant,
    /// Operator-wide credentials from process configuration.
    Global,
}

/// One item's data merged from the three upstream API surfaces.
///
/// Complete only once all three sources have been consulted; fields from a
/// source that returned no data default to zero/empty rather than being
/// omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedListingRecord {
    /// Seller-assigned stock keeping unit.
    pub sku: String,
    /// Marketplace listing identifier.
    pub marketplace_item_id: String,
    /// Listing title (catalog API).
    pub title: String,
    /// Listing description (catalog API).
    pub description: String,
    /// Image URLs (catalog API).
    pub image_urls: Vec<String>,
    /// Available quantity (catalog API).
    pub quantity: u32,
    /// Item condition (catalog API).
    pub condition: String,
    /// Marketplace category (catalog API).
    pub category: String,
    /// Offer price value (offer API); `0.0` when no offer data.
    pub price: f64,
    /// ISO currency code (offer API); empty when no offer data.
    pub currency: String,
    /// Offer status (offer API); empty when no offer data.
    pub listing_status: String,
    /// Marketplace scope the offer targets (offer API).
    pub marketplace_scope: String,
    /// View counter (legacy statistics API); `0` when unavailable.
    pub view_count: u64,
    /// Watch counter (legacy statistics API); `0` when unavailable.
    pub watch_count: u64,
    /// When this aggregation pass ran.
    pub last_synced_at: DateTime<Utc>,
}

/// Aggregation stage a partial failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStage {
    /// Per-SKU offer fetch.
    Offer,
    /// Bulk legacy statistics fetch.
    Statistics,
}

/// A non-fatal error affecting a subset of an otherwise successful
/// aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct PartialFailure {
    /// Stage that failed.
    pub stage: AggregationStage,
    /// SKU the failure applies to; `None` for batch-level failures.
    pub sku: Option<String>,
    /// Underlying error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl PartialFailure {
    /// Record a failed offer fetch for one SKU.
    #[must_use]
    pub fn offer(sku: impl Into<String>, err: &AppError) -> Self {
        Self {
            stage: AggregationStage::Offer,
            sku: Some(sku.into()),
            code: err.code(),
            message: err.message().to_owned(),
        }
    }

    /// Record a failed bulk statistics fetch.
    #[must_use]
    pub fn statistics(err: &AppError) -> Self {
        Self {
            stage: AggregationStage::Statistics,
            sku: None,
            code: err.code(),
            message: err.message().to_owned(),
        }
    }
}

/// One actionable problem reported by the connection status check.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionIssue {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Suggested remediation.
    pub action: crate::errors::RemediationAction,
    /// Human-readable detail.
    pub message: String,
}

impl ConnectionIssue {
    /// Build an issue from an error code with a message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            action: code.remediation(),
            message: message.into(),
        }
    }
}

/// Connection status report for external collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusReport {
    /// Whether a usable refresh token is on file.
    pub connected: bool,
    /// Whether application credentials exist at any tier.
    pub has_credentials: bool,
    /// Actionable problems, empty when fully connected.
    pub issues: Vec<ConnectionIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_status_round_trips_through_storage_form() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected,
            ConnectionStatus::Expired,
        ] {
            let parsed: ConnectionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("garbage".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn cached_token_freshness_respects_buffer() {
        let token = CachedToken {
            token: "t".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(120),
        };
        assert!(token.is_fresh(chrono::Duration::seconds(60)));
        assert!(!token.is_fresh(chrono::Duration::seconds(180)));
    }

    #[test]
    fn app_credential_pair_requires_both_halves() {
        let now = Utc::now();
        let mut record = TenantCredentialRecord {
            tenant_id: TenantId::new(),
            app_id: Some("app-1".into()),
            app_secret_encrypted: None,
            refresh_token_encrypted: None,
            marketplace_user_id: None,
            connection_status: ConnectionStatus::Disconnected,
            connected_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!record.has_app_credentials());
        record.app_secret_encrypted = Some("aa:bb".into());
        assert!(record.has_app_credentials());
        record.app_id = Some(String::new());
        assert!(!record.has_app_credentials());
    }
}

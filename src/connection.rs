// ABOUTME: Connection lifecycle surface: credential submission, authorization, status, disconnect
// ABOUTME: Exposes the core's contract to external collaborators with actionable issue codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Connection Service
//!
//! The credential-lifecycle half of the contract exposed to external
//! collaborators (business logic, UI backends):
//!
//! - `save_app_credentials`: first credential submission, secret encrypted
//!   through the vault before it touches storage
//! - `complete_authorization`: stores the refresh token after the tenant
//!   approved the marketplace connection
//! - `get_connection_status`: connected/credential flags plus actionable
//!   issues, each with a machine-readable code and remediation
//! - `disconnect`: clears refresh token and status, leaves application
//!   credentials intact for easy reconnection
//! - `get_handle`: a live [`ApiHandle`] backed by the token service

use std::sync::Arc;

use tracing::info;

use crate::crypto::{BlobFormat, CredentialVault};
use crate::database::Database;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::marketplace::ApiHandle;
use crate::models::{
    ConnectionIssue, ConnectionStatus, ConnectionStatusReport, TenantCredentialRecord, TenantId,
};
use crate::token_service::TokenService;

/// Credential lifecycle operations for one deployment.
pub struct ConnectionService {
    database: Arc<Database>,
    vault: Arc<CredentialVault>,
    tokens: Arc<TokenService>,
    has_global_credentials: bool,
}

impl ConnectionService {
    /// Create the service.
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        vault: Arc<CredentialVault>,
        tokens: Arc<TokenService>,
        has_global_credentials: bool,
    ) -> Self {
        Self {
            database,
            vault,
            tokens,
            has_global_credentials,
        }
    }

    /// Store a tenant's application credentials, encrypting the secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty fields, or storage/vault errors.
    pub async fn save_app_credentials(
        &self,
        tenant_id: TenantId,
        app_id: &str,
        app_secret: &str,
    ) -> AppResult<()> {
        if app_id.trim().is_empty() || app_secret.trim().is_empty() {
            return Err(AppError::invalid_input(
                "Application id and secret must both be non-empty",
            ));
        }
        let encrypted = self.vault.encrypt(app_secret)?;
        self.database
            .upsert_app_credentials(tenant_id, app_id, &encrypted)
            .await?;
        info!(tenant_id = %tenant_id, "Stored tenant application credentials");
        Ok(())
    }

    /// Store the refresh token after a completed authorization and mark the
    /// tenant connected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty token, or storage/vault errors.
    pub async fn complete_authorization(
        &self,
        tenant_id: TenantId,
        refresh_token: &str,
        marketplace_user_id: Option<&str>,
    ) -> AppResult<()> {
        if refresh_token.trim().is_empty() {
            return Err(AppError::invalid_input("Refresh token must be non-empty"));
        }
        let encrypted = self.vault.encrypt(refresh_token)?;
        self.database
            .store_refresh_token(tenant_id, &encrypted, marketplace_user_id)
            .await?;
        // A stale cached token from a previous authorization must not outlive it.
        self.tokens.invalidate(tenant_id);
        info!(tenant_id = %tenant_id, "Tenant completed marketplace authorization");
        Ok(())
    }

    /// Disconnect a tenant: clear the refresh token and status, keep the
    /// application credentials for easy reconnection.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn disconnect(&self, tenant_id: TenantId) -> AppResult<()> {
        self.database.clear_refresh_token(tenant_id).await?;
        self.tokens.invalidate(tenant_id);
        info!(tenant_id = %tenant_id, "Tenant disconnected from the marketplace");
        Ok(())
    }

    /// Record that the marketplace rejected the tenant's refresh token.
    ///
    /// Called by collaborators handling a `MarketplaceAuthFailed`; flips the
    /// persisted status to `expired` and drops any cached access token.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn record_auth_failure(&self, tenant_id: TenantId) -> AppResult<()> {
        self.database.mark_connection_expired(tenant_id).await?;
        self.tokens.invalidate(tenant_id);
        Ok(())
    }

    /// Report connection status with actionable issues.
    ///
    /// Inspection is local: stored blobs are format-checked but nothing is
    /// decrypted and no network call is made.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn get_connection_status(
        &self,
        tenant_id: TenantId,
    ) -> AppResult<ConnectionStatusReport> {
        let record = self.database.get_tenant_credentials(tenant_id).await?;
        Ok(self.build_report(record.as_ref()))
    }

    /// A live API handle for the tenant, opaque to the caller.
    #[must_use]
    pub fn get_handle(&self, tenant_id: TenantId) -> ApiHandle {
        ApiHandle::new(tenant_id, Arc::clone(&self.tokens))
    }

    fn build_report(&self, record: Option<&TenantCredentialRecord>) -> ConnectionStatusReport {
        let mut issues = Vec::new();

        let has_tenant_credentials = record.is_some_and(TenantCredentialRecord::has_app_credentials);
        let has_credentials = has_tenant_credentials || self.has_global_credentials;
        if !has_credentials {
            issues.push(ConnectionIssue::new(
                ErrorCode::CredentialsNotConfigured,
                "No application credentials configured at any tier",
            ));
        }

        if has_tenant_credentials {
            // Flag unreadable stored secrets before a token exchange trips
            // over them.
            if let Some(blob) = record.and_then(|r| r.app_secret_encrypted.as_deref()) {
                push_blob_issue(&mut issues, blob, "application secret");
            }
        }

        let refresh_blob = record.and_then(|r| r.refresh_token_encrypted.as_deref());
        let mut refresh_usable = false;
        match refresh_blob {
            None => {
                issues.push(ConnectionIssue::new(
                    ErrorCode::NotConnected,
                    "Tenant has not authorized the marketplace connection",
                ));
            }
            Some(blob) => {
                refresh_usable = CredentialVault::inspect(blob) == BlobFormat::Valid;
                push_blob_issue(&mut issues, blob, "refresh token");
            }
        }

        let status = record.map_or(ConnectionStatus::Disconnected, |r| r.connection_status);
        if status == ConnectionStatus::Expired {
            issues.push(ConnectionIssue::new(
                ErrorCode::MarketplaceAuthFailed,
                "The marketplace rejected the stored refresh token",
            ));
        }

        ConnectionStatusReport {
            connected: status == ConnectionStatus::Connected && refresh_usable,
            has_credentials,
            issues,
        }
    }
}

fn push_blob_issue(issues: &mut Vec<ConnectionIssue>, blob: &str, what: &str) {
    match CredentialVault::inspect(blob) {
        BlobFormat::LegacySentinel => issues.push(ConnectionIssue::new(
            ErrorCode::MigrationRequired,
            format!("Stored {what} predates encryption and must be re-entered"),
        )),
        BlobFormat::Malformed => issues.push(ConnectionIssue::new(
            ErrorCode::MalformedCiphertext,
            format!("Stored {what} is unreadable"),
        )),
        BlobFormat::Valid => {}
    }
}

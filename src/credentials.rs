// ABOUTME: Credential resolution with tenant-specific first, operator-wide fallback policy
// ABOUTME: Decryption failures are terminal and never fall back to global credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Credential Resolver
//!
//! The single entry point for every credential read in the crate. No other
//! module reads application credentials from configuration or storage
//! directly; routing everything through [`CredentialResolver::resolve`]
//! makes the fallback policy auditable in one place.
//!
//! Policy: tenant-specific application credentials win when both the id and
//! a decryptable secret are present. Otherwise the operator-wide pair from
//! process configuration applies. A tenant secret that fails decryption
//! (`MigrationRequired` or `MalformedCiphertext`) fails resolution
//! immediately; silently falling back to global credentials would
//! authenticate under the wrong marketplace identity.

use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::GlobalAppCredentials;
use crate::crypto::CredentialVault;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{CredentialSource, TenantId};

/// Plaintext credentials resolved for one tenant.
pub struct ResolvedCredentials {
    /// Marketplace-issued client identifier.
    pub app_id: String,
    /// Decrypted application secret; zeroed on drop.
    pub app_secret: Zeroizing<String>,
    /// Decrypted long-lived refresh token; zeroed on drop.
    pub refresh_token: Zeroizing<String>,
    /// Marketplace-side user id, if known.
    pub marketplace_user_id: Option<String>,
    /// Which tier supplied the application credentials.
    pub source: CredentialSource,
}

impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never render the plaintext secret or refresh token.
        f.debug_struct("ResolvedCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("marketplace_user_id", &self.marketplace_user_id)
            .field("source", &self.source)
            .finish()
    }
}

/// Resolves plaintext credentials for a tenant.
pub struct CredentialResolver {
    database: Arc<Database>,
    vault: Arc<CredentialVault>,
    global_app: Option<GlobalAppCredentials>,
}

impl CredentialResolver {
    /// Create a resolver over storage, the vault, and the optional
    /// operator-wide credential pair.
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        vault: Arc<CredentialVault>,
        global_app: Option<GlobalAppCredentials>,
    ) -> Self {
        Self {
            database,
            vault,
            global_app,
        }
    }

    /// Whether operator-wide fallback credentials are configured.
    #[must_use]
    pub const fn has_global_credentials(&self) -> bool {
        self.global_app.is_some()
    }

    /// Resolve plaintext credentials for a tenant.
    ///
    /// # Errors
    ///
    /// - `MigrationRequired` / `MalformedCiphertext` if a stored secret is
    ///   unreadable (never falls back)
    /// - `CredentialsNotConfigured` if no application credentials exist at
    ///   any tier
    /// - `NotConnected` if the tenant never completed authorization
    /// - `DatabaseError` if storage fails
    pub async fn resolve(&self, tenant_id: TenantId) -> AppResult<ResolvedCredentials> {
        let record = self.database.get_tenant_credentials(tenant_id).await?;

        let (app_id, app_secret, source) = match record.as_ref() {
            Some(rec) if rec.has_app_credentials() => {
                // has_app_credentials guarantees both halves are present
                let app_id = rec.app_id.clone().unwrap_or_default();
                let blob = rec.app_secret_encrypted.as_deref().unwrap_or_default();
                let secret = self.vault.decrypt(blob)?;
                debug!(tenant_id = %tenant_id, "Using tenant-specific app credentials");
                (app_id, Zeroizing::new(secret), CredentialSource::Tenant)
            }
            _ => match &self.global_app {
                Some(global) => {
                    debug!(tenant_id = %tenant_id, "Using operator-wide app credentials");
                    (
                        global.app_id.clone(),
                        Zeroizing::new(global.app_secret.clone()),
                        CredentialSource::Global,
                    )
                }
                None => {
                    return Err(AppError::credentials_not_configured(format!(
                        "No application credentials configured for tenant {tenant_id}"
                    )));
                }
            },
        };

        let Some(record) = record else {
            return Err(AppError::not_connected(format!(
                "Tenant {tenant_id} has not authorized the marketplace connection"
            )));
        };
        let Some(refresh_blob) = record
            .refresh_token_encrypted
            .as_deref()
            .filter(|blob| !blob.is_empty())
        else {
            return Err(AppError::not_connected(format!(
                "Tenant {tenant_id} has not authorized the marketplace connection"
            )));
        };

        let refresh_token = Zeroizing::new(self.vault.decrypt(refresh_blob)?);

        Ok(ResolvedCredentials {
            app_id,
            app_secret,
            refresh_token,
            marketplace_user_id: record.marketplace_user_id,
            source,
        })
    }
}

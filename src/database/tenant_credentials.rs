// ABOUTME: TenantCredentialRecord database operations for per-tenant marketplace credentials
// ABOUTME: Upserts app credentials, stores/clears refresh tokens, tracks connection status
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{ConnectionStatus, TenantCredentialRecord, TenantId};

impl Database {
    /// Upsert a tenant's application credentials.
    ///
    /// The secret must already be vault ciphertext; this module never sees
    /// plaintext. Existing refresh-token state is left untouched so a
    /// credential rotation does not force a reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert_app_credentials(
        &self,
        tenant_id: TenantId,
        app_id: &str,
        app_secret_encrypted: &str,
    ) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO tenant_credentials (
                tenant_id, app_id, app_secret_encrypted, connection_status,
                created_at, updated_at
            ) VALUES ($1, $2, $3, 'disconnected', $4, $4)
            ON CONFLICT (tenant_id)
            DO UPDATE SET
                app_id = EXCLUDED.app_id,
                app_secret_encrypted = EXCLUDED.app_secret_encrypted,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(tenant_id.to_string())
        .bind(app_id)
        .bind(app_secret_encrypted)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to upsert app credentials: {e}")))?;

        Ok(())
    }

    /// Get a tenant's credential record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is
    /// corrupt.
    pub async fn get_tenant_credentials(
        &self,
        tenant_id: TenantId,
    ) -> AppResult<Option<TenantCredentialRecord>> {
        let row = sqlx::query(
            r"
            SELECT tenant_id, app_id, app_secret_encrypted, refresh_token_encrypted,
                   marketplace_user_id, connection_status, connected_at,
                   created_at, updated_at
            FROM tenant_credentials
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to query tenant credentials: {e}")))?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(row_to_record(&row)?)))
    }

    /// Store an encrypted refresh token after a completed authorization.
    ///
    /// Creates the row if the tenant runs on operator-wide app credentials
    /// and never submitted its own pair. Sets the connection status to
    /// `connected` and stamps `connected_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn store_refresh_token(
        &self,
        tenant_id: TenantId,
        refresh_token_encrypted: &str,
        marketplace_user_id: Option<&str>,
    ) -> AppResult<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO tenant_credentials (
                tenant_id, refresh_token_encrypted, marketplace_user_id,
                connection_status, connected_at, created_at, updated_at
            ) VALUES ($1, $2, $3, 'connected', $4, $4, $4)
            ON CONFLICT (tenant_id)
            DO UPDATE SET
                refresh_token_encrypted = EXCLUDED.refresh_token_encrypted,
                marketplace_user_id = EXCLUDED.marketplace_user_id,
                connection_status = 'connected',
                connected_at = EXCLUDED.connected_at,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(tenant_id.to_string())
        .bind(refresh_token_encrypted)
        .bind(marketplace_user_id)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to store refresh token: {e}")))?;

        Ok(())
    }

    /// Clear a tenant's refresh token and connection status.
    ///
    /// Application credentials are left intact for easy reconnection. The
    /// row itself is never deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn clear_refresh_token(&self, tenant_id: TenantId) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE tenant_credentials
            SET refresh_token_encrypted = NULL,
                connection_status = 'disconnected',
                connected_at = NULL,
                updated_at = $2
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.to_string())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to clear refresh token: {e}")))?;

        Ok(())
    }

    /// Mark a tenant's connection as expired after the marketplace rejected
    /// the refresh token. The token stays on file so the tenant can see what
    /// happened; only a reconnect replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_connection_expired(&self, tenant_id: TenantId) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE tenant_credentials
            SET connection_status = 'expired',
                updated_at = $2
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.to_string())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to mark connection expired: {e}")))?;

        Ok(())
    }
}

fn row_to_record(row: &SqliteRow) -> AppResult<TenantCredentialRecord> {
    let tenant_id_str: String = row.get("tenant_id");
    let tenant_id = tenant_id_str
        .parse::<TenantId>()
        .map_err(|e| AppError::database(format!("Corrupt tenant_id in storage: {e}")))?;
    let status_str: String = row.get("connection_status");
    let connection_status: ConnectionStatus = status_str.parse()?;

    Ok(TenantCredentialRecord {
        tenant_id,
        app_id: row.get("app_id"),
        app_secret_encrypted: row.get("app_secret_encrypted"),
        refresh_token_encrypted: row.get("refresh_token_encrypted"),
        marketplace_user_id: row.get("marketplace_user_id"),
        connection_status,
        connected_at: row.get("connected_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

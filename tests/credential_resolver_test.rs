// ABOUTME: Integration tests for credential resolution policy
// ABOUTME: Validates tenant-first precedence, fallback rules, and no-fallback on decryption failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{connect_tenant, test_database, test_vault};
use quayside::config::GlobalAppCredentials;
use quayside::credentials::CredentialResolver;
use quayside::errors::ErrorCode;
use quayside::models::{CredentialSource, TenantId};

fn global_pair() -> Option<GlobalAppCredentials> {
    Some(GlobalAppCredentials {
        app_id: "global-app".to_owned(),
        app_secret: "global-secret".to_owned(),
    })
}

#[tokio::test]
async fn tenant_credentials_win_over_global() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();
    connect_tenant(&db, &vault, tenant, "tenant-app", "tenant-secret", "refresh-abc").await;

    let resolver = CredentialResolver::new(db, vault, global_pair());
    let creds = resolver.resolve(tenant).await.unwrap();

    assert_eq!(creds.source, CredentialSource::Tenant);
    assert_eq!(creds.app_id, "tenant-app");
    assert_eq!(creds.app_secret.as_str(), "tenant-secret");
    assert_eq!(creds.refresh_token.as_str(), "refresh-abc");
    assert_eq!(creds.marketplace_user_id.as_deref(), Some("market-user-1"));
}

#[tokio::test]
async fn global_fallback_applies_when_tenant_has_no_app_credentials() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();

    // Authorized through the operator's app: refresh token only, no
    // tenant-specific credential pair.
    let blob = vault.encrypt("refresh-xyz").unwrap();
    db.store_refresh_token(tenant, &blob, None).await.unwrap();

    let resolver = CredentialResolver::new(db, vault, global_pair());
    let creds = resolver.resolve(tenant).await.unwrap();

    assert_eq!(creds.source, CredentialSource::Global);
    assert_eq!(creds.app_id, "global-app");
    assert_eq!(creds.refresh_token.as_str(), "refresh-xyz");
}

#[tokio::test]
async fn no_credentials_anywhere_is_credentials_not_configured() {
    let db = test_database().await;
    let vault = test_vault();
    let resolver = CredentialResolver::new(db, vault, None);

    let err = resolver.resolve(TenantId::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CredentialsNotConfigured);
}

#[tokio::test]
async fn missing_refresh_token_is_not_connected() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();

    let blob = vault.encrypt("tenant-secret").unwrap();
    db.upsert_app_credentials(tenant, "tenant-app", &blob)
        .await
        .unwrap();

    let resolver = CredentialResolver::new(db, vault, None);
    let err = resolver.resolve(tenant).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotConnected);
}

#[tokio::test]
async fn global_credentials_without_authorization_is_not_connected() {
    let db = test_database().await;
    let vault = test_vault();
    let resolver = CredentialResolver::new(db, vault, global_pair());

    let err = resolver.resolve(TenantId::new()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotConnected);
}

#[tokio::test]
async fn malformed_tenant_secret_never_falls_back_to_global() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();

    // Corrupt ciphertext straight into storage.
    db.upsert_app_credentials(tenant, "tenant-app", "deadbeef")
        .await
        .unwrap();
    let blob = vault.encrypt("refresh-abc").unwrap();
    db.store_refresh_token(tenant, &blob, None).await.unwrap();

    let resolver = CredentialResolver::new(db, vault, global_pair());
    let err = resolver.resolve(tenant).await.unwrap_err();

    // Falling back here would authenticate under the wrong identity.
    assert_eq!(err.code(), ErrorCode::MalformedCiphertext);
}

#[tokio::test]
async fn legacy_tenant_secret_requires_migration_not_fallback() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();

    db.upsert_app_credentials(tenant, "tenant-app", "legacy:plain-old-secret")
        .await
        .unwrap();
    let blob = vault.encrypt("refresh-abc").unwrap();
    db.store_refresh_token(tenant, &blob, None).await.unwrap();

    let resolver = CredentialResolver::new(db, vault, global_pair());
    let err = resolver.resolve(tenant).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MigrationRequired);
}

#[tokio::test]
async fn malformed_refresh_token_is_reported_as_such() {
    let db = test_database().await;
    let vault = test_vault();
    let tenant = TenantId::new();

    let blob = vault.encrypt("tenant-secret").unwrap();
    db.upsert_app_credentials(tenant, "tenant-app", &blob)
        .await
        .unwrap();
    db.store_refresh_token(tenant, "not-a-blob", None)
        .await
        .unwrap();

    let resolver = CredentialResolver::new(db, vault, None);
    let err = resolver.resolve(tenant).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::MalformedCiphertext);
}

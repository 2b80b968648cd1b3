// ABOUTME: Main library entry point for the Quayside marketplace integration core
// ABOUTME: Provides credential lifecycle, token management, and hybrid listing aggregation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

#![deny(unsafe_code)]

//! # Quayside Marketplace Core
//!
//! Multi-tenant integration core for a marketplace that exposes three
//! incompatible API surfaces (a modern item-catalog API, a modern offer API,
//! and a legacy XML selling API) behind a single OAuth 2.0 identity.
//!
//! ## Features
//!
//! - **Per-tenant credentials**: each tenant owns marketplace application
//!   credentials, encrypted at rest and resolved with a tenant-first,
//!   operator-fallback policy
//! - **Silent token refresh**: short-lived access tokens are cached in memory
//!   and refreshed single-flight, never mid-call
//! - **Hybrid aggregation**: catalog, offer, and legacy statistics responses
//!   are merged into one unified record per listing
//! - **Rate-limit aware**: per-tenant request pacing and coalescing of
//!   identical in-flight calls keep the integration inside marketplace quotas
//!
//! ## Architecture
//!
//! The core is a library with no background scheduler of its own; periodic
//! invocation belongs to the caller. External collaborators talk to two
//! surfaces: [`connection::ConnectionService`] for credential lifecycle and
//! [`aggregation::HybridAggregationClient`] for unified listing data.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use quayside::config::environment::CoreConfig;
//! use quayside::context::CoreResources;
//! use quayside::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = CoreConfig::from_env()?;
//!     let core = CoreResources::initialize(config).await?;
//!
//!     let tenant = quayside::models::TenantId::new();
//!     let outcome = core.aggregation.fetch_all_listings(tenant).await?;
//!     println!("{} listings, {} partial failures",
//!              outcome.listings.len(), outcome.errors.len());
//!     Ok(())
//! }
//! ```

/// Configuration management (environment-only)
pub mod config;

/// Application constants and default values
pub mod constants;

/// Focused dependency injection context wiring the core together
pub mod context;

/// Unified error handling with machine-readable codes and remediation actions
pub mod errors;

/// Common data models for tenants, credentials, and unified listings
pub mod models;

/// Symmetric credential vault (AES-256-GCM, `nonceHex:cipherHex` blobs)
pub mod crypto;

/// Persistent storage for tenant credential records
pub mod database;

/// Tenant-first credential resolution with operator-wide fallback
pub mod credentials;

/// Access-token lifecycle: refresh exchange, caching, single-flight
pub mod token_service;

/// Request pacing per tenant/resource and in-flight request coalescing
pub mod rate_limiting;

/// Bounded exponential backoff for transient marketplace failures
pub mod retry;

/// Marketplace API clients (catalog, offers, legacy XML statistics)
pub mod marketplace;

/// Three-stage fetch and deterministic merge into unified listing records
pub mod aggregation;

/// Connection lifecycle surface exposed to external collaborators
pub mod connection;

pub use aggregation::{AggregationOutcome, HybridAggregationClient};
pub use connection::ConnectionService;
pub use errors::{AppError, AppResult, ErrorCode, RemediationAction};
pub use models::{TenantId, UnifiedListingRecord};
pub use token_service::TokenService;

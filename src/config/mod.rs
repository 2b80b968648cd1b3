// ABOUTME: Configuration module grouping environment-based settings
// ABOUTME: Re-exports the environment configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! Configuration management.
//!
//! Environment-only configuration: every setting comes from process
//! environment variables with defaults from [`crate::constants`]. There is
//! no configuration file.

/// Environment-based configuration loading and validation
pub mod environment;

pub use environment::{
    CacheSettings, CoreConfig, GlobalAppCredentials, MarketplaceConfig, RateLimitSettings,
    RetrySettings, TokenSettings,
};

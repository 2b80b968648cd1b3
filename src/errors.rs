// ABOUTME: Unified error handling system with machine-readable codes and remediation actions
// ABOUTME: Classifies failures as fatal, retryable, or partial for the aggregation pipeline
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Unified Error Handling
//!
//! Every failure in the core carries an [`ErrorCode`] with a stable string
//! form and a [`RemediationAction`] telling the caller what to do about it.
//! Fatal errors (auth/config) propagate unchanged; transient errors are
//! retried by [`crate::retry::RetryPolicy`] before surfacing; partial
//! failures are attached to otherwise successful aggregation results.
//!
//! [`AppError`] is `Clone` so that coalesced callers awaiting the same
//! in-flight request can all receive the leader's failure.

use std::time::Duration;

use serde::Serialize;

/// Result alias used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

/// Machine-readable error codes exposed to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No application credentials available at any tier.
    CredentialsNotConfigured,
    /// Tenant never completed marketplace authorization (no refresh token).
    NotConnected,
    /// Stored secret carries the legacy sentinel and must be re-entered.
    MigrationRequired,
    /// Stored secret is not a valid `nonceHex:cipherHex` blob or fails to
    /// authenticate under the vault key.
    MalformedCiphertext,
    /// The marketplace rejected the credentials (HTTP 400/401 on refresh).
    MarketplaceAuthFailed,
    /// Transient marketplace failure (HTTP 5xx or network error).
    MarketplaceUnavailable,
    /// The marketplace throttled the request (HTTP 429).
    RateLimited,
    /// One or more offer/statistics fetches failed inside an otherwise
    /// successful aggregation.
    PartialAggregationFailure,
    /// Process configuration is unusable (missing or invalid key, bad URL).
    ConfigurationError,
    /// Credential storage failure.
    DatabaseError,
    /// Caller-supplied input was rejected.
    InvalidInput,
    /// Unexpected internal failure.
    InternalError,
}

impl ErrorCode {
    /// Stable string form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CredentialsNotConfigured => "credentials_not_configured",
            Self::NotConnected => "not_connected",
            Self::MigrationRequired => "migration_required",
            Self::MalformedCiphertext => "malformed_ciphertext",
            Self::MarketplaceAuthFailed => "marketplace_auth_failed",
            Self::MarketplaceUnavailable => "marketplace_unavailable",
            Self::RateLimited => "rate_limited",
            Self::PartialAggregationFailure => "partial_aggregation_failure",
            Self::ConfigurationError => "configuration_error",
            Self::DatabaseError => "database_error",
            Self::InvalidInput => "invalid_input",
            Self::InternalError => "internal_error",
        }
    }

    /// Suggested remediation surfaced alongside the code.
    #[must_use]
    pub const fn remediation(self) -> RemediationAction {
        match self {
            Self::CredentialsNotConfigured => RemediationAction::ConfigureCredentials,
            Self::NotConnected => RemediationAction::Authorize,
            Self::MigrationRequired | Self::MalformedCiphertext | Self::MarketplaceAuthFailed => {
                RemediationAction::Reconnect
            }
            Self::MarketplaceUnavailable | Self::RateLimited => RemediationAction::RetryLater,
            Self::ConfigurationError => RemediationAction::FixConfiguration,
            Self::PartialAggregationFailure
            | Self::DatabaseError
            | Self::InvalidInput
            | Self::InternalError => RemediationAction::ContactOperator,
        }
    }

    /// Whether a failure with this code may be retried with backoff.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::MarketplaceUnavailable | Self::RateLimited)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Configure application credentials (tenant-specific or operator-wide).
    ConfigureCredentials,
    /// Complete the marketplace authorization flow.
    Authorize,
    /// Disconnect and re-run the authorization flow.
    Reconnect,
    /// Retry the operation later; the failure is transient.
    RetryLater,
    /// Fix process configuration and restart.
    FixConfiguration,
    /// No self-service remediation; escalate to the operator.
    ContactOperator,
}

impl RemediationAction {
    /// Stable string form of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigureCredentials => "configure_credentials",
            Self::Authorize => "authorize",
            Self::Reconnect => "reconnect",
            Self::RetryLater => "retry_later",
            Self::FixConfiguration => "fix_configuration",
            Self::ContactOperator => "contact_operator",
        }
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error carrying a code, a human-readable message, and an
/// optional server-provided retry-after hint.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    code: ErrorCode,
    message: String,
    retry_after: Option<Duration>,
}

impl AppError {
    /// Create an error with an explicit code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attach a server-provided retry-after hint (honored by the retry
    /// policy in preference to computed backoff).
    #[must_use]
    pub const fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// The machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Suggested remediation for this error.
    #[must_use]
    pub const fn remediation(&self) -> RemediationAction {
        self.code.remediation()
    }

    /// Whether the retry policy may re-attempt the failed operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Server-provided retry-after hint, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// No application credentials available at any tier.
    pub fn credentials_not_configured(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CredentialsNotConfigured, message)
    }

    /// Tenant has not completed authorization.
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotConnected, message)
    }

    /// Stored secret needs migration (legacy sentinel detected).
    pub fn migration_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MigrationRequired, message)
    }

    /// Stored secret is unreadable.
    pub fn malformed_ciphertext(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedCiphertext, message)
    }

    /// Marketplace rejected the credentials.
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MarketplaceAuthFailed, message)
    }

    /// Transient marketplace failure.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MarketplaceUnavailable, message)
    }

    /// Marketplace throttled the request.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimited, message)
    }

    /// Process configuration is unusable.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Credential storage failure.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Caller-supplied input was rejected.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Unexpected internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

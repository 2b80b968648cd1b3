// ABOUTME: Symmetric credential vault using AES-256-GCM with per-call random nonces
// ABOUTME: Produces and validates nonceHex:cipherHex blobs and detects legacy sentinels
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Credential Vault
//!
//! The single encryption module for the whole crate; no other module touches
//! the cipher. Secrets at rest are AES-256-GCM blobs in the form
//! `nonceHex:cipherHex` where the nonce is exactly 12 bytes (24 hex chars)
//! and the cipher half includes the GCM authentication tag.
//!
//! Blobs are validated by regex before any decrypt attempt. Blobs carrying
//! the legacy sentinel prefix (secrets stored before encryption was
//! introduced) fail with `MigrationRequired` and are treated as invalid
//! until the tenant reconnects.
//!
//! The vault key is process-wide immutable state, loaded once at startup; a
//! missing or wrong-length key fails construction fast with a configuration
//! error rather than silently degrading.

use std::sync::OnceLock;

use regex::Regex;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::{AppError, AppResult};

/// Required vault key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes; the hex-encoded nonce half of a blob is
/// exactly twice this.
pub const NONCE_LEN: usize = 12;

/// Prefix marking secrets stored before encryption was introduced.
/// Such blobs are unreadable by design; the tenant must reconnect.
pub const LEGACY_SENTINEL: &str = "legacy:";

/// Minimum hex length of the cipher half (GCM tag alone is 16 bytes).
const MIN_CIPHER_HEX_LEN: usize = 32;

static BLOB_RE: OnceLock<Regex> = OnceLock::new();

// Safe: pattern is a compile-time constant
#[allow(clippy::expect_used)]
fn blob_regex() -> &'static Regex {
    BLOB_RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{24}:[0-9a-fA-F]+$").expect("valid ciphertext blob pattern")
    })
}

/// Outcome of inspecting a stored blob without decrypting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFormat {
    /// Well-formed `nonceHex:cipherHex` blob.
    Valid,
    /// Carries the legacy sentinel; needs migration via reconnect.
    LegacySentinel,
    /// Not a recognizable vault blob.
    Malformed,
}

/// Symmetric encryption/decryption of secrets at rest.
///
/// Pure functions over a process-wide key; the vault holds no other state
/// and is safe to share behind an `Arc`.
pub struct CredentialVault {
    key: Vec<u8>,
    rng: SystemRandom,
}

impl CredentialVault {
    /// Create a vault over a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the key is not exactly 32 bytes.
    pub fn new(key: Vec<u8>) -> AppResult<Self> {
        if key.len() != KEY_LEN {
            return Err(AppError::config(format!(
                "Vault key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a plaintext into a `nonceHex:cipherHex` blob.
    ///
    /// A fresh random nonce is generated per call; a nonce is never reused,
    /// so two encryptions of the same plaintext never produce the same blob.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if nonce generation or encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|e| AppError::internal(format!("Failed to generate nonce: {e}")))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|e| AppError::internal(format!("Failed to create encryption key: {e}")))?;
        let key = LessSafeKey::new(unbound_key);

        let mut data = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut data)
            .map_err(|e| AppError::internal(format!("Failed to encrypt data: {e}")))?;

        Ok(format!("{}:{}", hex::encode(nonce_bytes), hex::encode(data)))
    }

    /// Decrypt a `nonceHex:cipherHex` blob back to plaintext.
    ///
    /// # Errors
    ///
    /// - `MigrationRequired` if the blob carries the legacy sentinel prefix
    /// - `MalformedCiphertext` if the blob fails format validation or does
    ///   not authenticate under the vault key
    pub fn decrypt(&self, blob: &str) -> AppResult<String> {
        match Self::inspect(blob) {
            BlobFormat::LegacySentinel => {
                return Err(AppError::migration_required(
                    "Stored secret predates encryption and must be re-entered",
                ));
            }
            BlobFormat::Malformed => {
                return Err(AppError::malformed_ciphertext(
                    "Stored secret is not a valid nonceHex:cipherHex blob",
                ));
            }
            BlobFormat::Valid => {}
        }

        // Format already validated; split cannot fail here.
        let (nonce_hex, cipher_hex) = blob.split_once(':').ok_or_else(|| {
            AppError::malformed_ciphertext("Stored secret is missing the nonce separator")
        })?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|e| AppError::malformed_ciphertext(format!("Invalid nonce hex: {e}")))?;
        let mut cipher_bytes = hex::decode(cipher_hex)
            .map_err(|e| AppError::malformed_ciphertext(format!("Invalid cipher hex: {e}")))?;

        let nonce_array: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| AppError::malformed_ciphertext("Nonce is not 12 bytes"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|e| AppError::internal(format!("Failed to create decryption key: {e}")))?;
        let key = LessSafeKey::new(unbound_key);

        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut cipher_bytes)
            .map_err(|_| {
                AppError::malformed_ciphertext(
                    "Stored secret does not authenticate under the vault key",
                )
            })?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::malformed_ciphertext(format!("Decrypted data is not UTF-8: {e}")))
    }

    /// Inspect a stored blob without attempting decryption.
    #[must_use]
    pub fn inspect(blob: &str) -> BlobFormat {
        if blob.starts_with(LEGACY_SENTINEL) {
            return BlobFormat::LegacySentinel;
        }
        if !blob_regex().is_match(blob) {
            return BlobFormat::Malformed;
        }
        // The regex guarantees the separator exists.
        let cipher_hex_len = blob.len() - (NONCE_LEN * 2) - 1;
        if cipher_hex_len < MIN_CIPHER_HEX_LEN || cipher_hex_len % 2 != 0 {
            return BlobFormat::Malformed;
        }
        BlobFormat::Valid
    }

    /// Whether a stored blob is a well-formed vault blob.
    #[must_use]
    pub fn matches_format(blob: &str) -> bool {
        Self::inspect(blob) == BlobFormat::Valid
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(vec![7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn round_trip() {
        let vault = vault();
        let long = "a".repeat(512);
        for plaintext in ["", "secret", "refresh-token-ζω-🔑", long.as_str()] {
            let blob = vault.encrypt(plaintext).unwrap();
            assert_eq!(vault.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn nonce_never_reused() {
        let vault = vault();
        let a = vault.encrypt("same plaintext").unwrap();
        let b = vault.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_ne!(a.split(':').next(), b.split(':').next());
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert!(CredentialVault::new(vec![0u8; 16]).is_err());
        assert!(CredentialVault::new(Vec::new()).is_err());
    }

    #[test]
    fn blob_without_separator_is_malformed() {
        let err = vault().decrypt("deadbeef").unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::MalformedCiphertext);
    }

    #[test]
    fn legacy_sentinel_requires_migration() {
        let err = vault().decrypt("legacy:old-plaintext-secret").unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::MigrationRequired);
    }

    #[test]
    fn tampered_cipher_is_malformed() {
        let vault = vault();
        let blob = vault.encrypt("secret").unwrap();
        let (nonce_hex, cipher_hex) = blob.split_once(':').unwrap();
        let mut flipped = cipher_hex.to_owned();
        let replacement = if flipped.starts_with('0') { "1" } else { "0" };
        flipped.replace_range(0..1, replacement);
        let err = vault.decrypt(&format!("{nonce_hex}:{flipped}")).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::MalformedCiphertext);
    }

    #[test]
    fn wrong_key_fails_to_authenticate() {
        let blob = vault().encrypt("secret").unwrap();
        let other = CredentialVault::new(vec![8u8; KEY_LEN]).unwrap();
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn inspect_classifies_blobs() {
        assert_eq!(CredentialVault::inspect("legacy:xyz"), BlobFormat::LegacySentinel);
        assert_eq!(CredentialVault::inspect("deadbeef"), BlobFormat::Malformed);
        assert_eq!(
            CredentialVault::inspect("zz:deadbeef"),
            BlobFormat::Malformed
        );
        // Nonce half must be exactly 24 hex chars
        assert_eq!(
            CredentialVault::inspect(&format!("{}:{}", "ab".repeat(11), "cd".repeat(20))),
            BlobFormat::Malformed
        );
        let valid = vault().encrypt("x").unwrap();
        assert_eq!(CredentialVault::inspect(&valid), BlobFormat::Valid);
    }
}

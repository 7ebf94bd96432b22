//! Opaque token generation, hashing and lifecycle.
//!
//! Flow Overview:
//! 1) Draw random bytes from the OS CSPRNG and encode them as unpadded URL-safe base64.
//! 2) Hash the encoded plaintext with SHA-256; only the hash is ever persisted.
//! 3) Lookups recompute the hash and match on hash, scope and expiry in one query,
//!    so unknown, expired and wrong-scope tokens all come back as `None`.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Duration};
use tracing::debug;
use uuid::Uuid;

use super::identity::{TokenScope, User};
use super::storage::TokenStore;

pub const MIN_TOKEN_ENTROPY_BYTES: usize = 16;
pub const DEFAULT_TOKEN_ENTROPY_BYTES: usize = 32;
const TOKEN_ALPHABET: &str = r"^[A-Za-z0-9_-]+$";

#[derive(Debug, thiserror::Error)]
pub enum TokenCodecError {
    #[error("token entropy must be at least {MIN_TOKEN_ENTROPY_BYTES} bytes, got {0}")]
    InsufficientEntropy(usize),
    #[error("failed to build token shape pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to read from the OS random source: {0}")]
    Random(#[from] rand::Error),
}

/// Generates plaintext tokens and checks the shape of presented ones.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    entropy_bytes: usize,
    alphabet: Regex,
}

impl TokenCodec {
    /// # Errors
    /// Returns an error if `entropy_bytes` is below [`MIN_TOKEN_ENTROPY_BYTES`].
    pub fn new(entropy_bytes: usize) -> Result<Self, TokenCodecError> {
        if entropy_bytes < MIN_TOKEN_ENTROPY_BYTES {
            return Err(TokenCodecError::InsufficientEntropy(entropy_bytes));
        }

        Ok(Self {
            entropy_bytes,
            alphabet: Regex::new(TOKEN_ALPHABET)?,
        })
    }

    #[must_use]
    pub fn entropy_bytes(&self) -> usize {
        self.entropy_bytes
    }

    /// Length of every plaintext this codec produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        (self.entropy_bytes * 4).div_ceil(3)
    }

    /// Generate a fresh plaintext token.
    ///
    /// # Errors
    /// Returns an error if the OS random source is unavailable.
    pub fn generate(&self) -> Result<SecretString, TokenCodecError> {
        let mut bytes = vec![0u8; self.entropy_bytes];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(SecretString::from(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Whether `candidate` could have been produced by this codec. Runs before
    /// any store lookup.
    #[must_use]
    pub fn is_well_formed(&self, candidate: &str) -> bool {
        candidate.len() == self.encoded_len() && self.alphabet.is_match(candidate)
    }
}

/// SHA-256 of the plaintext token, used as the storage and lookup key.
#[must_use]
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Persisted half of a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: Uuid,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl TokenRecord {
    #[must_use]
    pub fn is_valid_for(&self, scope: TokenScope, now: DateTime<Utc>) -> bool {
        self.scope == scope && now < self.expiry
    }
}

/// Result of issuing a token. The plaintext is handed to the caller once and
/// never stored.
#[derive(Debug)]
pub struct IssuedToken {
    pub plaintext: SecretString,
    pub record: TokenRecord,
}

/// Token lifecycle on top of a [`TokenStore`].
#[derive(Clone)]
pub struct Tokens {
    codec: TokenCodec,
    store: Arc<dyn TokenStore>,
}

impl Tokens {
    #[must_use]
    pub fn new(codec: TokenCodec, store: Arc<dyn TokenStore>) -> Self {
        Self { codec, store }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Generate a token for `user_id`, persist its hash and return the plaintext.
    ///
    /// # Errors
    /// Returns an error if randomness is unavailable, the ttl is out of range,
    /// or the store rejects the insert.
    pub async fn issue(&self, user_id: Uuid, ttl: Duration, scope: TokenScope) -> Result<IssuedToken> {
        let plaintext = self.codec.generate()?;
        let ttl = chrono::Duration::from_std(ttl).context("Token TTL out of range")?;
        let expiry = Utc::now()
            .checked_add_signed(ttl)
            .context("Token expiry overflows")?;

        let record = TokenRecord {
            hash: hash_token(plaintext.expose_secret()),
            user_id,
            expiry,
            scope,
        };

        self.store
            .insert(&record)
            .await
            .context("Failed to persist token")?;

        debug!(%user_id, %scope, "issued token");

        Ok(IssuedToken { plaintext, record })
    }

    /// Remove every token of `scope` belonging to `user_id`.
    ///
    /// # Errors
    /// Returns an error if the store call fails.
    pub async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<u64> {
        self.store.delete_all_for_user(scope, user_id).await
    }

    /// Resolve a plaintext token to its user. Unknown, expired and wrong-scope
    /// tokens all yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error only when the store itself fails.
    pub async fn user_for_token(&self, scope: TokenScope, plaintext: &str) -> Result<Option<User>> {
        let hash = hash_token(plaintext);
        self.store.user_for_token_hash(scope, &hash).await
    }
}

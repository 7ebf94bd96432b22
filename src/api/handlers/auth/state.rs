//! Access pipeline configuration and shared state.

use std::sync::Arc;
use std::time::Duration;

use super::identity::TokenScope;
use super::rate_limit::RateLimiter;
use super::storage::{PermissionStore, Store, UserStore};
use super::token::{DEFAULT_TOKEN_ENTROPY_BYTES, TokenCodec, TokenCodecError, Tokens};

const DEFAULT_AUTHENTICATION_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_ACTIVATION_TOKEN_TTL_SECONDS: u64 = 3 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    authentication_token_ttl_seconds: u64,
    activation_token_ttl_seconds: u64,
    token_entropy_bytes: usize,
    trust_proxy_headers: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            authentication_token_ttl_seconds: DEFAULT_AUTHENTICATION_TOKEN_TTL_SECONDS,
            activation_token_ttl_seconds: DEFAULT_ACTIVATION_TOKEN_TTL_SECONDS,
            token_entropy_bytes: DEFAULT_TOKEN_ENTROPY_BYTES,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_authentication_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.authentication_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_activation_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.activation_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_entropy_bytes(mut self, bytes: usize) -> Self {
        self.token_entropy_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn token_ttl(&self, scope: TokenScope) -> Duration {
        match scope {
            TokenScope::Authentication => {
                Duration::from_secs(self.authentication_token_ttl_seconds)
            }
            TokenScope::Activation => Duration::from_secs(self.activation_token_ttl_seconds),
        }
    }

    #[must_use]
    pub fn token_entropy_bytes(&self) -> usize {
        self.token_entropy_bytes
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the pipeline middleware and handlers share.
#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    tokens: Tokens,
    permissions: Arc<dyn PermissionStore>,
    users: Arc<dyn UserStore>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the configured token entropy is too low.
    pub fn new<S>(
        config: AuthConfig,
        store: Arc<S>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self, TokenCodecError>
    where
        S: Store + 'static,
    {
        let codec = TokenCodec::new(config.token_entropy_bytes())?;
        Ok(Self {
            config,
            tokens: Tokens::new(codec, store.clone()),
            permissions: store.clone(),
            users: store,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    #[must_use]
    pub fn permissions(&self) -> &dyn PermissionStore {
        self.permissions.as_ref()
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{memory::MemoryStore, rate_limit::NoopRateLimiter};

    #[test]
    fn auth_config_defaults() {
        let config = AuthConfig::new();
        assert_eq!(
            config.token_ttl(TokenScope::Authentication),
            Duration::from_secs(86_400)
        );
        assert_eq!(
            config.token_ttl(TokenScope::Activation),
            Duration::from_secs(259_200)
        );
        assert_eq!(config.token_entropy_bytes(), 32);
        assert!(!config.trust_proxy_headers());
    }

    #[test]
    fn auth_config_builders() {
        let config = AuthConfig::new()
            .with_authentication_token_ttl_seconds(60)
            .with_activation_token_ttl_seconds(120)
            .with_token_entropy_bytes(24)
            .with_trust_proxy_headers(true);
        assert_eq!(
            config.token_ttl(TokenScope::Authentication),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.token_ttl(TokenScope::Activation),
            Duration::from_secs(120)
        );
        assert_eq!(config.token_entropy_bytes(), 24);
        assert!(config.trust_proxy_headers());
    }

    #[test]
    fn auth_state_rejects_low_entropy() {
        let result = AuthState::new(
            AuthConfig::new().with_token_entropy_bytes(8),
            Arc::new(MemoryStore::default()),
            Arc::new(NoopRateLimiter),
        );
        assert!(matches!(
            result,
            Err(TokenCodecError::InsufficientEntropy(8))
        ));
    }
}

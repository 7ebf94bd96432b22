use crate::{
    api::{
        self,
        handlers::auth::{IssuedToken, PgStore, TokenCodec, TokenScope, TokenStore, Tokens},
    },
    cli::commands::auth,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub user_id: Uuid,
    pub scope: TokenScope,
    pub ttl_seconds: Option<u64>,
    pub auth: auth::Options,
}

impl Args {
    fn ttl(&self) -> Duration {
        let seconds = self.ttl_seconds.unwrap_or(match self.scope {
            TokenScope::Authentication => self.auth.authentication_token_ttl_seconds,
            TokenScope::Activation => self.auth.activation_token_ttl_seconds,
        });
        Duration::from_secs(seconds)
    }
}

/// Issue a token through `store` as described by `args`.
///
/// # Errors
/// Returns an error if the entropy setting is invalid or the store fails.
pub async fn issue(args: &Args, store: Arc<dyn TokenStore>) -> Result<IssuedToken> {
    let codec =
        TokenCodec::new(args.auth.token_entropy_bytes).context("Invalid token configuration")?;
    Tokens::new(codec, store)
        .issue(args.user_id, args.ttl(), args.scope)
        .await
}

/// Execute the token action. The plaintext is printed once and never stored.
/// # Errors
/// Returns an error if the database is unreachable or the token cannot be stored.
pub async fn execute(args: Args) -> Result<()> {
    let pool = api::connect(&args.dsn).await?;
    let issued = issue(&args, Arc::new(PgStore::new(pool))).await?;

    info!(user_id = %args.user_id, scope = %args.scope, expiry = %issued.record.expiry, "token issued");

    println!("{}", issued.plaintext.expose_secret());

    Ok(())
}

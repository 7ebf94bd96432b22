use crate::api::{
    self,
    handlers::auth::{Permission, PermissionStore, PgStore},
};
use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub user_id: Uuid,
    pub permissions: Vec<Permission>,
}

/// Grant `args.permissions` through `store`. Existing grants are kept.
/// # Errors
/// Returns an error if the store fails.
pub async fn grant(args: &Args, store: &dyn PermissionStore) -> Result<()> {
    store
        .add_for_user(args.user_id, &args.permissions)
        .await
        .with_context(|| format!("Failed to grant permissions to {}", args.user_id))
}

/// Execute the grant action.
/// # Errors
/// Returns an error if the database is unreachable or the grant fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = api::connect(&args.dsn).await?;
    grant(&args, &PgStore::new(pool)).await?;

    let codes: Vec<&str> = args.permissions.iter().map(|p| p.code()).collect();
    info!(user_id = %args.user_id, permissions = ?codes, "permissions granted");

    Ok(())
}

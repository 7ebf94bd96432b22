//! Store contracts for tokens, permissions and users, plus the Postgres backend.
//!
//! Token rows are keyed by the SHA-256 hash of the plaintext. The lookup query
//! matches hash, scope and expiry together so the three failure cases collapse
//! into one empty result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::identity::{Permission, PermissionSet, TokenScope, User};
use super::token::TokenRecord;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: &TokenRecord) -> Result<()>;

    /// Remove all tokens of `scope` for `user_id`, returning how many were removed.
    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<u64>;

    /// Resolve a token hash to its user when the token exists, has `scope` and
    /// has not expired.
    async fn user_for_token_hash(&self, scope: TokenScope, hash: &[u8]) -> Result<Option<User>>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for_user(&self, user_id: Uuid) -> Result<PermissionSet>;

    async fn add_for_user(&self, user_id: Uuid, permissions: &[Permission]) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated(User),
    /// The stored version no longer matches the one the caller read.
    EditConflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Mark `user` activated if its stored version still equals `user.version`.
    async fn activate(&self, user: &User) -> Result<ActivationOutcome>;

    async fn ping(&self) -> Result<()>;
}

/// Everything the access pipeline needs from persistence.
pub trait Store: TokenStore + PermissionStore + UserStore {}

impl<T> Store for T where T: TokenStore + PermissionStore + UserStore {}

/// Postgres-backed store. Schema lives in `sql/schema.sql`.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, record: &TokenRecord) -> Result<()> {
        let query = r"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = "insert_token"
        );

        sqlx::query(query)
            .bind(&record.hash)
            .bind(record.user_id)
            .bind(record.expiry)
            .bind(record.scope.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert token")?;

        Ok(())
    }

    async fn delete_all_for_user(&self, scope: TokenScope, user_id: Uuid) -> Result<u64> {
        let query = r"
            DELETE FROM tokens
            WHERE scope = $1 AND user_id = $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = "delete_tokens_for_user"
        );

        let result = sqlx::query(query)
            .bind(scope.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete tokens")?;

        Ok(result.rows_affected())
    }

    async fn user_for_token_hash(&self, scope: TokenScope, hash: &[u8]) -> Result<Option<User>> {
        let query = r"
            SELECT users.id, users.name, users.email, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
              AND tokens.scope = $2
              AND tokens.expiry > $3
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = "user_for_token"
        );
        let now: DateTime<Utc> = Utc::now();

        let row = sqlx::query(query)
            .bind(hash)
            .bind(scope.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up token")?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn permissions_for_user(&self, user_id: Uuid) -> Result<PermissionSet> {
        let query = r"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = "permissions_for_user"
        );

        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load permissions")?;

        let codes = rows
            .iter()
            .map(|row| row.try_get::<String, _>("code"))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to decode permission code")?;

        Ok(PermissionSet::from_codes(codes))
    }

    async fn add_for_user(&self, user_id: Uuid, permissions: &[Permission]) -> Result<()> {
        let query = r"
            INSERT INTO users_permissions (user_id, permission_id)
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = "grant_permissions"
        );
        let codes: Vec<String> = permissions.iter().map(ToString::to_string).collect();

        sqlx::query(query)
            .bind(user_id)
            .bind(codes)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to grant permissions")?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn activate(&self, user: &User) -> Result<ActivationOutcome> {
        let query = r"
            UPDATE users
            SET activated = true, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING id, name, email, activated, version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = "activate_user"
        );

        let row = sqlx::query(query)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to activate user")?;

        match row {
            Some(row) => Ok(ActivationOutcome::Activated(user_from_row(&row)?)),
            None => Ok(ActivationOutcome::EditConflict),
        }
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

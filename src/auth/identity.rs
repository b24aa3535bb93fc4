//! Mapping external identities to local users.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::LocalUser;
use crate::common::{now_timestamp, safe_email_log};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A concurrent sign-in inserted the same identity first.
    #[error("identity already exists")]
    DuplicateIdentity,

    #[error("user store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("identity resolution task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Looks up or creates the [`LocalUser`] for a (provider, provider user id) pair.
#[derive(Clone)]
pub struct IdentityResolver {
    db: SqlitePool,
}

impl IdentityResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Returns the user for this identity, creating it on first sight.
    ///
    /// Lookup and creation share one write transaction. If another writer
    /// still wins the insert, the unique index rejects ours and the lookup
    /// path is retried once.
    pub async fn resolve(
        &self,
        provider: &str,
        provider_user_id: &str,
        email: Option<&str>,
    ) -> Result<LocalUser, ResolveError> {
        retry_on_duplicate(provider, provider_user_id, || {
            let db = self.db.clone();
            let provider = provider.to_owned();
            let provider_user_id = provider_user_id.to_owned();
            let email = email.map(str::to_owned);
            async move {
                // Detached so a dropped request never hands a connection with
                // an open transaction back to the pool.
                tokio::spawn(async move {
                    resolve_once(&db, &provider, &provider_user_id, email.as_deref()).await
                })
                .await?
            }
        })
        .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<LocalUser>, sqlx::Error> {
        sqlx::query_as::<_, LocalUser>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await
    }
}

async fn retry_on_duplicate<F, Fut>(
    provider: &str,
    provider_user_id: &str,
    mut attempt: F,
) -> Result<LocalUser, ResolveError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<LocalUser, ResolveError>>,
{
    match attempt().await {
        Err(ResolveError::DuplicateIdentity) => {
            warn!(
                provider = %provider,
                provider_user_id = %provider_user_id,
                "Concurrent creation of the same identity, retrying lookup"
            );
            attempt().await
        }
        other => other,
    }
}

/// One lookup-or-create inside `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the lookup, so a concurrent first sign-in
/// waits (up to the busy timeout) and then sees the committed row instead of
/// failing on a stale read snapshot.
async fn resolve_once(
    db: &SqlitePool,
    provider: &str,
    provider_user_id: &str,
    email: Option<&str>,
) -> Result<LocalUser, ResolveError> {
    let mut conn = db.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let result = match lookup_or_create(&mut conn, provider, provider_user_id, email).await {
        Ok(user) => sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map(|_| user)
            .map_err(ResolveError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        rollback(conn).await;
    }
    result
}

async fn rollback(mut conn: PoolConnection<Sqlite>) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        // Never return a connection in an unknown transaction state.
        warn!(error = %e, "Rollback failed, discarding connection");
        drop(conn.detach());
    }
}

async fn lookup_or_create(
    conn: &mut SqliteConnection,
    provider: &str,
    provider_user_id: &str,
    email: Option<&str>,
) -> Result<LocalUser, ResolveError> {
    let now = now_timestamp();

    match find_by_identity(conn, provider, provider_user_id).await? {
        Some(mut user) => {
            touch_user(conn, &user.id, &now).await?;
            user.updated_at = now;
            debug!(user_id = %user.id, provider = %provider, "Found existing user");
            Ok(user)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            insert_user(conn, &id, provider, provider_user_id, email, &now).await?;
            let user = find_by_id(conn, &id).await?;
            info!(
                user_id = %user.id,
                provider = %provider,
                email = %email.map(safe_email_log).unwrap_or_default(),
                "Created new user for external identity"
            );
            Ok(user)
        }
    }
}

async fn find_by_identity(
    conn: &mut SqliteConnection,
    provider: &str,
    provider_user_id: &str,
) -> Result<Option<LocalUser>, sqlx::Error> {
    sqlx::query_as::<_, LocalUser>(
        "SELECT * FROM users WHERE provider = ? AND provider_user_id = ?",
    )
    .bind(provider)
    .bind(provider_user_id)
    .fetch_optional(conn)
    .await
}

async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> Result<LocalUser, sqlx::Error> {
    sqlx::query_as::<_, LocalUser>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await
}

async fn touch_user(conn: &mut SqliteConnection, id: &str, now: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_user(
    conn: &mut SqliteConnection,
    id: &str,
    provider: &str,
    provider_user_id: &str,
    email: Option<&str>,
    now: &str,
) -> Result<(), ResolveError> {
    sqlx::query(
        "INSERT INTO users (id, provider, provider_user_id, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provider)
    .bind(provider_user_id)
    .bind(email)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => ResolveError::DuplicateIdentity,
        other => {
            error!(error = %other, provider = %provider, "Database error inserting new user");
            ResolveError::Store(other)
        }
    })?;
    Ok(())
}

//! PostgreSQL persistence for accounts and identities.
//!
//! Reads run against the pool; writes that must be atomic take an open
//! transaction so the reconciler controls commit boundaries.

use service_core::error::AppError;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};

use crate::models::{Account, Identity, IdentityProvider};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn map_sqlx(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            tracing::debug!(detail = %db_err.message(), "Unique constraint violated");
            return AppError::conflict("conflict", anyhow::anyhow!("Resource already exists"));
        }
    }
    AppError::DatabaseError(anyhow::anyhow!(e))
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    /// Open a transaction; dropped uncommitted means rolled back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(map_sqlx)
    }

    pub async fn commit(&self, tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
        tx.commit().await.map_err(map_sqlx)
    }

    // ==================== Account Operations ====================

    pub async fn account_exists(&self, email: &str) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM account WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(count > 0)
    }

    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM account WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    pub async fn find_account_by_iid(&self, iid: i64) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM account WHERE iid = $1")
            .bind(iid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    /// Insert inside an open transaction; the generated iid comes back.
    pub async fn insert_account(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        account: &Account,
    ) -> Result<i64, AppError> {
        let iid: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO account (email, type, summary, area_of_expertise, certifications, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING iid
            "#,
        )
        .bind(&account.email)
        .bind(&account.types)
        .bind(&account.summary)
        .bind(&account.area_of_expertise)
        .bind(&account.certifications)
        .bind(account.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(iid)
    }

    /// Persist profile fields and the type set.
    pub async fn update_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE account
            SET type = $1, summary = $2, area_of_expertise = $3, certifications = $4
            WHERE iid = $5
            "#,
        )
        .bind(&account.types)
        .bind(&account.summary)
        .bind(&account.area_of_expertise)
        .bind(&account.certifications)
        .bind(account.iid)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    pub async fn update_account_types(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        iid: i64,
        types: &[String],
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE account SET type = $1 WHERE iid = $2")
            .bind(types)
            .bind(iid)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    // ==================== Identity Operations ====================

    pub async fn find_identity(
        &self,
        provider: IdentityProvider,
        uid: &str,
    ) -> Result<Option<Identity>, AppError> {
        sqlx::query_as::<_, Identity>("SELECT * FROM identity WHERE provider = $1 AND uid = $2")
            .bind(provider.as_str())
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    pub async fn insert_identity(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        identity: &Identity,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO identity (provider, uid, pw_hash, confirmed_at, account_iid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&identity.provider)
        .bind(&identity.uid)
        .bind(&identity.pw_hash)
        .bind(identity.confirmed_at)
        .bind(identity.account_iid)
        .bind(identity.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    /// Idempotent link: the unique (provider, uid) constraint arbitrates
    /// concurrent inserts, not an application-level check. Returns whether
    /// a row was actually written.
    pub async fn insert_identity_if_new(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        identity: &Identity,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO identity (provider, uid, pw_hash, confirmed_at, account_iid, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider, uid) DO NOTHING
            "#,
        )
        .bind(&identity.provider)
        .bind(&identity.uid)
        .bind(&identity.pw_hash)
        .bind(identity.confirmed_at)
        .bind(identity.account_iid)
        .bind(identity.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

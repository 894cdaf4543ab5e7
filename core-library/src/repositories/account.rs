//! Account binding persistence.

use crate::error::Result;
use crate::models::{Account, LocalAccountId};
use async_trait::async_trait;
use bridge_traits::ExternalAccountId;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Whether an upsert created or replaced a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert or replace the binding of `local_id`.
    ///
    /// `now` is unix millis; it becomes `created_at` for a new row and
    /// `updated_at` in both cases.
    async fn upsert(
        &self,
        local_id: &LocalAccountId,
        external_id: ExternalAccountId,
        encrypted_token: &[u8],
        now: i64,
    ) -> Result<UpsertOutcome>;

    async fn find(&self, local_id: &LocalAccountId) -> Result<Option<Account>>;

    /// Returns `true` when a binding was removed.
    async fn delete(&self, local_id: &LocalAccountId) -> Result<bool>;

    /// Every bound account, oldest binding first.
    async fn list_bound(&self) -> Result<Vec<Account>>;

    async fn mark_synced(&self, local_id: &LocalAccountId, at: i64) -> Result<()>;

    async fn count(&self) -> Result<u64>;
}

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    local_id: String,
    external_id: i64,
    encrypted_token: Vec<u8>,
    last_synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            local_id: LocalAccountId::new(row.local_id),
            external_id: ExternalAccountId::new(row.external_id),
            encrypted_token: row.encrypted_token,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    #[instrument(skip(self, encrypted_token), fields(local_id = %local_id))]
    async fn upsert(
        &self,
        local_id: &LocalAccountId,
        external_id: ExternalAccountId,
        encrypted_token: &[u8],
        now: i64,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE accounts SET external_id = ?, encrypted_token = ?, updated_at = ?
            WHERE local_id = ?
            "#,
        )
        .bind(external_id.as_i64())
        .bind(encrypted_token)
        .bind(now)
        .bind(local_id.as_str())
        .execute(&mut *tx)
        .await?;

        let outcome = if updated.rows_affected() > 0 {
            UpsertOutcome::Updated
        } else {
            sqlx::query(
                r#"
                INSERT INTO accounts (local_id, external_id, encrypted_token, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(local_id.as_str())
            .bind(external_id.as_i64())
            .bind(encrypted_token)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Created
        };

        tx.commit().await?;
        debug!(outcome = ?outcome, "Account binding stored");
        Ok(outcome)
    }

    async fn find(&self, local_id: &LocalAccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT local_id, external_id, encrypted_token, last_synced_at, created_at, updated_at
            FROM accounts
            WHERE local_id = ?
            "#,
        )
        .bind(local_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    async fn delete(&self, local_id: &LocalAccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE local_id = ?")
            .bind(local_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_bound(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT local_id, external_id, encrypted_token, last_synced_at, created_at, updated_at
            FROM accounts
            ORDER BY created_at ASC, local_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn mark_synced(&self, local_id: &LocalAccountId, at: i64) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_synced_at = ? WHERE local_id = ?")
            .bind(at)
            .bind(local_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

//! Postgres-backed account + history store.
//!
//! Every atomic unit is one database transaction. The row lock is a
//! `SELECT ... FOR UPDATE` on the account row, so concurrent units on the same
//! account serialize while units on other accounts proceed.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate(field)` | Account number, NIK or phone number already taken |
//! | Database (lock not available) | `55P03` | `Timeout` | `lock_timeout` elapsed while waiting for a row lock |
//! | Database (query canceled) | `57014` | `Timeout` | `statement_timeout` elapsed |
//! | Database (other) | Any other | `Unavailable` | Constraint or server failure |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` | No connection could be used |
//! | ColumnDecode / Decode | N/A | `Corrupt` | Stored value does not fit the domain type |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use teller_accounts::{
    AccountDirectory, AccountHolder, DUPLICATE_ACCOUNT_NUMBER, DUPLICATE_NIK, DUPLICATE_PHONE_NUMBER,
    NewAccount,
};
use teller_core::{AccountId, Amount, Balance};
use teller_ledger::{
    Account, AccountNumber, EntryId, EntryKind, LedgerEntry, LedgerStore, LedgerUnit, LockedAccount,
    NewLedgerEntry, StoreError,
};

use crate::config::DatabaseConfig;

/// Postgres-backed account + history store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout,
        }
    }

    /// Connect with the configured pool size and apply pending migrations.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options.clone())
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool, config.lock_timeout);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One database transaction. Dropping it without commit rolls it back.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PostgresUnit {
    #[instrument(skip(self), fields(account_number = %number), err)]
    async fn lock_account_for_update(
        &mut self,
        number: &AccountNumber,
    ) -> Result<Option<LockedAccount>, StoreError> {
        let row = sqlx::query("SELECT id, balance FROM accounts WHERE account_number = $1 FOR UPDATE")
            .bind(number.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_account", e))?;

        row.map(|row| {
            Ok(LockedAccount {
                id: AccountId::from_uuid(row.try_get("id").map_err(|e| map_sqlx_error("lock_account", e))?),
                balance: decode_balance(&row)?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn set_balance(&mut self, account_id: AccountId, balance: Balance) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(account_id.as_uuid())
            .bind(balance.value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Corrupt(format!("account {account_id} vanished while locked")));
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(account_id = %entry.account_id, kind = %entry.kind), err)]
    async fn append_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries (account_id, kind, amount, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(entry.account_id.as_uuid())
        .bind(entry.kind.as_str())
        .bind(entry.amount.value())
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_entry", e))?;

        Ok(LedgerEntry::from_new(EntryId(id), entry))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Unit = PostgresUnit;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        // SET does not accept bind parameters; the value is an integer we own.
        let millis = self.lock_timeout.as_millis();
        for setting in ["lock_timeout", "statement_timeout"] {
            sqlx::query(&format!("SET LOCAL {setting} = {millis}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("begin", e))?;
        }

        Ok(PostgresUnit { tx })
    }

    #[instrument(skip(self), fields(account_number = %number), err)]
    async fn find_account(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT id, account_number, balance, created_at FROM accounts WHERE account_number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_account", e))?;

        row.as_ref().map(decode_account).transpose()
    }

    #[instrument(skip(self), fields(account_number = %number), err)]
    async fn account_history(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("account_history", e))?;

        // Account row and entries must come from the same snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("account_history", e))?;

        let account = sqlx::query(
            "SELECT id, account_number, balance, created_at FROM accounts WHERE account_number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("account_history", e))?;

        let Some(account) = account.as_ref().map(decode_account).transpose()? else {
            tx.rollback().await.map_err(|e| map_sqlx_error("account_history", e))?;
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT id, account_id, kind, amount, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(account.id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("account_history", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("account_history", e))?;

        let entries = rows.iter().map(decode_entry).collect::<Result<Vec<_>, _>>()?;
        Ok(Some((account, entries)))
    }
}

#[async_trait]
impl AccountDirectory for PostgresLedgerStore {
    #[instrument(skip(self, holder), err)]
    async fn holder_exists(&self, holder: &AccountHolder) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE nik = $1 OR phone_number = $2)")
            .bind(holder.nik.as_str())
            .bind(holder.phone_number.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("holder_exists", e))
    }

    #[instrument(skip(self, account), fields(account_number = %account.number), err)]
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_number, nik, phone_number, balance, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.number.as_str())
        .bind(account.holder.nik.as_str())
        .bind(account.holder.phone_number.as_str())
        .bind(account.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_account", e))?;

        Ok(Account {
            id: account.id,
            number: account.number,
            balance: Balance::ZERO,
            created_at: account.created_at,
        })
    }
}

fn decode_balance(row: &PgRow) -> Result<Balance, StoreError> {
    let value: Decimal = row.try_get("balance").map_err(|e| map_sqlx_error("decode", e))?;
    Balance::new(value).map_err(|e| StoreError::Corrupt(format!("balance: {e}")))
}

fn decode_account(row: &PgRow) -> Result<Account, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("decode", e))?;
    let number: String = row
        .try_get("account_number")
        .map_err(|e| map_sqlx_error("decode", e))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| map_sqlx_error("decode", e))?;

    Ok(Account {
        id: AccountId::from_uuid(id),
        number: AccountNumber::new(number).map_err(|e| StoreError::Corrupt(format!("account_number: {e}")))?,
        balance: decode_balance(row)?,
        created_at,
    })
}

fn decode_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("decode", e))?;
    let account_id: Uuid = row.try_get("account_id").map_err(|e| map_sqlx_error("decode", e))?;
    let kind: String = row.try_get("kind").map_err(|e| map_sqlx_error("decode", e))?;
    let amount: Decimal = row.try_get("amount").map_err(|e| map_sqlx_error("decode", e))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| map_sqlx_error("decode", e))?;

    Ok(LedgerEntry {
        id: EntryId(id),
        account_id: AccountId::from_uuid(account_id),
        kind: kind.parse::<EntryKind>().map_err(StoreError::Corrupt)?,
        amount: Amount::new(amount).map_err(|e| StoreError::Corrupt(format!("amount: {e}")))?,
        created_at,
    })
}

/// Map a SQLx error to a `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(duplicate_field(db_err.constraint()).to_string()),
                Some("55P03") | Some("57014") => StoreError::Timeout(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("undecodable row in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Field name for a unique constraint, as reported to registration.
fn duplicate_field(constraint: Option<&str>) -> &str {
    match constraint {
        Some("accounts_account_number_key") => DUPLICATE_ACCOUNT_NUMBER,
        Some("accounts_nik_key") => DUPLICATE_NIK,
        Some("accounts_phone_number_key") => DUPLICATE_PHONE_NUMBER,
        Some(other) => other,
        None => "unknown",
    }
}

//! Cash register sessions (caixa) and entries (lançamentos).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use pizzaria_core::cash::{CashEntry, CashSummary};
use pizzaria_core::{
    CashEntryKind, CashRegisterId, CashRegisterStatus, Money, OrderId, PaymentMethod,
};

use super::{RepositoryError, conflict_on_unique, query_with_retry};

const REGISTER_COLUMNS: &str = "id, status, opening_balance, expected_balance, counted_balance, \
                                difference, opened_by, closed_by, notes, opened_at, closed_at";
const ENTRY_COLUMNS: &str = "id, kind, payment_method, amount, description, order_id, created_at";

/// A register session.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CashRegister {
    pub id: CashRegisterId,
    pub status: CashRegisterStatus,
    pub opening_balance: Money,
    /// Set when closed.
    pub expected_balance: Option<Money>,
    /// Set when closed.
    pub counted_balance: Option<Money>,
    /// `counted - expected`, set when closed.
    pub difference: Option<Money>,
    pub opened_by: String,
    pub closed_by: Option<String>,
    pub notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A new entry, validated by the caller.
#[derive(Debug, Clone)]
pub struct NewCashEntry<'a> {
    pub kind: CashEntryKind,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub description: Option<&'a str>,
    pub order_id: Option<OrderId>,
    pub created_by: &'a str,
}

/// Repository for the cash register.
pub struct CashRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CashRepository<'a> {
    /// Create a new cash repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The open session, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn current(&self) -> Result<Option<CashRegister>, RepositoryError> {
        let sql = format!("SELECT {REGISTER_COLUMNS} FROM cash_register WHERE status = 'aberto'");
        query_with_retry(|| sqlx::query_as::<_, CashRegister>(&sql).fetch_optional(self.pool)).await
    }

    /// A session by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn get(&self, id: CashRegisterId) -> Result<Option<CashRegister>, RepositoryError> {
        let sql = format!("SELECT {REGISTER_COLUMNS} FROM cash_register WHERE id = $1");
        query_with_retry(|| {
            sqlx::query_as::<_, CashRegister>(&sql)
                .bind(id)
                .fetch_optional(self.pool)
        })
        .await
    }

    /// Most recent sessions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn history(&self, limit: i64) -> Result<Vec<CashRegister>, RepositoryError> {
        let sql = format!(
            "SELECT {REGISTER_COLUMNS} FROM cash_register ORDER BY opened_at DESC LIMIT $1"
        );
        query_with_retry(|| {
            sqlx::query_as::<_, CashRegister>(&sql)
                .bind(limit)
                .fetch_all(self.pool)
        })
        .await
    }

    /// Entries of a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails after retries.
    pub async fn entries(&self, id: CashRegisterId) -> Result<Vec<CashEntry>, RepositoryError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM cash_entry WHERE cash_register_id = $1 ORDER BY created_at, id"
        );
        query_with_retry(|| {
            sqlx::query_as::<_, CashEntry>(&sql)
                .bind(id)
                .fetch_all(self.pool)
        })
        .await
    }

    /// Open a session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a session is already open.
    #[instrument(skip(self), fields(opening_balance = %opening_balance))]
    pub async fn open(
        &self,
        opening_balance: Money,
        opened_by: &str,
    ) -> Result<CashRegister, RepositoryError> {
        sqlx::query_as::<_, CashRegister>(&format!(
            r"
            INSERT INTO cash_register (opening_balance, opened_by)
            VALUES ($1, $2)
            RETURNING {REGISTER_COLUMNS}
            "
        ))
        .bind(opening_balance)
        .bind(opened_by)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "já existe um caixa aberto"))
    }

    /// Add an entry to the open session. Returns `None` when no session is
    /// open.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, entry), fields(kind = %entry.kind, amount = %entry.amount))]
    pub async fn add_entry(&self, entry: &NewCashEntry<'_>) -> Result<Option<CashEntry>, RepositoryError> {
        // FOR SHARE makes this wait for a concurrent close and then see it.
        let created = sqlx::query_as::<_, CashEntry>(&format!(
            r"
            INSERT INTO cash_entry
                (cash_register_id, kind, payment_method, amount, description, order_id, created_by)
            SELECT r.id, $1, $2, $3, $4, $5, $6
            FROM (SELECT id FROM cash_register WHERE status = 'aberto' FOR SHARE) r
            RETURNING {ENTRY_COLUMNS}
            "
        ))
        .bind(entry.kind)
        .bind(entry.payment_method)
        .bind(entry.amount)
        .bind(entry.description)
        .bind(entry.order_id)
        .bind(entry.created_by)
        .fetch_optional(self.pool)
        .await?;
        Ok(created)
    }

    /// Record the sale of a finished order in the open session, once per
    /// order. Returns `false` if no session is open or the sale was already
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, created_by), fields(order_id = %order_id))]
    pub async fn record_sale(
        &self,
        order_id: OrderId,
        payment_method: PaymentMethod,
        amount: Money,
        created_by: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO cash_entry
                (cash_register_id, kind, payment_method, amount, description, order_id, created_by)
            SELECT r.id, 'venda', $2, $3, 'Pedido #' || $1, $1, $4
            FROM (SELECT id FROM cash_register WHERE status = 'aberto' FOR SHARE) r
            WHERE NOT EXISTS (
                SELECT 1 FROM cash_entry e WHERE e.order_id = $1 AND e.kind = 'venda'
            )
            ",
        )
        .bind(order_id)
        .bind(payment_method)
        .bind(amount)
        .bind(created_by)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close the open session `id` with the counted drawer balance.
    ///
    /// The expected balance is computed from the entries inside the same
    /// transaction, with the session row locked against new entries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `id` is not the open session.
    #[instrument(skip(self, closed_by, notes), fields(register_id = %id, counted = %counted))]
    pub async fn close(
        &self,
        id: CashRegisterId,
        counted: Money,
        closed_by: &str,
        notes: Option<&str>,
    ) -> Result<(CashRegister, CashSummary), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let opening: Option<Money> = sqlx::query_scalar(
            "SELECT opening_balance FROM cash_register WHERE id = $1 AND status = 'aberto' FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(opening) = opening else {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound);
        };

        let entries = sqlx::query_as::<_, CashEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM cash_entry WHERE cash_register_id = $1 ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let summary = CashSummary::compute(opening, &entries);
        let difference = summary.difference(counted);

        let register = sqlx::query_as::<_, CashRegister>(&format!(
            r"
            UPDATE cash_register
               SET status = 'fechado', expected_balance = $2, counted_balance = $3,
                   difference = $4, closed_by = $5, notes = $6, closed_at = NOW()
             WHERE id = $1
            RETURNING {REGISTER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(summary.expected_cash)
        .bind(counted)
        .bind(difference)
        .bind(closed_by)
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((register, summary))
    }
}

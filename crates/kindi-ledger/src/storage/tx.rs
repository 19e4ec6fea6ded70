//! Unit of work over a single `SQLite` transaction.
//!
//! Every mutating method starts with a write statement, so the transaction
//! holds the database write lock before it reads anything. Concurrent writers
//! queue on the busy timeout instead of failing a read-to-write upgrade.
//!
//! Dropping a [`LedgerTx`] without calling [`LedgerTx::commit`] rolls it back.

use kindi_core::db::unix_timestamp;
use sqlx::{Sqlite, Transaction};

use super::db::{DatabaseError, LedgerDatabase};
use super::models::{Account, NewCertificate};

/// Result of a conditional balance decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied,
    Insufficient { balance: i64 },
    MissingAccount,
}

/// Result of an idempotent credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied,
    /// An order with the same ID already exists under the account.
    Duplicate,
    MissingAccount,
}

pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerDatabase {
    /// Begin a unit of work.
    pub async fn begin(&self) -> Result<LedgerTx, DatabaseError> {
        Ok(LedgerTx {
            tx: self.pool().begin().await?,
        })
    }
}

impl LedgerTx {
    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert an account with a zero balance unless one exists.
    ///
    /// Returns `true` if this call created the account.
    pub async fn insert_account_if_absent(
        &mut self,
        user_id: &str,
        email: &str,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO accounts (user_id, email, coin_balance, created_at, updated_at) VALUES (?, ?, 0, ?, ?) \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Read an account as seen by this transaction.
    pub async fn account(&mut self, user_id: &str) -> Result<Option<Account>, DatabaseError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(account)
    }

    /// Decrement a balance by `amount` unless that would take it below zero.
    pub async fn debit(&mut self, user_id: &str, amount: u32) -> Result<DebitOutcome, DatabaseError> {
        let amount = i64::from(amount);

        let result = sqlx::query(
            "UPDATE accounts SET coin_balance = coin_balance - ?, updated_at = ? \
             WHERE user_id = ? AND coin_balance >= ?",
        )
        .bind(amount)
        .bind(unix_timestamp())
        .bind(user_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(DebitOutcome::Applied);
        }

        let balance: Option<i64> =
            sqlx::query_scalar("SELECT coin_balance FROM accounts WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(balance.map_or(DebitOutcome::MissingAccount, |balance| {
            DebitOutcome::Insufficient { balance }
        }))
    }

    /// Append an order and increment the balance, once per `(user_id, order_id)`.
    ///
    /// The order row is written first. When it already exists nothing is
    /// changed and [`CreditOutcome::Duplicate`] is returned.
    pub async fn credit(
        &mut self,
        user_id: &str,
        order_id: &str,
        amount: u32,
    ) -> Result<CreditOutcome, DatabaseError> {
        let amount = i64::from(amount);
        let now = unix_timestamp();

        let inserted = sqlx::query(
            "INSERT INTO orders (user_id, order_id, email, credited_coins, processed_at) \
             SELECT user_id, ?, email, ?, ? FROM accounts WHERE user_id = ? \
             ON CONFLICT(user_id, order_id) DO NOTHING",
        )
        .bind(order_id)
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        if inserted.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM accounts WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&mut *self.tx)
                    .await?;
            return Ok(if exists.is_some() {
                CreditOutcome::Duplicate
            } else {
                CreditOutcome::MissingAccount
            });
        }

        sqlx::query(
            "UPDATE accounts SET coin_balance = coin_balance + ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(CreditOutcome::Applied)
    }

    // =========================================================================
    // Certificates
    // =========================================================================

    pub async fn insert_certificate(
        &mut self,
        cert: &NewCertificate<'_>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO certificates (id, owner_id, owner_email, display_name, raw_cert, issued_at, effective_from, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(cert.id)
        .bind(cert.owner_id)
        .bind(cert.owner_email)
        .bind(cert.display_name)
        .bind(cert.raw_cert)
        .bind(cert.issued_at)
        .bind(cert.effective_from)
        .bind(cert.expires_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Delete a certificate owned by `owner_id`. Returns `false` if no such row.
    pub async fn delete_certificate(
        &mut self,
        owner_id: &str,
        id: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Promo entries
    // =========================================================================

    /// Record a promo redemption. Returns the new entry ID.
    pub async fn insert_promo_entry(&mut self, code: &str) -> Result<i64, DatabaseError> {
        let result = sqlx::query("INSERT INTO promo_entries (code, redeemed_at) VALUES (?, ?)")
            .bind(code)
            .bind(unix_timestamp())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn count_promo_entries(&mut self, code: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM promo_entries WHERE code = ?")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.0)
    }
}

//! Pool-level queries for the Kindi ledger.
//!
//! Reads that do not need to observe a write in the same transaction live
//! here. Anything that mutates a balance goes through [`super::LedgerTx`].

use super::db::{DatabaseError, LedgerDatabase};
use super::models::{Account, Order};

impl LedgerDatabase {
    // =========================================================================
    // Account queries
    // =========================================================================

    /// Get an account by user ID.
    pub async fn get_account(&self, user_id: &str) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {user_id}")))
    }

    /// Count all accounts.
    pub async fn count_accounts(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    // =========================================================================
    // Order queries
    // =========================================================================

    /// List the order log of an account, oldest first.
    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, DatabaseError> {
        let orders =
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = ? ORDER BY id ASC")
                .bind(user_id)
                .fetch_all(self.pool())
                .await?;

        Ok(orders)
    }

    /// Whether an account already has an order with the given order ID.
    pub async fn has_order(&self, user_id: &str, order_id: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = ? AND order_id = ?")
                .bind(user_id)
                .bind(order_id)
                .fetch_one(self.pool())
                .await?;

        Ok(row.0 > 0)
    }

    // =========================================================================
    // Promo queries
    // =========================================================================

    /// Count promo redemptions recorded for a code.
    pub async fn count_promo_entries(&self, code: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM promo_entries WHERE code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }

    /// Remove a promo entry whose redemption was not credited.
    pub async fn delete_promo_entry(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM promo_entries WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! One-time promotional credit with a global redemption cap.
//!
//! Claiming a slot is its own transaction: the promo entry is written first,
//! which takes the write lock, and the entries for the code are then
//! recounted. A recount above the cap rolls the claim back, so at most `cap`
//! entries are ever committed. The credit runs afterwards; if it turns out the
//! account already redeemed (a concurrent call won), the claimed slot is
//! released again.

use tracing::{info, instrument, warn};

use super::{AccountLedger, LedgerError};

/// Result of a promo redemption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoOutcome {
    /// One coin credited.
    Accepted,
    /// This account already redeemed the promo.
    AlreadyUsed,
    /// The global cap is reached.
    Expired,
}

impl AccountLedger {
    pub fn promo_code(&self) -> &str {
        &self.promo.code
    }

    /// Redemptions still available before the promo closes.
    pub async fn promo_remaining(&self) -> Result<u32, LedgerError> {
        let used = self.db.count_promo_entries(&self.promo.code).await?;
        let remaining = i64::from(self.promo.cap).saturating_sub(used).max(0);
        Ok(u32::try_from(remaining).unwrap_or(0))
    }

    #[instrument(skip(self))]
    pub async fn redeem_promo(&self, user_id: &str) -> Result<PromoOutcome, LedgerError> {
        let code = self.promo.code.as_str();

        // The account must exist before a global slot is spent on it.
        self.get_account(user_id).await?;

        if self.db.has_order(user_id, code).await? {
            return Ok(PromoOutcome::AlreadyUsed);
        }

        let Some(entry_id) = self.claim_promo_slot(code).await? else {
            info!(user_id = %user_id, cap = self.promo.cap, "Promo cap reached");
            return Ok(PromoOutcome::Expired);
        };

        match self.credit(user_id, code, 1).await {
            Ok(account) => {
                info!(
                    user_id = %user_id,
                    balance = account.coin_balance,
                    "Promo accepted"
                );
                Ok(PromoOutcome::Accepted)
            }
            Err(LedgerError::AlreadyProcessed { .. }) => {
                self.release_promo_slot(entry_id).await;
                Ok(PromoOutcome::AlreadyUsed)
            }
            Err(e) => {
                self.release_promo_slot(entry_id).await;
                Err(e)
            }
        }
    }

    /// Write a promo entry unless the cap is already reached.
    async fn claim_promo_slot(&self, code: &str) -> Result<Option<i64>, LedgerError> {
        let mut tx = self.db.begin().await?;
        let entry_id = tx.insert_promo_entry(code).await?;
        let claimed = tx.count_promo_entries(code).await?;

        if claimed > i64::from(self.promo.cap) {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(entry_id))
    }

    async fn release_promo_slot(&self, entry_id: i64) {
        if let Err(e) = self.db.delete_promo_entry(entry_id).await {
            warn!(entry_id, error = %e, "Failed to release promo slot");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kindi_core::config::PromoConfig;

    use super::*;
    use crate::cache::CacheLayer;
    use crate::storage::LedgerDatabase;

    async fn ledger_with_cap(cap: u32) -> AccountLedger {
        let db = LedgerDatabase::open_in_memory().await.unwrap();
        AccountLedger::new(
            db,
            CacheLayer::disabled(),
            PromoConfig {
                code: "welcome".into(),
                cap,
            },
        )
    }

    async fn with_accounts(ledger: &AccountLedger, users: &[&str]) {
        for user in users {
            ledger
                .get_or_create_account(user, &format!("{user}@example.com"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn redeem_once_per_account() {
        let ledger = ledger_with_cap(10).await;
        with_accounts(&ledger, &["u1"]).await;

        assert_eq!(ledger.redeem_promo("u1").await.unwrap(), PromoOutcome::Accepted);
        assert_eq!(ledger.redeem_promo("u1").await.unwrap(), PromoOutcome::AlreadyUsed);

        assert_eq!(ledger.get_account("u1").await.unwrap().coin_balance, 1);
        assert_eq!(ledger.promo_remaining().await.unwrap(), 9);

        let orders = ledger.list_orders("u1").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "welcome");
    }

    #[tokio::test]
    async fn cap_closes_the_promo() {
        let ledger = ledger_with_cap(2).await;
        with_accounts(&ledger, &["u1", "u2", "u3"]).await;

        assert_eq!(ledger.redeem_promo("u1").await.unwrap(), PromoOutcome::Accepted);
        assert_eq!(ledger.redeem_promo("u2").await.unwrap(), PromoOutcome::Accepted);
        assert_eq!(ledger.redeem_promo("u3").await.unwrap(), PromoOutcome::Expired);

        assert_eq!(ledger.get_account("u3").await.unwrap().coin_balance, 0);
        assert_eq!(ledger.promo_remaining().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_cap_never_accepts() {
        let ledger = ledger_with_cap(0).await;
        with_accounts(&ledger, &["u1"]).await;

        assert_eq!(ledger.redeem_promo("u1").await.unwrap(), PromoOutcome::Expired);
        assert_eq!(ledger.promo_remaining().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_account_spends_no_slot() {
        let ledger = ledger_with_cap(1).await;

        let err = ledger.redeem_promo("ghost").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(ledger.promo_remaining().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn promo_credit_matches_payment_idempotency() {
        let ledger = ledger_with_cap(5).await;
        with_accounts(&ledger, &["u1"]).await;

        // A payment that reused the promo code as its order id counts as redemption.
        ledger.credit("u1", "welcome", 3).await.unwrap();
        assert_eq!(ledger.redeem_promo("u1").await.unwrap(), PromoOutcome::AlreadyUsed);
        assert_eq!(ledger.promo_remaining().await.unwrap(), 5);
    }
}

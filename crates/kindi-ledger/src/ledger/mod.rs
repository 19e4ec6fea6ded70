//! Account ledger: balances, the append-only order log and promo redemption.
//!
//! Every mutation runs in one [`LedgerTx`] and invalidates the cached account
//! projection after commit. Reads go through the cache and fall back to the
//! store on any miss.

mod error;
mod promo;

use kindi_core::config::PromoConfig;
use tracing::{info, instrument};

use crate::cache::{CacheLayer, account_key};
use crate::storage::{
    Account, CreditOutcome, DatabaseError, DebitOutcome, LedgerDatabase, LedgerTx, Order,
};

pub use error::LedgerError;
pub use promo::PromoOutcome;

pub struct AccountLedger {
    db: LedgerDatabase,
    cache: CacheLayer,
    promo: PromoConfig,
}

impl AccountLedger {
    pub const fn new(db: LedgerDatabase, cache: CacheLayer, promo: PromoConfig) -> Self {
        Self { db, cache, promo }
    }

    /// Look up an account without creating it.
    #[instrument(skip(self))]
    pub async fn get_account(&self, user_id: &str) -> Result<Account, LedgerError> {
        let key = account_key(user_id);
        if let Some(account) = self.cache.read::<Account>(&key).await {
            return Ok(account);
        }

        let account = match self.db.get_account(user_id).await {
            Ok(account) => account,
            Err(DatabaseError::NotFound(_)) => {
                return Err(LedgerError::NotFound(user_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        self.cache.write(&key, &account).await;
        Ok(account)
    }

    /// Look up an account, creating it with a zero balance on first access.
    ///
    /// Concurrent first calls for the same user create exactly one row: the
    /// insert-if-absent inside the transaction decides, not the cache.
    #[instrument(skip(self))]
    pub async fn get_or_create_account(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<Account, LedgerError> {
        let key = account_key(user_id);
        if let Some(account) = self.cache.read::<Account>(&key).await {
            return Ok(account);
        }

        let mut tx = self.db.begin().await?;
        let created = tx.insert_account_if_absent(user_id, email).await?;
        let account = tx
            .account(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))?;
        tx.commit().await?;

        if created {
            info!(user_id = %user_id, "Account created");
        }

        self.cache.write(&key, &account).await;
        Ok(account)
    }

    /// Begin a unit of work for writes that must apply together with a debit.
    pub async fn begin(&self) -> Result<LedgerTx, LedgerError> {
        Ok(self.db.begin().await?)
    }

    /// Debit `amount` inside the caller's unit of work.
    ///
    /// Fails before mutating anything if the balance would go negative. The
    /// caller commits and then calls [`Self::invalidate_account`].
    pub async fn debit_in(
        &self,
        tx: &mut LedgerTx,
        user_id: &str,
        amount: u32,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        match tx.debit(user_id, amount).await? {
            DebitOutcome::Applied => Ok(()),
            DebitOutcome::Insufficient { balance } => Err(LedgerError::InsufficientBalance {
                user_id: user_id.to_string(),
                balance,
                requested: amount,
            }),
            DebitOutcome::MissingAccount => Err(LedgerError::NotFound(user_id.to_string())),
        }
    }

    /// Debit `amount` coins in a transaction of its own.
    #[instrument(skip(self))]
    pub async fn debit(&self, user_id: &str, amount: u32) -> Result<Account, LedgerError> {
        let mut tx = self.begin().await?;
        self.debit_in(&mut tx, user_id, amount).await?;
        let account = tx
            .account(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))?;
        tx.commit().await?;

        self.invalidate_account(user_id).await;
        info!(user_id = %user_id, amount, balance = account.coin_balance, "Coins debited");
        Ok(account)
    }

    /// Credit `amount` coins for `order_id`, at most once per account.
    ///
    /// A repeated order ID returns [`LedgerError::AlreadyProcessed`] and leaves
    /// the balance untouched, which absorbs duplicate payment callbacks.
    #[instrument(skip(self))]
    pub async fn credit(
        &self,
        user_id: &str,
        order_id: &str,
        amount: u32,
    ) -> Result<Account, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let mut tx = self.begin().await?;
        match tx.credit(user_id, order_id, amount).await? {
            CreditOutcome::Applied => {}
            CreditOutcome::Duplicate => {
                return Err(LedgerError::AlreadyProcessed {
                    user_id: user_id.to_string(),
                    order_id: order_id.to_string(),
                });
            }
            CreditOutcome::MissingAccount => {
                return Err(LedgerError::NotFound(user_id.to_string()));
            }
        }
        let account = tx
            .account(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(user_id.to_string()))?;
        tx.commit().await?;

        self.invalidate_account(user_id).await;
        info!(
            user_id = %user_id,
            order_id = %order_id,
            amount,
            balance = account.coin_balance,
            "Coins credited"
        );
        Ok(account)
    }

    /// The order log of an account, oldest first.
    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, LedgerError> {
        Ok(self.db.list_orders(user_id).await?)
    }

    /// Drop the cached projection of an account after a committed write.
    pub async fn invalidate_account(&self, user_id: &str) {
        self.cache.invalidate(&account_key(user_id)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::tests::FailingCache;
    use crate::cache::{Cache, MemoryCache};

    async fn ledger_with(cache: CacheLayer) -> AccountLedger {
        let db = LedgerDatabase::open_in_memory().await.unwrap();
        AccountLedger::new(db, cache, PromoConfig::default())
    }

    async fn ledger() -> AccountLedger {
        ledger_with(CacheLayer::disabled()).await
    }

    #[tokio::test]
    async fn get_account_does_not_create() {
        let ledger = ledger().await;
        let err = ledger.get_account("u1").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(!err.is_infrastructure());
    }

    #[tokio::test]
    async fn get_or_create_is_stable() {
        let ledger = ledger().await;
        let first = ledger.get_or_create_account("u1", "a@example.com").await.unwrap();
        let second = ledger.get_or_create_account("u1", "b@example.com").await.unwrap();

        assert_eq!(first.coin_balance, 0);
        assert_eq!(second.email, "a@example.com");
        assert_eq!(ledger.get_account("u1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn credit_twice_counts_once() {
        let ledger = ledger().await;
        ledger.get_or_create_account("u3", "c@example.com").await.unwrap();

        let account = ledger.credit("u3", "order-42", 5).await.unwrap();
        assert_eq!(account.coin_balance, 5);

        let err = ledger.credit("u3", "order-42", 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyProcessed { .. }));
        assert_eq!(ledger.get_account("u3").await.unwrap().coin_balance, 5);
        assert_eq!(ledger.list_orders("u3").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn credit_unknown_account() {
        let ledger = ledger().await;
        let err = ledger.credit("ghost", "order-1", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn zero_amounts_rejected() {
        let ledger = ledger().await;
        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();

        assert!(matches!(
            ledger.credit("u1", "order-0", 0).await.unwrap_err(),
            LedgerError::InvalidAmount
        ));
        assert!(matches!(
            ledger.debit("u1", 0).await.unwrap_err(),
            LedgerError::InvalidAmount
        ));
    }

    #[tokio::test]
    async fn debit_fails_closed() {
        let ledger = ledger().await;
        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();
        ledger.credit("u1", "order-1", 2).await.unwrap();

        let err = ledger.debit("u1", 3).await.unwrap_err();
        match err {
            LedgerError::InsufficientBalance {
                balance, requested, ..
            } => {
                assert_eq!(balance, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(ledger.debit("u1", 2).await.unwrap().coin_balance, 0);
        assert_eq!(ledger.get_account("u1").await.unwrap().coin_balance, 0);
    }

    #[tokio::test]
    async fn debit_unknown_account() {
        let ledger = ledger().await;
        let err = ledger.debit("ghost", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn cached_account_is_refreshed_after_credit() {
        let backend = Arc::new(MemoryCache::new(64));
        let ledger = ledger_with(CacheLayer::new(backend.clone(), Duration::from_secs(60))).await;

        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();
        assert!(backend.get("u1").await.unwrap().is_some());

        ledger.credit("u1", "order-1", 4).await.unwrap();
        assert!(backend.get("u1").await.unwrap().is_none());
        assert_eq!(ledger.get_account("u1").await.unwrap().coin_balance, 4);
        assert!(backend.get("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failing_cache_degrades_to_store() {
        let ledger = ledger_with(CacheLayer::new(Arc::new(FailingCache), Duration::from_secs(60))).await;

        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();
        ledger.credit("u1", "order-1", 3).await.unwrap();
        ledger.debit("u1", 1).await.unwrap();

        assert_eq!(ledger.get_account("u1").await.unwrap().coin_balance, 2);
    }

    #[tokio::test]
    async fn debit_in_rolls_back_with_its_unit_of_work() {
        let ledger = ledger().await;
        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();
        ledger.credit("u1", "order-1", 1).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        ledger.debit_in(&mut tx, "u1", 1).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(ledger.get_account("u1").await.unwrap().coin_balance, 1);
    }
}

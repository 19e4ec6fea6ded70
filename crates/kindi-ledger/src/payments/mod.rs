//! Payment intake.
//!
//! Turns an already-verified payment notification into an idempotent credit.
//! Verifying the notification's signature is the caller's concern.

mod seller_data;

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::ledger::{AccountLedger, LedgerError};
use crate::storage::Account;

pub use seller_data::SellerData;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Malformed seller payload: {0}")]
    MalformedPayload(String),

    #[error("Quantity {quantity} outside {min}..={max}")]
    InvalidQuantity { quantity: u32, min: u32, max: u32 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl PaymentError {
    /// `true` for store failures, `false` for outcomes caused by the request.
    pub const fn is_infrastructure(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_infrastructure(),
            _ => false,
        }
    }
}

pub struct PaymentIntake {
    ledger: Arc<AccountLedger>,
}

impl PaymentIntake {
    pub const fn new(ledger: Arc<AccountLedger>) -> Self {
        Self { ledger }
    }

    /// Credit the coins bought in `order_id`.
    ///
    /// A replayed notification yields [`LedgerError::AlreadyProcessed`] and
    /// changes nothing.
    #[instrument(skip(self, payload))]
    pub async fn process_verified_order(
        &self,
        order_id: &str,
        payload: &str,
    ) -> Result<Account, PaymentError> {
        if order_id.is_empty() {
            return Err(PaymentError::MalformedPayload("empty order id".into()));
        }

        let data: SellerData = payload.parse().inspect_err(|e| {
            warn!(order_id = %order_id, error = %e, "Rejecting payment notification");
        })?;

        Ok(self
            .ledger
            .credit(&data.user_id, order_id, data.quantity)
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kindi_core::config::PromoConfig;

    use super::*;
    use crate::cache::CacheLayer;
    use crate::storage::LedgerDatabase;

    async fn intake() -> (Arc<AccountLedger>, PaymentIntake) {
        let db = LedgerDatabase::open_in_memory().await.unwrap();
        let ledger = Arc::new(AccountLedger::new(
            db,
            CacheLayer::disabled(),
            PromoConfig::default(),
        ));
        (Arc::clone(&ledger), PaymentIntake::new(ledger))
    }

    #[tokio::test]
    async fn verified_order_credits_once() {
        let (ledger, intake) = intake().await;
        ledger.get_or_create_account("u3", "c@example.com").await.unwrap();

        let account = intake
            .process_verified_order("order-42", "userId:u3,quantity:5")
            .await
            .unwrap();
        assert_eq!(account.coin_balance, 5);

        let err = intake
            .process_verified_order("order-42", "userId:u3,quantity:5")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Ledger(LedgerError::AlreadyProcessed { .. })
        ));
        assert_eq!(ledger.get_account("u3").await.unwrap().coin_balance, 5);
    }

    #[tokio::test]
    async fn malformed_payload_changes_nothing() {
        let (ledger, intake) = intake().await;
        ledger.get_or_create_account("abc", "a@example.com").await.unwrap();

        let err = intake
            .process_verified_order("order-1", "userId:abc")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedPayload(_)));
        assert!(!err.is_infrastructure());
        assert_eq!(ledger.get_account("abc").await.unwrap().coin_balance, 0);
        assert!(ledger.list_orders("abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_order_id_rejected() {
        let (ledger, intake) = intake().await;
        ledger.get_or_create_account("u1", "a@example.com").await.unwrap();

        let err = intake
            .process_verified_order("", "userId:u1,quantity:1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_, intake) = intake().await;
        let err = intake
            .process_verified_order("order-1", "userId:ghost,quantity:1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Ledger(LedgerError::NotFound(_))));
    }
}

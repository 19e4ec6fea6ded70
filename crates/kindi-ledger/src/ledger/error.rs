use crate::storage::DatabaseError;

/// Account ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    NotFound(String),

    #[error("Insufficient balance for {user_id}: have {balance}, need {requested}")]
    InsufficientBalance {
        user_id: String,
        balance: i64,
        requested: u32,
    },

    #[error("Order {order_id} already processed for {user_id}")]
    AlreadyProcessed { user_id: String, order_id: String },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Storage error: {0}")]
    Store(#[from] DatabaseError),
}

impl LedgerError {
    /// `true` for store failures, `false` for outcomes caused by the request.
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

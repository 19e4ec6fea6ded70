//! Data models for Kindi ledger storage.
//!
//! All timestamps are Unix seconds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub user_id: String,
    pub email: String,
    pub coin_balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certificate {
    pub id: String,
    pub owner_id: String,
    pub owner_email: String,
    pub display_name: String,
    /// DER body of the uploaded certificate.
    pub raw_cert: Vec<u8>,
    pub issued_at: i64,
    pub effective_from: i64,
    pub expires_at: i64,
}

impl Certificate {
    /// `effective_from <= now < expires_at`.
    pub const fn is_valid_at(&self, now: i64) -> bool {
        self.effective_from <= now && now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: String,
    /// Payment reference, or the promo code for a promo redemption.
    pub order_id: String,
    pub email: String,
    pub credited_coins: i64,
    pub processed_at: i64,
}

/// Parameters for inserting a certificate.
pub struct NewCertificate<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub owner_email: &'a str,
    pub display_name: &'a str,
    pub raw_cert: &'a [u8],
    pub issued_at: i64,
    pub effective_from: i64,
    pub expires_at: i64,
}

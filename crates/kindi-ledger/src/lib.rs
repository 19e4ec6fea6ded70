//! Kindi ledger library
//!
//! Account and certificate bookkeeping for Kindi:
//! - `SQLite` storage for accounts, orders, certificates and promo entries
//! - Coin ledger with idempotent credits and a capped promo
//! - Certificate registry paid for with coins
//! - Payment intake for verified seller payloads
//! - Read-through cache in front of the store

pub mod cache;
pub mod ledger;
pub mod payments;
pub mod registry;
pub mod storage;
pub mod view;

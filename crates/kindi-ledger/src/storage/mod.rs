//! SQLite storage for the Kindi ledger.
//!
//! Provides persistence for accounts, orders, promo entries and certificates,
//! plus the [`LedgerTx`] unit of work that groups writes which must apply
//! together.

mod db;
mod models;
mod queries;
mod queries_certs;
mod tx;


pub use db::{DatabaseError, LedgerDatabase};
pub use models::*;
pub use tx::{CreditOutcome, DebitOutcome, LedgerTx};

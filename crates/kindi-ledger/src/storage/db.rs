//! SQLite database for the Kindi ledger.

pub use kindi_core::db::DatabaseError;

kindi_core::define_database!(LedgerDatabase, "Ledger database migrations complete");

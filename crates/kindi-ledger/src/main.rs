//! Kindi ledger admin tool
//!
//! Inspects and mutates the account ledger and certificate registry directly.

mod admin_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kindi_core::tracing_init::{LogFormat, init_tracing};
use kindi_ledger::cache::{CacheLayer, MemoryCache};
use kindi_ledger::ledger::AccountLedger;
use kindi_ledger::payments::PaymentIntake;
use kindi_ledger::registry::CertificateRegistry;
use kindi_ledger::storage::LedgerDatabase;

use admin_cmd::{AdminCommand, Services};

#[derive(Parser, Debug)]
#[command(name = "kindi-ledger")]
#[command(version, about = "Kindi account ledger and certificate registry")]
struct Args {
    /// Path to `SQLite` database file.
    #[arg(long, env = "KINDI_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Settings file layered over the global one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: AdminCommand,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("kindi_ledger=info", LogFormat::from_json_flag(args.log_json));

    let config = kindi_core::config::load_config(args.config.as_deref())?;

    let db_path = args
        .db_path
        .or_else(|| config.storage.database_path.clone())
        .or_else(kindi_core::config::database_path)
        .context("Cannot determine database path, pass --db-path")?;
    info!(path = %db_path.display(), "Opening ledger database");
    let db = LedgerDatabase::open(&db_path).await?;

    let cache = CacheLayer::new(
        Arc::new(MemoryCache::new(config.cache.max_entries)),
        config.cache.ttl(),
    );
    let ledger = Arc::new(AccountLedger::new(
        db.clone(),
        cache.clone(),
        config.promo.clone(),
    ));
    let services = Services {
        registry: CertificateRegistry::new(
            db,
            Arc::clone(&ledger),
            cache,
            config.certificates.clone(),
        ),
        intake: PaymentIntake::new(Arc::clone(&ledger)),
        ledger,
        purchase: config.purchase.clone(),
    };

    admin_cmd::run(args.command, &services).await
}

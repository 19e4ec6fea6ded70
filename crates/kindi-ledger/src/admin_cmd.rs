//! Admin subcommands operating directly on the ledger database.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use kindi_core::config::PurchaseConfig;
use kindi_core::db::unix_timestamp;

use kindi_ledger::ledger::{AccountLedger, PromoOutcome};
use kindi_ledger::payments::{PaymentIntake, SellerData};
use kindi_ledger::registry::CertificateRegistry;
use kindi_ledger::view::manage_view;

/// Wired ledger services shared by all subcommands.
pub struct Services {
    pub ledger: Arc<AccountLedger>,
    pub registry: CertificateRegistry,
    pub intake: PaymentIntake,
    pub purchase: PurchaseConfig,
}

#[derive(clap::Subcommand, Debug)]
pub enum AdminCommand {
    /// Show (creating if needed) an account with its certificates.
    Account { user_id: String, email: String },
    /// Print the coin balance of an existing account.
    Balance { user_id: String },
    /// Credit a verified payment notification.
    Credit {
        order_id: String,
        /// Seller payload, e.g. `userId:abc,quantity:2`.
        payload: String,
    },
    /// Redeem the promo for an account, or show how many redemptions remain.
    Promo { user_id: Option<String> },
    /// Register a PEM or DER certificate file, spending one coin.
    Issue {
        user_id: String,
        cert: PathBuf,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// List certificates owned by an account.
    List { user_id: String },
    /// Print currently valid certificates for the given emails as JSON.
    Lookup {
        #[arg(required = true)]
        emails: Vec<String>,
    },
    /// Delete certificates, all or nothing.
    Delete {
        user_id: String,
        #[arg(required = true)]
        cert_ids: Vec<String>,
    },
    /// Show the order log of an account.
    Orders { user_id: String },
    /// Build the seller payload for a coin purchase.
    PurchasePayload { user_id: String, quantity: u32 },
}

/// Execute an admin subcommand.
pub async fn run(command: AdminCommand, services: &Services) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match command {
        AdminCommand::Account { user_id, email } => {
            let view = manage_view(&services.ledger, &services.registry, &user_id, &email).await?;
            writeln!(out, "Balance: {}", view.balance)?;
            for cert in &view.certificates {
                writeln!(
                    out,
                    "{:<36} {:<24} {:>12} {:>12}",
                    cert.id, cert.display_name, cert.effective_from, cert.expires_at
                )?;
            }
        }
        AdminCommand::Balance { user_id } => {
            let account = services.ledger.get_account(&user_id).await?;
            writeln!(out, "{}", account.coin_balance)?;
        }
        AdminCommand::Credit { order_id, payload } => {
            let account = services
                .intake
                .process_verified_order(&order_id, &payload)
                .await?;
            writeln!(
                out,
                "Credited order {} to {}, balance {}",
                order_id, account.user_id, account.coin_balance
            )?;
        }
        AdminCommand::Promo { user_id: None } => {
            let remaining = services.ledger.promo_remaining().await?;
            writeln!(
                out,
                "Promo {}: {} redemptions left",
                services.ledger.promo_code(),
                remaining
            )?;
        }
        AdminCommand::Promo {
            user_id: Some(user_id),
        } => {
            let outcome = match services.ledger.redeem_promo(&user_id).await? {
                PromoOutcome::Accepted => "accepted",
                PromoOutcome::AlreadyUsed => "already used",
                PromoOutcome::Expired => "expired",
            };
            writeln!(out, "Promo {outcome}")?;
        }
        AdminCommand::Issue {
            user_id,
            cert,
            name,
        } => {
            let raw = tokio::fs::read(&cert).await?;
            let issued = services.registry.issue(&user_id, &raw, &name).await?;
            writeln!(
                out,
                "Issued {} ({}), valid {}..{}",
                issued.id, issued.display_name, issued.effective_from, issued.expires_at
            )?;
        }
        AdminCommand::List { user_id } => {
            let certs = services.registry.list_by_owner(&user_id).await?;
            if certs.is_empty() {
                writeln!(out, "No certificates")?;
                return Ok(());
            }
            let now = unix_timestamp();
            writeln!(out, "{:<36} {:<24} {:<8}", "ID", "NAME", "STATUS")?;
            for cert in &certs {
                let status = if cert.is_valid_at(now) { "valid" } else { "inactive" };
                writeln!(out, "{:<36} {:<24} {:<8}", cert.id, cert.display_name, status)?;
            }
        }
        AdminCommand::Lookup { emails } => {
            let published = services
                .registry
                .lookup_valid(&emails, unix_timestamp())
                .await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&published)?)?;
        }
        AdminCommand::Delete { user_id, cert_ids } => {
            let deleted = services.registry.delete_many(&user_id, &cert_ids).await?;
            writeln!(out, "Deleted {deleted} certificate(s)")?;
        }
        AdminCommand::Orders { user_id } => {
            let orders = services.ledger.list_orders(&user_id).await?;
            if orders.is_empty() {
                writeln!(out, "No orders")?;
                return Ok(());
            }
            writeln!(out, "{:<32} {:>6} {:>12}", "ORDER", "COINS", "PROCESSED")?;
            for order in &orders {
                writeln!(
                    out,
                    "{:<32} {:>6} {:>12}",
                    order.order_id, order.credited_coins, order.processed_at
                )?;
            }
        }
        AdminCommand::PurchasePayload { user_id, quantity } => {
            let data = SellerData::for_purchase(&user_id, quantity, &services.purchase)?;
            writeln!(out, "{data}")?;
        }
    }
    Ok(())
}

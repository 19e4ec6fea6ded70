//! The per-user management projection handed to the rendering layer.

use serde::{Deserialize, Serialize};

use crate::ledger::AccountLedger;
use crate::registry::{CertificateRegistry, RegistryError};
use crate::storage::Certificate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    pub id: String,
    pub display_name: String,
    /// When the certificate was registered.
    pub processed_at: i64,
    pub effective_from: i64,
    pub expires_at: i64,
}

impl From<&Certificate> for CertificateSummary {
    fn from(cert: &Certificate) -> Self {
        Self {
            id: cert.id.clone(),
            display_name: cert.display_name.clone(),
            processed_at: cert.issued_at,
            effective_from: cert.effective_from,
            expires_at: cert.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManageView {
    pub balance: i64,
    pub certificates: Vec<CertificateSummary>,
}

/// Balance and certificate list of `user_id`, creating the account on first visit.
pub async fn manage_view(
    ledger: &AccountLedger,
    registry: &CertificateRegistry,
    user_id: &str,
    email: &str,
) -> Result<ManageView, RegistryError> {
    let account = ledger.get_or_create_account(user_id, email).await?;
    let certificates = registry
        .list_by_owner(user_id)
        .await?
        .iter()
        .map(CertificateSummary::from)
        .collect();

    Ok(ManageView {
        balance: account.coin_balance,
        certificates,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use kindi_core::config::{CertificateConfig, PromoConfig};
    use kindi_core::db::unix_timestamp;

    use super::*;
    use crate::cache::CacheLayer;
    use crate::registry::test_certs::{DAY, pem_valid_between};
    use crate::storage::LedgerDatabase;

    #[tokio::test]
    async fn first_visit_creates_empty_account() {
        let db = LedgerDatabase::open_in_memory().await.unwrap();
        let ledger = Arc::new(AccountLedger::new(
            db.clone(),
            CacheLayer::disabled(),
            PromoConfig::default(),
        ));
        let registry = CertificateRegistry::new(
            db,
            Arc::clone(&ledger),
            CacheLayer::disabled(),
            CertificateConfig::default(),
        );

        let view = manage_view(&ledger, &registry, "u1", "a@example.com").await.unwrap();
        assert_eq!(
            view,
            ManageView {
                balance: 0,
                certificates: Vec::new(),
            }
        );

        ledger.credit("u1", "order-1", 2).await.unwrap();
        let now = unix_timestamp();
        let pem = pem_valid_between(now - DAY, now + 30 * DAY);
        let cert = registry.issue("u1", pem.as_bytes(), "laptop").await.unwrap();

        let view = manage_view(&ledger, &registry, "u1", "a@example.com").await.unwrap();
        assert_eq!(view.balance, 1);
        assert_eq!(view.certificates, vec![CertificateSummary::from(&cert)]);
        assert_eq!(view.certificates[0].processed_at, cert.issued_at);

        let json = serde_json::to_value(&view.certificates[0]).unwrap();
        assert!(json.get("displayName").is_some());
    }
}

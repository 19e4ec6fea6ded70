//! Certificate registry.
//!
//! Certificates are children of an account. Issuing one spends a coin in the
//! same unit of work that stores the certificate, so either both happen or
//! neither does.

mod decode;

use std::collections::BTreeSet;
use std::sync::Arc;

use kindi_core::config::CertificateConfig;
use kindi_core::db::unix_timestamp;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cache::{CacheLayer, certificates_key};
use crate::ledger::{AccountLedger, LedgerError};
use crate::storage::{Certificate, DatabaseError, LedgerDatabase, NewCertificate};

pub use decode::{DecodeError, DecodedCertificate, ValidityWindow, decode_certificate, validity_window};

/// Certificate registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Certificate parse error: {0}")]
    Parse(#[from] DecodeError),

    #[error("Certificate validity {not_before}..{not_after} leaves no usable window")]
    InvalidValidity { not_before: i64, not_after: i64 },

    #[error("Account {0} not found")]
    NotFound(String),

    #[error("Insufficient balance for {user_id}: have {balance}")]
    InsufficientBalance { user_id: String, balance: i64 },

    #[error("Certificates not deleted, unknown ids: {missing:?}")]
    PartialFailure { missing: Vec<String> },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Storage error: {0}")]
    Store(#[from] DatabaseError),
}

impl RegistryError {
    /// `true` for store failures, `false` for outcomes caused by the request.
    pub const fn is_infrastructure(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Ledger(e) => e.is_infrastructure(),
            _ => false,
        }
    }
}

impl From<LedgerError> for RegistryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(user_id) => Self::NotFound(user_id),
            LedgerError::InsufficientBalance {
                user_id, balance, ..
            } => Self::InsufficientBalance { user_id, balance },
            LedgerError::Store(e) => Self::Store(e),
            other => Self::Ledger(other),
        }
    }
}

/// A currently-valid certificate as handed to the bulk lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCertificate {
    pub email: String,
    pub raw_cert: Vec<u8>,
}

pub struct CertificateRegistry {
    db: LedgerDatabase,
    ledger: Arc<AccountLedger>,
    cache: CacheLayer,
    policy: CertificateConfig,
}

impl CertificateRegistry {
    pub const fn new(
        db: LedgerDatabase,
        ledger: Arc<AccountLedger>,
        cache: CacheLayer,
        policy: CertificateConfig,
    ) -> Self {
        Self {
            db,
            ledger,
            cache,
            policy,
        }
    }

    /// Register a certificate for `user_id`, spending one coin.
    #[instrument(skip(self, raw), fields(len = raw.len()))]
    pub async fn issue(
        &self,
        user_id: &str,
        raw: &[u8],
        display_name: &str,
    ) -> Result<Certificate, RegistryError> {
        let decoded = decode_certificate(raw)?;
        let issued_at = unix_timestamp();
        let window = validity_window(
            decoded.not_before,
            decoded.not_after,
            issued_at,
            self.policy.max_validity_secs(),
        )
        .ok_or(RegistryError::InvalidValidity {
            not_before: decoded.not_before,
            not_after: decoded.not_after,
        })?;

        let display_name = match display_name.trim() {
            "" => self.policy.default_name.as_str(),
            name => name,
        };
        let id = uuid::Uuid::new_v4().to_string();

        let mut tx = self.ledger.begin().await?;
        self.ledger.debit_in(&mut tx, user_id, 1).await?;
        let account = tx
            .account(user_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(user_id.to_string()))?;
        let cert = Certificate {
            id,
            owner_id: user_id.to_string(),
            owner_email: account.email,
            display_name: display_name.to_string(),
            raw_cert: decoded.der,
            issued_at,
            effective_from: window.effective_from,
            expires_at: window.expires_at,
        };
        tx.insert_certificate(&NewCertificate {
            id: &cert.id,
            owner_id: &cert.owner_id,
            owner_email: &cert.owner_email,
            display_name: &cert.display_name,
            raw_cert: &cert.raw_cert,
            issued_at: cert.issued_at,
            effective_from: cert.effective_from,
            expires_at: cert.expires_at,
        })
        .await?;
        tx.commit().await?;

        self.ledger.invalidate_account(user_id).await;
        self.cache.invalidate(&certificates_key(user_id)).await;

        info!(
            user_id = %user_id,
            cert_id = %cert.id,
            expires_at = cert.expires_at,
            "Certificate issued"
        );
        Ok(cert)
    }

    /// All certificates owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Certificate>, RegistryError> {
        let key = certificates_key(user_id);
        if let Some(certs) = self.cache.read::<Vec<Certificate>>(&key).await {
            return Ok(certs);
        }

        let certs = self.db.list_certificates_by_owner(user_id).await?;
        self.cache.write(&key, &certs).await;
        Ok(certs)
    }

    /// All certificates registered under `email`, valid or not.
    pub async fn list_by_email(&self, email: &str) -> Result<Vec<Certificate>, RegistryError> {
        Ok(self.db.list_certificates_by_email(email).await?)
    }

    /// Certificates valid at `now` for each of `emails`, in request order.
    #[instrument(skip(self, emails), fields(count = emails.len()))]
    pub async fn lookup_valid(
        &self,
        emails: &[String],
        now: i64,
    ) -> Result<Vec<PublishedCertificate>, RegistryError> {
        let mut published = Vec::new();
        for email in emails.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            for cert in self.list_by_email(email).await? {
                if cert.is_valid_at(now) {
                    published.push(PublishedCertificate {
                        email: cert.owner_email,
                        raw_cert: cert.raw_cert,
                    });
                }
            }
        }
        Ok(published)
    }

    /// Delete certificates owned by `user_id`, all or nothing.
    ///
    /// Any id the caller does not own rolls the whole batch back and is
    /// reported in [`RegistryError::PartialFailure`].
    #[instrument(skip(self, cert_ids), fields(count = cert_ids.len()))]
    pub async fn delete_many(
        &self,
        user_id: &str,
        cert_ids: &[String],
    ) -> Result<u64, RegistryError> {
        let unique: BTreeSet<&str> = cert_ids.iter().map(String::as_str).collect();
        if unique.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut missing = Vec::new();
        for id in &unique {
            if !tx.delete_certificate(user_id, id).await? {
                missing.push((*id).to_string());
            }
        }

        if !missing.is_empty() {
            tx.rollback().await?;
            warn!(user_id = %user_id, missing = ?missing, "Certificate delete rolled back");
            return Err(RegistryError::PartialFailure { missing });
        }

        tx.commit().await?;
        self.cache.invalidate(&certificates_key(user_id)).await;

        let deleted = unique.len() as u64;
        info!(user_id = %user_id, deleted, "Certificates deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
pub(crate) mod test_certs {
    #![allow(clippy::unwrap_used)]

    pub const DAY: i64 = 24 * 60 * 60;

    /// Self-signed PEM certificate valid from `not_before` to `not_after`.
    pub fn pem_valid_between(not_before: i64, not_after: i64) -> String {
        let mut params = rcgen::CertificateParams::new(vec!["kindi.test".to_string()]).unwrap();
        params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before).unwrap();
        params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after).unwrap();
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }
}

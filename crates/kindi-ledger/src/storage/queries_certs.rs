//! Certificate queries.
//!
//! Inserts and deletes happen inside a [`super::LedgerTx`]; this module holds
//! the owner- and email-scoped reads.

use super::db::{DatabaseError, LedgerDatabase};
use super::models::Certificate;

impl LedgerDatabase {
    /// Get a certificate owned by `owner_id`.
    pub async fn get_certificate(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<Certificate, DatabaseError> {
        sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Certificate {id}")))
    }

    /// List all certificates owned by an account, oldest issuance first.
    pub async fn list_certificates_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Certificate>, DatabaseError> {
        let certs = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE owner_id = ? ORDER BY issued_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(certs)
    }

    /// List certificates registered under an email, across all owners.
    pub async fn list_certificates_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Certificate>, DatabaseError> {
        let certs = sqlx::query_as::<_, Certificate>(
            "SELECT * FROM certificates WHERE owner_email = ? ORDER BY issued_at ASC, id ASC",
        )
        .bind(email)
        .fetch_all(self.pool())
        .await?;

        Ok(certs)
    }

    /// Count certificates owned by an account.
    pub async fn count_certificates(&self, owner_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}

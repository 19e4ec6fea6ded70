//! Certificate decoding and validity-window computation.

use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

/// Fields of an uploaded certificate the registry relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCertificate {
    /// DER body, PEM armour removed.
    pub der: Vec<u8>,
    pub not_before: i64,
    pub not_after: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty certificate payload")]
    Empty,

    #[error("Invalid PEM: {0}")]
    Pem(String),

    #[error("Expected a CERTIFICATE PEM block, found {0}")]
    Label(String),

    #[error("Invalid X.509 certificate: {0}")]
    X509(String),

    #[error("{0} bytes of trailing data after the certificate")]
    TrailingData(usize),
}

/// Decode a PEM or DER encoded X.509 certificate.
pub fn decode_certificate(raw: &[u8]) -> Result<DecodedCertificate, DecodeError> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    let der = if trimmed.starts_with(b"-----BEGIN") {
        let (_, pem) = parse_x509_pem(trimmed).map_err(|e| DecodeError::Pem(e.to_string()))?;
        if pem.label != "CERTIFICATE" {
            return Err(DecodeError::Label(pem.label));
        }
        pem.contents
    } else {
        raw.to_vec()
    };

    let (not_before, not_after) = {
        let (rem, cert) =
            parse_x509_certificate(&der).map_err(|e| DecodeError::X509(e.to_string()))?;
        if !rem.is_empty() {
            return Err(DecodeError::TrailingData(rem.len()));
        }
        let validity = cert.validity();
        (validity.not_before.timestamp(), validity.not_after.timestamp())
    };

    Ok(DecodedCertificate {
        der,
        not_before,
        not_after,
    })
}

/// Window during which a registered certificate is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub effective_from: i64,
    pub expires_at: i64,
}

/// Clamp a certificate's own validity to `issued_at + max_validity_secs`.
///
/// Returns `None` when nothing of the window is left: the certificate is
/// already expired at `issued_at`, or only becomes valid after the ceiling.
pub fn validity_window(
    not_before: i64,
    not_after: i64,
    issued_at: i64,
    max_validity_secs: i64,
) -> Option<ValidityWindow> {
    let expires_at = not_after.min(issued_at.saturating_add(max_validity_secs));
    if expires_at <= issued_at || not_before > expires_at {
        return None;
    }

    Some(ValidityWindow {
        effective_from: not_before,
        expires_at,
    })
}

//! use hsm_signer::error::SignerError;

use thiserror::Error;

/// Represents errors that can occur while issuing certificates or signing
/// documents with an HSM-resident key.
///
/// The variants follow the failure classes of the signing flow: a missing
/// token is non-fatal, everything touching the key is fatal for the operation
/// in flight, and encoding failures indicate a logic defect.
#[derive(Debug, Error)]
pub enum SignerError {
    /// No token is present in the configured slot.
    #[error("No token present in slot {slot}")]
    TokenAbsent { slot: usize },

    /// Missing, malformed or rejected user PIN.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The HSM failed while reading key attributes or applying the private key.
    #[error("HSM operation failed: {0}")]
    Oracle(String),

    /// The external certificate authority did not produce a certificate.
    #[error("External CA signer failed: {0}")]
    ExternalCa(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    Encoding(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    Decoding(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid process configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignerError>;

impl From<der::Error> for SignerError {
    /// Converts a `der::Error` into a `SignerError`.
    fn from(err: der::Error) -> Self {
        SignerError::Encoding(err.to_string())
    }
}

impl From<spki::Error> for SignerError {
    fn from(err: spki::Error) -> Self {
        SignerError::Encoding(err.to_string())
    }
}

impl From<rsa::Error> for SignerError {
    fn from(err: rsa::Error) -> Self {
        SignerError::Encoding(err.to_string())
    }
}

impl From<pem::PemError> for SignerError {
    fn from(err: pem::PemError) -> Self {
        SignerError::Decoding(err.to_string())
    }
}

impl From<cryptoki::error::Error> for SignerError {
    fn from(err: cryptoki::error::Error) -> Self {
        SignerError::Oracle(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_absent_display() {
        let err = SignerError::TokenAbsent { slot: 0 };
        assert_eq!(err.to_string(), "No token present in slot 0");
    }

    #[test]
    fn test_der_error_maps_to_encoding() {
        let err: SignerError = der::Error::from(der::ErrorKind::Overflow).into();
        assert!(matches!(err, SignerError::Encoding(_)));
    }
}

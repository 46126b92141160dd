//! PEM armoring for the certificates, requests and signatures this crate
//! writes to disk or hands to external tools.

use crate::error::{Result, SignerError};

pub const CERTIFICATE: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
pub const PKCS7: &str = "PKCS7";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert the first block of a PEM‑encoded string to DER‑encoded bytes,
/// requiring its label to be `label`.
pub fn pem_to_der(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    if pem.tag() != label {
        return Err(SignerError::Decoding(format!(
            "expected PEM label {label}, found {}",
            pem.tag()
        )));
    }
    Ok(pem.contents().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pem = der_to_pem(&[0x30, 0x00], PKCS7);
        assert!(pem.starts_with("-----BEGIN PKCS7-----\n"));
        assert!(!pem.contains('\r'));
        assert_eq!(pem_to_der(&pem, PKCS7).unwrap(), vec![0x30, 0x00]);
    }

    #[test]
    fn test_label_mismatch() {
        let pem = der_to_pem(&[0x30, 0x00], CERTIFICATE_REQUEST);
        let result = pem_to_der(&pem, CERTIFICATE);
        assert!(matches!(result, Err(SignerError::Decoding(_))));
    }
}

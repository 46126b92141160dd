use der::{Decode, Encode};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{BigUint, RsaPublicKey};
use sha1::{Digest, Sha1};
use spki::SubjectPublicKeyInfoOwned;

use crate::error::{Result, SignerError};
use crate::hsm::TokenSession;

/// The RSA public half of a token-resident key pair, in the
/// `SubjectPublicKeyInfo` form certificates and CSRs embed.
///
/// Encoding is deterministic: equal (modulus, exponent) pairs always produce
/// byte-identical DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    rsa: RsaPublicKey,
    spki: SubjectPublicKeyInfoOwned,
}

impl PublicKey {
    /// Builds a public key from big-endian modulus and exponent bytes as read
    /// from the token's `CKA_MODULUS` / `CKA_PUBLIC_EXPONENT` attributes.
    pub fn from_rsa_components(modulus: &[u8], public_exponent: &[u8]) -> Result<Self> {
        if modulus.iter().all(|b| *b == 0) || public_exponent.iter().all(|b| *b == 0) {
            return Err(SignerError::Encoding(
                "RSA modulus and exponent must be non-zero".to_string(),
            ));
        }

        let rsa = RsaPublicKey::new(
            BigUint::from_bytes_be(modulus),
            BigUint::from_bytes_be(public_exponent),
        )?;
        Self::from_rsa(rsa)
    }

    /// Reads the public attributes of `key` and encodes them.
    pub fn export<S: TokenSession>(session: &S, key: S::Key) -> Result<Self> {
        let components = session.rsa_public_components(key)?;
        Self::from_rsa_components(&components.modulus, &components.public_exponent)
    }

    pub fn from_rsa(rsa: RsaPublicKey) -> Result<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_key(rsa.clone())?;
        Ok(Self { rsa, spki })
    }

    /// Decodes an RSA `SubjectPublicKeyInfo`.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        Self::from_der(&spki.to_der()?)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let rsa = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| SignerError::Decoding(e.to_string()))?;
        let spki = SubjectPublicKeyInfoOwned::from_der(der)
            .map_err(|e| SignerError::Decoding(e.to_string()))?;
        Ok(Self { rsa, spki })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.spki.to_der()?)
    }

    /// PEM with the `PUBLIC KEY` label.
    pub fn to_pem(&self) -> Result<String> {
        self.rsa
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SignerError::Encoding(e.to_string()))
    }

    pub fn as_spki(&self) -> &SubjectPublicKeyInfoOwned {
        &self.spki
    }

    pub fn rsa(&self) -> &RsaPublicKey {
        &self.rsa
    }

    /// SHA-1 of the subjectPublicKey BIT STRING contents (RFC 5280 4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Vec<u8> {
        Sha1::digest(self.spki.subject_public_key.raw_bytes()).to_vec()
    }
}

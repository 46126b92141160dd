//! Signing through a key the process cannot see.
//!
//! The certificate, CSR and PKCS#7 builders hash what they sign themselves and
//! hand only the digest to a [`Signer`]. [`HsmSigner`] turns that digest into
//! an RSA PKCS#1 v1.5 signature by wrapping it in a `DigestInfo` and applying
//! the token's raw private key operation.

use const_oid::db::rfc5912::ID_SHA_256;
use der::asn1::{AnyRef, Null};
use der::Any;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::Result;
use crate::hsm::TokenSession;

/// DER of `DigestInfo { digestAlgorithm: sha256 (NULL params), digest: OCTET STRING (32) }`
/// without the digest bytes.
pub const SHA256_DIGEST_INFO_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// `sha256` with the explicit NULL parameters PKCS#1 and PKCS#7 consumers expect.
pub fn sha256_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ID_SHA_256,
        parameters: Some(null_parameters()),
    }
}

pub(crate) fn null_parameters() -> Any {
    Any::from(AnyRef::from(Null))
}

/// A SHA-256 output.
///
/// Only obtainable by hashing or from exactly 32 bytes, so a signer can never
/// be handed an unhashed or already-prefixed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Hashes `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// The one capability the builders need from a private key.
pub trait Signer {
    /// Identifier placed in the signed structure's signature algorithm field.
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned;

    /// Signs a SHA-256 digest, returning the raw signature value.
    fn sign_digest(&self, digest: &Sha256Digest) -> Result<Vec<u8>>;
}

/// RSA PKCS#1 v1.5 / SHA-256 signer bound to one private key handle on one
/// live session.
pub struct HsmSigner<'s, S: TokenSession> {
    session: &'s S,
    key: S::Key,
}

impl<'s, S: TokenSession> HsmSigner<'s, S> {
    pub fn new(session: &'s S, key: S::Key) -> Self {
        Self { session, key }
    }
}

impl<S: TokenSession> Signer for HsmSigner<'_, S> {
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        SignatureAlgorithm::Sha256WithRSA.into()
    }

    fn sign_digest(&self, digest: &Sha256Digest) -> Result<Vec<u8>> {
        // The token applies the RSA primitive directly; the hash algorithm is
        // identified by the DigestInfo we build here, never by the caller.
        let mut digest_info = Vec::with_capacity(SHA256_DIGEST_INFO_PREFIX.len() + 32);
        digest_info.extend_from_slice(&SHA256_DIGEST_INFO_PREFIX);
        digest_info.extend_from_slice(digest.as_bytes());

        self.session.sign_rsa_pkcs(self.key, &digest_info)
    }
}

//! HSM driver boundary.
//!
//! Everything above this module sees the HSM only through [`Token`] and
//! [`TokenSession`]: open an authenticated session, find or generate the RSA key
//! pair, read the public components, and apply the raw RSA PKCS#1 v1.5 private
//! key operation. The private key itself is never exposed.

pub mod login;
pub mod pin;
pub mod pkcs11;
pub mod soft;

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{Result, SignerError};

/// Object class used when looking keys up on the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Private,
    Public,
}

/// Handles to the two halves of a token-resident key pair.
#[derive(Debug, Clone, Copy)]
pub struct KeyPair<K> {
    pub private: K,
    pub public: K,
}

/// Raw public attributes of an RSA key (big-endian unsigned integers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
    pub modulus: Vec<u8>,
    pub public_exponent: Vec<u8>,
}

/// Parameters for generating a token-resident RSA key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyGenParams {
    pub modulus_bits: u64,
    pub public_exponent: Vec<u8>,
}

impl Default for RsaKeyGenParams {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            public_exponent: vec![0x01, 0x00, 0x01],
        }
    }
}

/// An authenticated session on a token.
///
/// Sessions are not shared between threads; each group of operations opens its
/// own through [`Token::with_session`].
pub trait TokenSession {
    /// Token-specific key handle.
    type Key: Copy + fmt::Debug;

    /// Returns the first key of the given class, if any.
    fn find_key(&self, class: KeyClass) -> Result<Option<Self::Key>>;

    /// Generates a token-resident RSA key pair.
    fn generate_rsa_key_pair(&self, params: &RsaKeyGenParams) -> Result<KeyPair<Self::Key>>;

    /// Reads the modulus and public exponent of a public key object.
    fn rsa_public_components(&self, key: Self::Key) -> Result<RsaPublicComponents>;

    /// Applies the raw RSA PKCS#1 v1.5 private key operation to `data`.
    ///
    /// The token performs no hashing; `data` is padded and exponentiated as is.
    fn sign_rsa_pkcs(&self, key: Self::Key, data: &[u8]) -> Result<Vec<u8>>;

    /// Closes the session, logging out if it was the last one holding the
    /// login. Implementations also release on drop, where errors are only
    /// logged.
    fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Returns the existing key pair, generating one on first use.
    fn key_pair(&self) -> Result<KeyPair<Self::Key>> {
        if let Some(private) = self.find_key(KeyClass::Private)? {
            let public = self.find_key(KeyClass::Public)?.ok_or_else(|| {
                SignerError::Oracle("private key found without a public key".to_string())
            })?;
            debug!(?private, ?public, "existing key pair found on token");
            return Ok(KeyPair { private, public });
        }

        info!("no key pair found on token, generating a new one");
        self.generate_rsa_key_pair(&RsaKeyGenParams::default())
    }
}

/// A token that sessions can be opened on.
pub trait Token {
    type Session: TokenSession;

    /// Index of the slot this token is read from.
    fn slot_index(&self) -> usize;

    /// Opens a session and logs in as the crypto user.
    ///
    /// Returns `Ok(None)` when the slot holds no token.
    fn open_session(&self) -> Result<Option<Self::Session>>;

    /// Runs `operation` inside a fresh session.
    ///
    /// The session is closed on every path once it was opened: `close` when
    /// `operation` returns, the session's `Drop` when it unwinds. Returns
    /// `Ok(None)` when no token is present.
    fn with_session<T, F>(&self, operation: F) -> Result<Option<T>>
    where
        F: FnOnce(&Self::Session) -> Result<T>,
    {
        let Some(session) = self.open_session()? else {
            let absent = SignerError::TokenAbsent {
                slot: self.slot_index(),
            };
            warn!(error = %absent, "slot is not initialized");
            return Ok(None);
        };

        let result = operation(&session);
        let closed = session.close();

        let value = result?;
        closed?;
        Ok(Some(value))
    }
}

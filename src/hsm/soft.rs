//! In-process token holding a software RSA key.
//!
//! Behaves like a PKCS#11 slot from the point of view of the signing code:
//! keys are found or generated through a session and only the raw PKCS#1 v1.5
//! primitive is offered. Login state is application-wide as on a PKCS#11
//! token: a second login fails and a logout ends it for every session. Used
//! for tests and local development.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use tracing::warn;

use super::login::LoginState;
use super::{KeyClass, KeyPair, RsaKeyGenParams, RsaPublicComponents, Token, TokenSession};
use crate::error::{Result, SignerError};

#[derive(Default)]
struct State {
    present: bool,
    key: Mutex<Option<RsaPrivateKey>>,
    fail_signing: AtomicBool,
    logged_in: AtomicBool,
    login: LoginState,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    signatures: AtomicUsize,
}

/// A software token. Clones share the same key and counters.
#[derive(Clone)]
pub struct SoftToken {
    state: Arc<State>,
}

impl Default for SoftToken {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftToken {
    /// An empty token; a key pair is generated on first use.
    pub fn new() -> Self {
        Self::from_state(true, None)
    }

    /// A token already holding `key`.
    pub fn with_key(key: RsaPrivateKey) -> Self {
        Self::from_state(true, Some(key))
    }

    /// A slot without a token.
    pub fn absent() -> Self {
        Self::from_state(false, None)
    }

    fn from_state(present: bool, key: Option<RsaPrivateKey>) -> Self {
        Self {
            state: Arc::new(State {
                present,
                key: Mutex::new(key),
                ..State::default()
            }),
        }
    }

    /// Makes every subsequent private key operation fail.
    pub fn fail_signing(&self, fail: bool) {
        self.state.fail_signing.store(fail, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }

    /// Whether the token currently holds a user login.
    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in.load(Ordering::SeqCst)
    }

    /// Number of private key operations performed.
    pub fn signatures(&self) -> usize {
        self.state.signatures.load(Ordering::SeqCst)
    }
}

impl Token for SoftToken {
    type Session = SoftSession;

    fn slot_index(&self) -> usize {
        0
    }

    fn open_session(&self) -> Result<Option<SoftSession>> {
        if !self.state.present {
            return Ok(None);
        }
        let state = &self.state;
        state.login.enter(|| {
            if state.logged_in.swap(true, Ordering::SeqCst) {
                return Err(SignerError::Authentication(
                    "user already logged in".to_string(),
                ));
            }
            Ok(())
        })?;
        state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Some(SoftSession {
            state: Arc::clone(state),
            released: false,
        }))
    }
}

pub struct SoftSession {
    state: Arc<State>,
    released: bool,
}

impl SoftSession {
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        let state = &self.state;
        state.login.leave(|| {
            if !state.logged_in.swap(false, Ordering::SeqCst) {
                return Err(SignerError::Oracle("user not logged in".to_string()));
            }
            Ok(())
        })
    }

    fn with_key<T>(&self, f: impl FnOnce(&RsaPrivateKey) -> Result<T>) -> Result<T> {
        let guard = self
            .state
            .key
            .lock()
            .map_err(|_| SignerError::Oracle("soft token lock poisoned".to_string()))?;
        let key = guard
            .as_ref()
            .ok_or_else(|| SignerError::Oracle("no key on soft token".to_string()))?;
        f(key)
    }
}

impl TokenSession for SoftSession {
    type Key = KeyClass;

    fn find_key(&self, class: KeyClass) -> Result<Option<KeyClass>> {
        let guard = self
            .state
            .key
            .lock()
            .map_err(|_| SignerError::Oracle("soft token lock poisoned".to_string()))?;
        Ok(guard.as_ref().map(|_| class))
    }

    fn generate_rsa_key_pair(&self, params: &RsaKeyGenParams) -> Result<KeyPair<KeyClass>> {
        let exponent = BigUint::from_bytes_be(&params.public_exponent);
        let key = RsaPrivateKey::new_with_exp(
            &mut rand_core::OsRng,
            params.modulus_bits as usize,
            &exponent,
        )
        .map_err(|e| SignerError::Oracle(format!("key generation failed: {e}")))?;

        let mut guard = self
            .state
            .key
            .lock()
            .map_err(|_| SignerError::Oracle("soft token lock poisoned".to_string()))?;
        *guard = Some(key);

        Ok(KeyPair {
            private: KeyClass::Private,
            public: KeyClass::Public,
        })
    }

    fn rsa_public_components(&self, key: KeyClass) -> Result<RsaPublicComponents> {
        if key != KeyClass::Public {
            return Err(SignerError::Oracle("not a public key handle".to_string()));
        }
        self.with_key(|private| {
            Ok(RsaPublicComponents {
                modulus: private.n().to_bytes_be(),
                public_exponent: private.e().to_bytes_be(),
            })
        })
    }

    fn sign_rsa_pkcs(&self, key: KeyClass, data: &[u8]) -> Result<Vec<u8>> {
        if key != KeyClass::Private {
            return Err(SignerError::Oracle("not a private key handle".to_string()));
        }
        if !self.state.logged_in.load(Ordering::SeqCst) {
            return Err(SignerError::Oracle("user not logged in".to_string()));
        }
        if self.state.fail_signing.load(Ordering::SeqCst) {
            return Err(SignerError::Oracle("device error".to_string()));
        }
        self.state.signatures.fetch_add(1, Ordering::SeqCst);
        self.with_key(|private| {
            private
                .sign(Pkcs1v15Sign::new_unprefixed(), data)
                .map_err(|e| SignerError::Oracle(format!("RSA PKCS#1 sign failed: {e}")))
        })
    }

    fn close(mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for SoftSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "logout failed while dropping soft session");
        }
    }
}

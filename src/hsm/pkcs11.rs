//! PKCS#11 token backed by cryptoki.
//!
//! The module is loaded and initialized once per process and finalized when
//! the token is dropped. Sessions are opened and closed per group of
//! operations and share one login through [`LoginState`], so concurrent
//! requests never log each other out.

use std::path::Path;
use std::sync::Arc;

use cryptoki::context::{CInitializeArgs, Function, Pkcs11};
use cryptoki::error::{Error as Pkcs11Error, RvError};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, KeyType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::{AuthPin, Ulong};
use tracing::{debug, info, warn};

use super::login::LoginState;
use super::pin::UserPin;
use super::{KeyClass, KeyPair, RsaKeyGenParams, RsaPublicComponents, Token, TokenSession};
use crate::error::{Result, SignerError};

/// A slot on a PKCS#11 module.
pub struct Pkcs11Token {
    pkcs11: Pkcs11,
    slot_index: usize,
    pin: Option<UserPin>,
    login: Arc<LoginState>,
}

impl Pkcs11Token {
    /// Loads and initializes the PKCS#11 module at `library_path`.
    ///
    /// A missing PIN is not an error here; opening a session reports it.
    pub fn new<P: AsRef<Path>>(
        library_path: P,
        slot_index: usize,
        pin: Option<UserPin>,
    ) -> Result<Self> {
        let pkcs11 = Pkcs11::new(library_path.as_ref()).map_err(|e| {
            SignerError::Oracle(format!(
                "Failed to load PKCS#11 library at {}: {}",
                library_path.as_ref().display(),
                e
            ))
        })?;
        pkcs11.initialize(CInitializeArgs::OsThreads)?;
        info!(library = %library_path.as_ref().display(), "PKCS#11 module initialized");

        Ok(Self {
            pkcs11,
            slot_index,
            pin,
            login: Arc::new(LoginState::new()),
        })
    }
}

impl Token for Pkcs11Token {
    type Session = Pkcs11Session;

    fn slot_index(&self) -> usize {
        self.slot_index
    }

    fn open_session(&self) -> Result<Option<Pkcs11Session>> {
        let slots = self.pkcs11.get_all_slots()?;
        let Some(slot) = slots.get(self.slot_index).copied() else {
            return Ok(None);
        };

        if !self.pkcs11.get_slot_info(slot)?.token_present() {
            return Ok(None);
        }

        let pin = self.pin.as_ref().ok_or_else(|| {
            SignerError::Authentication("no crypto-user PIN configured".to_string())
        })?;

        let session = self.pkcs11.open_rw_session(slot)?;
        self.login.enter(|| {
            match session.login(UserType::User, Some(&AuthPin::new(pin.login_pin()))) {
                Ok(()) => Ok(()),
                // Another application-wide login is still in effect.
                Err(Pkcs11Error::Pkcs11(RvError::UserAlreadyLoggedIn, Function::Login)) => {
                    warn!("token reported user already logged in, reusing login");
                    Ok(())
                }
                Err(e) => Err(SignerError::Authentication(format!(
                    "login as {} failed: {}",
                    pin.username(),
                    e
                ))),
            }
        })?;
        debug!(
            slot = self.slot_index,
            open = self.login.open_sessions(),
            "HSM session opened"
        );

        Ok(Some(Pkcs11Session {
            session,
            login: Arc::clone(&self.login),
            released: false,
        }))
    }
}

/// A logged-in read/write session.
///
/// Dropping the session releases its share of the login, so an unwinding
/// operation cannot leave the token logged in.
pub struct Pkcs11Session {
    session: Session,
    login: Arc<LoginState>,
    released: bool,
}

impl Pkcs11Session {
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let session = &self.session;
        self.login.leave(|| session.logout().map_err(Into::into))
    }
}

impl Drop for Pkcs11Session {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "logout failed while dropping HSM session");
        }
    }
}

impl TokenSession for Pkcs11Session {
    type Key = ObjectHandle;

    fn find_key(&self, class: KeyClass) -> Result<Option<ObjectHandle>> {
        let class = match class {
            KeyClass::Private => ObjectClass::PRIVATE_KEY,
            KeyClass::Public => ObjectClass::PUBLIC_KEY,
        };
        let template = vec![Attribute::Class(class), Attribute::KeyType(KeyType::RSA)];

        Ok(self.session.find_objects(&template)?.into_iter().next())
    }

    fn generate_rsa_key_pair(&self, params: &RsaKeyGenParams) -> Result<KeyPair<ObjectHandle>> {
        let pub_template = vec![
            Attribute::KeyType(KeyType::RSA),
            Attribute::ModulusBits(Ulong::from(params.modulus_bits)),
            Attribute::PublicExponent(params.public_exponent.clone()),
            Attribute::Token(true),
            Attribute::Verify(true),
            Attribute::Encrypt(true),
            Attribute::Wrap(true),
        ];

        let priv_template = vec![
            Attribute::KeyType(KeyType::RSA),
            Attribute::Token(true),
            Attribute::Private(true),
            Attribute::Sensitive(true),
            Attribute::Sign(true),
            Attribute::Decrypt(true),
            Attribute::Unwrap(true),
            Attribute::Extractable(false),
        ];

        let (public, private) = self.session.generate_key_pair(
            &Mechanism::RsaPkcsKeyPairGen,
            &pub_template,
            &priv_template,
        )?;
        info!(bits = params.modulus_bits, "generated RSA key pair on token");

        Ok(KeyPair { private, public })
    }

    fn rsa_public_components(&self, key: ObjectHandle) -> Result<RsaPublicComponents> {
        let attrs = self.session.get_attributes(
            key,
            &[AttributeType::Modulus, AttributeType::PublicExponent],
        )?;

        let mut modulus = None;
        let mut public_exponent = None;
        for attr in attrs {
            match attr {
                Attribute::Modulus(m) => modulus = Some(m),
                Attribute::PublicExponent(e) => public_exponent = Some(e),
                _ => {}
            }
        }

        match (modulus, public_exponent) {
            (Some(modulus), Some(public_exponent)) => Ok(RsaPublicComponents {
                modulus,
                public_exponent,
            }),
            _ => Err(SignerError::Oracle(
                "public key is missing its modulus or exponent".to_string(),
            )),
        }
    }

    fn sign_rsa_pkcs(&self, key: ObjectHandle, data: &[u8]) -> Result<Vec<u8>> {
        // CKM_RSA_PKCS, not CKM_SHA256_RSA_PKCS: the input is already a DigestInfo.
        self.session
            .sign(&Mechanism::RsaPkcs, key, data)
            .map_err(|e| SignerError::Oracle(format!("RSA PKCS#1 sign failed: {e}")))
    }

    fn close(mut self) -> Result<()> {
        let released = self.release();
        drop(self);
        debug!("HSM session closed");
        released
    }
}

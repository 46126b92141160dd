//! # hsm-signer - Detached PKCS#7 signing with an HSM-resident key
//!
//! hsm-signer issues X.509 certificates for an RSA key pair that lives inside a
//! PKCS#11 token and uses that key to produce detached PKCS#7 (CMS) signatures
//! over arbitrary document bytes. The private key never leaves the token: the
//! certificate, CSR and PKCS#7 builders hash what they sign themselves and
//! hand only a SHA-256 digest to a [`signer::Signer`].
//!
//! ## Certificates
//!
//! Two certificates are provisioned at startup, both for the same key and the
//! same fixed subject:
//! - **self-signed**: built in-process and signed by the token key
//! - **CA-issued**: a PKCS#10 request countersigned by an operator-provisioned
//!   CA through the `openssl` command line tool
//!
//! Either may be unavailable; signing under an unavailable certificate yields
//! no signature rather than an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hsm_signer::{
//!     cert::{Certificate, params::Validity},
//!     hsm::{Token, TokenSession, soft::SoftToken},
//!     key::PublicKey,
//!     pkcs7::Pkcs7Builder,
//!     signer::HsmSigner,
//! };
//!
//! # fn main() -> Result<(), hsm_signer::error::SignerError> {
//! let token = SoftToken::new();
//!
//! let p7 = token.with_session(|session| {
//!     let keys = session.key_pair()?;
//!     let public_key = PublicKey::export(session, keys.public)?;
//!     let signer = HsmSigner::new(session, keys.private);
//!
//!     let validity = Validity::self_signed_at(time::OffsetDateTime::now_utc())?;
//!     let certificate = Certificate::new_self_signed(&public_key, &signer, validity)?;
//!
//!     Pkcs7Builder::new(&certificate).sign_detached(b"hello world", &signer)
//! })?;
//!
//! println!("signature: {} bytes", p7.map(|der| der.len()).unwrap_or(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use hsm_signer::{error::SignerError, hsm::pin::UserPin};
//!
//! match "no-separator".parse::<UserPin>() {
//!     Ok(_) => println!("PIN accepted"),
//!     Err(SignerError::Authentication(msg)) => println!("Bad PIN: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`hsm`]: Token and session traits, the PKCS#11 token and a software token
//! - [`signer`]: The digest-signing capability and its HSM adapter
//! - [`key`]: Public key export from token attributes
//! - [`cert`]: Certificate creation, extensions and encoding
//! - [`csr`]: PKCS#10 certification requests
//! - [`ca`]: External certificate authorities
//! - [`pkcs7`]: Detached SignedData
//! - [`service`]: Certificate provisioning and per-request signing
//! - [`http`]: The HTTP surface
//! - [`settings`]: Environment configuration
//! - [`error`]: Error types

pub mod ca;
pub mod cert;
pub mod csr;
pub mod error;
pub mod hsm;
pub mod http;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod pkcs7;
pub mod service;
pub mod settings;
pub mod signer;
pub mod tbs_certificate;

//! Process configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use crate::ca::OpensslCa;
use crate::error::{Result, SignerError};
use crate::hsm::pin::UserPin;

pub const DEFAULT_PKCS11_LIBRARY: &str = "/opt/cloudhsm/lib/libcloudhsm_pkcs11.so";
pub const DEFAULT_PORT: u16 = 3756;
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 720;

#[derive(Debug, Clone)]
pub struct Settings {
    pub pkcs11_library: PathBuf,
    pub slot_index: usize,
    /// `None` when `PIN` is unset or malformed; sessions then fail to log in.
    pub pin: Option<UserPin>,
    pub port: u16,
    pub artifact_dir: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    pub openssl: PathBuf,
    pub ca_validity_days: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let artifact_dir = PathBuf::from(
            lookup("ARTIFACT_DIR").unwrap_or_else(|| DEFAULT_ARTIFACT_DIR.to_string()),
        );

        let pin = match lookup("PIN") {
            Some(value) => match value.parse::<UserPin>() {
                Ok(pin) => Some(pin),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed PIN");
                    None
                }
            },
            None => {
                tracing::warn!("PIN is not set, HSM sessions will fail to authenticate");
                None
            }
        };

        Ok(Self {
            pkcs11_library: PathBuf::from(
                lookup("PKCS11_LIBRARY").unwrap_or_else(|| DEFAULT_PKCS11_LIBRARY.to_string()),
            ),
            slot_index: parse_or(&lookup, "HSM_SLOT", 0)?,
            pin,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            ca_cert: lookup("CA_CERT")
                .map(PathBuf::from)
                .unwrap_or_else(|| artifact_dir.join("ca.cert.pem")),
            ca_key: lookup("CA_KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|| artifact_dir.join("ca.key")),
            openssl: PathBuf::from(lookup("OPENSSL_BIN").unwrap_or_else(|| "openssl".to_string())),
            ca_validity_days: parse_or(&lookup, "CA_VALIDITY_DAYS", DEFAULT_CA_VALIDITY_DAYS)?,
            artifact_dir,
        })
    }

    /// The CA collaborator these settings describe, writing into the artifact directory.
    pub fn openssl_ca(&self) -> OpensslCa {
        OpensslCa::builder()
            .ca_cert(self.ca_cert.clone())
            .ca_key(self.ca_key.clone())
            .work_dir(self.artifact_dir.clone())
            .program(self.openssl.clone())
            .days(self.ca_validity_days)
            .build()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|e| SignerError::Config(format!("{key} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

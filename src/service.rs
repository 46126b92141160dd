//! Startup provisioning of the two signing certificates and per-request
//! detached signing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::ca::CertificateAuthority;
use crate::cert::Certificate;
use crate::cert::params::{DistinguishedName, Validity};
use crate::csr::CertificationRequest;
use crate::error::{Result, SignerError};
use crate::hsm::{Token, TokenSession};
use crate::key::PublicKey;
use crate::pkcs7;
use crate::signer::HsmSigner;

/// File name of the persisted self-signed certificate.
pub const SELF_SIGNED_CERT_FILE: &str = "cert.pem";

/// Which certificate a signature is made under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SigningMode {
    #[default]
    SelfSigned,
    Ca,
}

impl SigningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningMode::SelfSigned => "self-signed",
            SigningMode::Ca => "ca",
        }
    }
}

impl fmt::Display for SigningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningMode {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "self-signed" => Ok(SigningMode::SelfSigned),
            "ca" => Ok(SigningMode::Ca),
            other => Err(SignerError::InvalidInput(format!(
                "unknown signing mode '{other}', expected 'self-signed' or 'ca'"
            ))),
        }
    }
}

/// Directory the PEM artifacts are written to.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Writes `contents` to `name`, creating the directory on demand.
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);
        fs::write(&path, contents)?;
        debug!(path = %path.display(), "artifact written");
        Ok(path)
    }
}

/// The two certificates the service signs under, fixed after startup.
///
/// A `None` entry means that mode is unavailable.
#[derive(Debug, Clone, Default)]
pub struct Certificates {
    pub self_signed: Option<Certificate>,
    pub ca_issued: Option<Certificate>,
}

impl Certificates {
    /// Builds both certificates, self-signed first. Each flow fails on its
    /// own; a failure is logged and leaves that mode unavailable.
    pub fn provision<T: Token>(
        token: &T,
        ca: &dyn CertificateAuthority,
        artifacts: &ArtifactStore,
    ) -> Self {
        let self_signed = match provision_self_signed(token, artifacts) {
            Ok(Some(cert)) => Some(cert),
            Ok(None) => {
                warn!("no token present, self-signed mode unavailable");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to create self-signed certificate");
                None
            }
        };

        let ca_issued = match provision_ca_issued(token, ca) {
            Ok(Some(cert)) => Some(cert),
            Ok(None) => {
                warn!("no token present, CA mode unavailable");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to obtain CA-issued certificate");
                None
            }
        };

        info!(
            self_signed = self_signed.is_some(),
            ca = ca_issued.is_some(),
            "certificates provisioned"
        );
        Self {
            self_signed,
            ca_issued,
        }
    }

    pub fn get(&self, mode: SigningMode) -> Option<&Certificate> {
        match mode {
            SigningMode::SelfSigned => self.self_signed.as_ref(),
            SigningMode::Ca => self.ca_issued.as_ref(),
        }
    }
}

fn provision_self_signed<T: Token>(
    token: &T,
    artifacts: &ArtifactStore,
) -> Result<Option<Certificate>> {
    let Some(cert) = token.with_session(|session| {
        let keys = session.key_pair()?;
        let public_key = PublicKey::export(session, keys.public)?;
        let signer = HsmSigner::new(session, keys.private);
        let validity = Validity::self_signed_at(OffsetDateTime::now_utc())?;
        Certificate::new_self_signed(&public_key, &signer, validity)
    })?
    else {
        return Ok(None);
    };

    let path = artifacts.write(SELF_SIGNED_CERT_FILE, &cert.to_pem()?)?;
    info!(path = %path.display(), "self-signed certificate created");
    Ok(Some(cert))
}

fn provision_ca_issued<T: Token>(
    token: &T,
    ca: &dyn CertificateAuthority,
) -> Result<Option<Certificate>> {
    let Some(request) = token.with_session(|session| {
        let keys = session.key_pair()?;
        let public_key = PublicKey::export(session, keys.public)?;
        let signer = HsmSigner::new(session, keys.private);
        CertificationRequest::new(&DistinguishedName::signer_identity(), &public_key, &signer)
    })?
    else {
        return Ok(None);
    };
    debug!("certification request created");

    // The CA runs after the session is closed; it never needs the token.
    ca.issue(&request).map(Some)
}

/// Produces detached PKCS#7 signatures with the token's key.
pub struct SigningService<T: Token> {
    token: T,
    certificates: Certificates,
}

impl<T: Token> SigningService<T> {
    pub fn new(token: T, certificates: Certificates) -> Self {
        Self {
            token,
            certificates,
        }
    }

    pub fn certificates(&self) -> &Certificates {
        &self.certificates
    }

    /// Signs `content` under the certificate selected by `mode`.
    ///
    /// Returns `Ok(None)` when no token is present or the mode's certificate
    /// is unavailable. A session is opened for the request and closed before
    /// returning on every path.
    pub fn sign(&self, mode: SigningMode, content: &[u8]) -> Result<Option<Vec<u8>>> {
        let signed = self.token.with_session(|session| {
            let keys = session.key_pair()?;
            let Some(certificate) = self.certificates.get(mode) else {
                warn!(%mode, "certificate unavailable for signing mode");
                return Ok(None);
            };
            let signer = HsmSigner::new(session, keys.private);
            pkcs7::build_detached_signature(content, certificate, &signer).map(Some)
        })?;

        Ok(signed.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("self-signed".parse::<SigningMode>().unwrap(), SigningMode::SelfSigned);
        assert_eq!("ca".parse::<SigningMode>().unwrap(), SigningMode::Ca);
        assert!(matches!(
            "CA".parse::<SigningMode>(),
            Err(SignerError::InvalidInput(_))
        ));
        assert_eq!(SigningMode::default(), SigningMode::SelfSigned);
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in [SigningMode::SelfSigned, SigningMode::Ca] {
            assert_eq!(mode.to_string().parse::<SigningMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_artifact_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"));
        let path = store.write("cert.pem", "pem").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "pem");
    }
}

//! Countersigning requests with an operator-provisioned CA.
//!
//! [`CertificateAuthority`] is the seam between the request builder and
//! whoever owns the CA key. [`OpensslCa`] hands the request to the `openssl`
//! command line tool; an in-process CA only has to implement the same trait.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use bon::Builder;
use tracing::{debug, info};

use crate::cert::Certificate;
use crate::csr::CertificationRequest;
use crate::error::{Result, SignerError};

/// File the request is written to before the CA tool is run.
pub const CSR_FILE: &str = "client-csr.pem";
/// File the CA tool writes the issued certificate to.
pub const ISSUED_CERT_FILE: &str = "client-cert.pem";

/// Turns a certification request into a certificate.
pub trait CertificateAuthority {
    fn issue(&self, request: &CertificationRequest) -> Result<Certificate>;
}

/// A CA driven through `openssl x509 -req`.
///
/// # Fields
/// * `ca_cert` - PEM certificate of the CA.
/// * `ca_key` - PEM private key of the CA.
/// * `work_dir` - Directory receiving the request and the issued certificate.
/// * `program` - The openssl executable, `openssl` on the `PATH` by default.
/// * `days` - Validity of issued certificates, 720 days by default.
#[derive(Debug, Clone, Builder)]
pub struct OpensslCa {
    #[builder(into)]
    pub ca_cert: PathBuf,
    #[builder(into)]
    pub ca_key: PathBuf,
    #[builder(into)]
    pub work_dir: PathBuf,
    #[builder(into, default = PathBuf::from("openssl"))]
    pub program: PathBuf,
    #[builder(default = 720)]
    pub days: u32,
}

impl OpensslCa {
    pub fn csr_path(&self) -> PathBuf {
        self.work_dir.join(CSR_FILE)
    }

    pub fn issued_cert_path(&self) -> PathBuf {
        self.work_dir.join(ISSUED_CERT_FILE)
    }

    fn run(&self, csr_path: &Path, out_path: &Path) -> Result<()> {
        let days = self.days.to_string();
        debug!(program = %self.program.display(), days = self.days, "running CA signer");

        let output = Command::new(&self.program)
            .arg("x509")
            .arg("-req")
            .args(["-days", days.as_str()])
            .arg("-in")
            .arg(csr_path)
            .arg("-CA")
            .arg(&self.ca_cert)
            .arg("-CAkey")
            .arg(&self.ca_key)
            .arg("-CAcreateserial")
            .arg("-out")
            .arg(out_path)
            .output()
            .map_err(|e| {
                SignerError::ExternalCa(format!(
                    "failed to launch {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(SignerError::ExternalCa(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl CertificateAuthority for OpensslCa {
    fn issue(&self, request: &CertificationRequest) -> Result<Certificate> {
        fs::create_dir_all(&self.work_dir)?;

        let csr_path = self.csr_path();
        let out_path = self.issued_cert_path();
        fs::write(&csr_path, request.to_pem()?)?;

        // A certificate left over from an earlier run must not pass for this one.
        if out_path.exists() {
            fs::remove_file(&out_path)?;
        }

        self.run(&csr_path, &out_path)?;

        let pem = fs::read_to_string(&out_path).map_err(|e| {
            SignerError::ExternalCa(format!(
                "no certificate at {}: {e}",
                out_path.display()
            ))
        })?;
        let cert = Certificate::from_pem(&pem)?;
        info!(path = %out_path.display(), "CA-issued certificate received");
        Ok(cert)
    }
}

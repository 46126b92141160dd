use der::asn1::{BitString, SetOfVec};
use der::{Decode, Encode};
use rsa::Pkcs1v15Sign;
use sha2::{Digest, Sha256};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::params::DistinguishedName;
use crate::error::{Result, SignerError};
use crate::key::PublicKey;
use crate::pem_utils;
use crate::signer::{Sha256Digest, Signer};

/// A PKCS#10 certification request signed through a [`Signer`].
///
/// The request carries no attributes; the external CA decides the extensions
/// of the certificate it issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationRequest {
    pub inner: CertReq,
}

impl CertificationRequest {
    /// Builds and signs a request for `subject` and `public_key`.
    pub fn new(
        subject: &DistinguishedName,
        public_key: &PublicKey,
        signer: &dyn Signer,
    ) -> Result<Self> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: subject.as_x509_name()?,
            public_key: public_key.as_spki().clone(),
            attributes: SetOfVec::new(),
        };

        let digest = Sha256Digest::of(&info.to_der()?);
        let signature = signer.sign_digest(&digest)?;

        Ok(Self {
            inner: CertReq {
                info,
                algorithm: signer.signature_algorithm(),
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    /// PEM with the `CERTIFICATE REQUEST` label.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(
            &self.to_der()?,
            pem_utils::CERTIFICATE_REQUEST,
        ))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der).map_err(|e| SignerError::Decoding(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(
            pem,
            pem_utils::CERTIFICATE_REQUEST,
        )?)
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
    }

    /// Checks the request's signature against its own public key.
    pub fn verify(&self) -> Result<()> {
        if self.inner.algorithm.oid != const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION {
            return Err(SignerError::InvalidInput(format!(
                "unsupported CSR signature algorithm {}",
                self.inner.algorithm.oid
            )));
        }

        let hashed = Sha256::digest(self.inner.info.to_der()?);
        self.public_key()?
            .rsa()
            .verify(
                Pkcs1v15Sign::new::<Sha256>(),
                &hashed,
                self.inner.signature.raw_bytes(),
            )
            .map_err(|e| SignerError::InvalidInput(format!("CSR signature invalid: {e}")))
    }
}

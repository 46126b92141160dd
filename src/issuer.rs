use der::Encode;
use der::asn1::BitString;
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::cert::params::{DistinguishedName, ExtensionParam, Validity};
use crate::error::Result;
use crate::key::PublicKey;
use crate::signer::{Sha256Digest, Signer};
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// The issuing key is only reachable through a [`Signer`], so an issuer never
/// holds private key material itself.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> DistinguishedName;

    /// Returns the signer holding the issuer's key.
    fn signer(&self) -> &dyn Signer;

    /// Returns the serial number given to the next issued certificate.
    fn serial_number(&self) -> Vec<u8>;

    /// Issues a certificate for `subject` and `subject_public_key`.
    ///
    /// The TBS certificate is DER-encoded, hashed with SHA-256 and the digest
    /// handed to the signer.
    fn issue(
        &self,
        subject: &DistinguishedName,
        subject_public_key: &PublicKey,
        extensions: Vec<ExtensionParam>,
        validity: Validity,
    ) -> Result<Certificate> {
        let signer = self.signer();
        let signature_algorithm = signer.signature_algorithm();

        let tbs_cert = TbsCertificate {
            serial_number: self.serial_number(),
            signature_algorithm: signature_algorithm.clone(),
            issuer: self.issuer_name(),
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: subject.clone(),
            subject_public_key: subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let digest = Sha256Digest::of(&tbs_cert_inner.to_der()?);
        let signature = signer.sign_digest(&digest)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer for self-signed certificates: the issuer name is the subject's and
/// the signer holds the subject's own key.
pub struct SelfIssuer<'a> {
    name: DistinguishedName,
    signer: &'a dyn Signer,
}

impl<'a> SelfIssuer<'a> {
    pub fn new(name: DistinguishedName, signer: &'a dyn Signer) -> Self {
        Self { name, signer }
    }
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> DistinguishedName {
        self.name.clone()
    }

    fn signer(&self) -> &dyn Signer {
        self.signer
    }

    fn serial_number(&self) -> Vec<u8> {
        vec![1]
    }
}

//! Detached PKCS#7 (CMS) SignedData.
//!
//! The output contains the signer certificate and one signer info with the
//! content-type, message-digest and signing-time signed attributes, but not
//! the signed content itself. Two digests are involved: the message digest of
//! the content, stored as an attribute, and the digest of the encoded signed
//! attributes, which is what the [`Signer`] actually signs.

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use const_oid::db::rfc5911::{
    ID_CONTENT_TYPE, ID_DATA, ID_MESSAGE_DIGEST, ID_SIGNED_DATA, ID_SIGNING_TIME,
};
use der::asn1::{OctetString, SetOfVec, UtcTime};
use der::oid::ObjectIdentifier;
use der::{Any, Encode};
use time::OffsetDateTime;
use tracing::debug;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{Result, SignerError};
use crate::pem_utils;
use crate::signer::{Sha256Digest, Signer, sha256_algorithm};

/// Builds a detached SignedData for one certificate.
///
/// ```no_run
/// # use hsm_signer::{cert::Certificate, pkcs7::Pkcs7Builder, signer::Signer};
/// # fn sign(cert: &Certificate, signer: &dyn Signer) -> hsm_signer::error::Result<Vec<u8>> {
/// let der = Pkcs7Builder::new(cert).sign_detached(b"hello world", signer)?;
/// # Ok(der)
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pkcs7Builder<'c> {
    certificate: &'c Certificate,
    signing_time: Option<OffsetDateTime>,
}

impl<'c> Pkcs7Builder<'c> {
    pub fn new(certificate: &'c Certificate) -> Self {
        Self {
            certificate,
            signing_time: None,
        }
    }

    /// Overrides the signing time, which defaults to the time of signing.
    pub fn signing_time(mut self, at: OffsetDateTime) -> Self {
        self.signing_time = Some(at);
        self
    }

    /// Signed attributes for `content`, in DER SET OF order.
    pub fn signed_attributes(&self, content: &[u8], at: OffsetDateTime) -> Result<SignedAttributes> {
        let message_digest = Sha256Digest::of(content);
        let signing_time = UtcTime::from_system_time(at.into())
            .map_err(|e| SignerError::Encoding(format!("signing time {at}: {e}")))?;

        let attributes = vec![
            attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA)?)?,
            attribute(
                ID_MESSAGE_DIGEST,
                Any::encode_from(&OctetString::new(message_digest.as_bytes().to_vec())?)?,
            )?,
            attribute(
                ID_SIGNING_TIME,
                Any::encode_from(&Time::UtcTime(signing_time))?,
            )?,
        ];

        Ok(SetOfVec::try_from(attributes)?)
    }

    /// Signs `content` and returns the DER of the ContentInfo wrapping the
    /// SignedData. `content` is not embedded.
    pub fn sign_detached(self, content: &[u8], signer: &dyn Signer) -> Result<Vec<u8>> {
        let at = self.signing_time.unwrap_or_else(OffsetDateTime::now_utc);
        let signed_attrs = self.signed_attributes(content, at)?;

        // The signature covers the attributes encoded with the universal SET
        // tag, not the [0] IMPLICIT tag they carry inside the SignerInfo.
        let signature = signer.sign_digest(&Sha256Digest::of(&signed_attrs.to_der()?))?;

        let tbs = &self.certificate.inner.tbs_certificate;
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: tbs.issuer.clone(),
                serial_number: tbs.serial_number.clone(),
            }),
            digest_alg: sha256_algorithm(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: SignatureAlgorithm::RsaEncryption.into(),
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![sha256_algorithm()])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(SetOfVec::try_from(vec![
                CertificateChoices::Certificate(self.certificate.inner.clone()),
            ])?)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };

        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data)?,
        };

        let der = content_info.to_der()?;
        debug!(content_len = content.len(), p7_len = der.len(), "built detached PKCS#7");
        Ok(der)
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// Builds a detached signature over `content` with the current time as the
/// signing time.
pub fn build_detached_signature(
    content: &[u8],
    certificate: &Certificate,
    signer: &dyn Signer,
) -> Result<Vec<u8>> {
    Pkcs7Builder::new(certificate).sign_detached(content, signer)
}

/// PEM with the `PKCS7` label, as `openssl smime -inform PEM` reads it.
pub fn to_pem(der: &[u8]) -> String {
    pem_utils::der_to_pem(der, pem_utils::PKCS7)
}

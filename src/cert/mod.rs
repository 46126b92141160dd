pub mod extensions;
pub mod params;

use std::net::{IpAddr, Ipv4Addr};

use der::{Decode, Encode, EncodePem};
use der::flagset::FlagSet;
use x509_cert::certificate::CertificateInner;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{Result, SignerError};
use crate::issuer::{Issuer, SelfIssuer};
use crate::key::PublicKey;
use crate::pem_utils;
use crate::signer::{Signer, null_parameters};
use crate::tbs_certificate::TbsCertificate;
use extensions::{
    AltName, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage, KeyUsages,
    NetscapeCertType, SubjectAltName, SubjectKeyIdentifier,
};
use params::{DistinguishedName, ExtensionParam, Validity};

/// Placeholder WebID carried in the signing certificate's subjectAltName.
pub const SIGNER_WEBID: &str = "http://example.org/webid#me";

/// Represents the supported signature algorithms.
///
/// Both carry explicit NULL parameters, as RFC 4055 requires for RSA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption, used for certificates and CSRs.
    Sha256WithRSA,
    /// Plain rsaEncryption, used as the PKCS#7 signer info signature algorithm.
    RsaEncryption,
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    fn from(value: SignatureAlgorithm) -> Self {
        let oid = match value {
            SignatureAlgorithm::Sha256WithRSA => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::RsaEncryption => const_oid::db::rfc5912::RSA_ENCRYPTION,
        };
        AlgorithmIdentifierOwned {
            oid,
            parameters: Some(null_parameters()),
        }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| SignerError::Encoding(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner =
            CertificateInner::from_der(der).map_err(|e| SignerError::Decoding(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parses the first PEM block of `pem`, which must be a `CERTIFICATE`.
    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_utils::pem_to_der(pem, pem_utils::CERTIFICATE)?)
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.inner.tbs_certificate.serial_number
    }

    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn validity(&self) -> Result<Validity> {
        let tbs = self.tbs_certificate()?;
        Ok(Validity {
            not_before: tbs.not_before,
            not_after: tbs.not_after,
        })
    }

    pub fn subject_public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// Extensions in certificate order, values still DER-encoded.
    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        Ok(self.tbs_certificate()?.extensions)
    }

    /// Decodes the to-be-signed part into its parameter form.
    pub fn tbs_certificate(&self) -> Result<TbsCertificate> {
        TbsCertificate::from_tbs_certificate_inner(self.inner.tbs_certificate.clone())
    }

    /// Creates the self-signed signing certificate for `public_key`.
    ///
    /// Subject and issuer are [`DistinguishedName::signer_identity`], the
    /// serial number is 1 and the extensions are those of
    /// [`signing_certificate_extensions`]. The signature is produced by
    /// `signer`, whose key must be the private half of `public_key`.
    pub fn new_self_signed(
        public_key: &PublicKey,
        signer: &dyn Signer,
        validity: Validity,
    ) -> Result<Self> {
        let identity = DistinguishedName::signer_identity();

        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer::new(identity.clone(), signer);

        let extensions = signing_certificate_extensions(public_key)?;
        self_issuer.issue(&identity, public_key, extensions, validity)
    }
}

/// The extension set of the self-signed signing certificate, in encoding
/// order. None of them is marked critical.
pub fn signing_certificate_extensions(public_key: &PublicKey) -> Result<Vec<ExtensionParam>> {
    let key_usage: FlagSet<KeyUsages> = KeyUsages::KeyCertSign
        | KeyUsages::DigitalSignature
        | KeyUsages::NonRepudiation
        | KeyUsages::KeyEncipherment
        | KeyUsages::DataEncipherment;

    Ok(vec![
        ExtensionParam::from_extension(
            BasicConstraints {
                is_ca: true,
                max_path_length: None,
            },
            false,
        )?,
        ExtensionParam::from_extension(KeyUsage(key_usage), false)?,
        ExtensionParam::from_extension(
            ExtendedKeyUsage {
                usage: vec![
                    ExtendedKeyUsageOption::ServerAuth,
                    ExtendedKeyUsageOption::ClientAuth,
                    ExtendedKeyUsageOption::CodeSigning,
                    ExtendedKeyUsageOption::EmailProtection,
                    ExtendedKeyUsageOption::TimeStamping,
                ],
            },
            false,
        )?,
        ExtensionParam::from_extension(
            NetscapeCertType {
                client: true,
                server: true,
                email: true,
                object_signing: true,
                ssl_ca: true,
                email_ca: true,
                object_signing_ca: true,
            },
            false,
        )?,
        ExtensionParam::from_extension(
            SubjectAltName {
                names: vec![
                    AltName::Uri(SIGNER_WEBID.to_string()),
                    AltName::Ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                ],
            },
            false,
        )?,
        ExtensionParam::from_extension(SubjectKeyIdentifier(public_key.key_identifier()), false)?,
    ])
}

#[cfg(test)]
mod tests {
    use rsa::RsaPrivateKey;
    use time::macros::datetime;

    use super::*;
    use crate::cert::extensions::ToAndFromX509Extension;
    use crate::hsm::soft::SoftToken;
    use crate::hsm::{Token, TokenSession};
    use crate::signer::HsmSigner;

    fn self_signed() -> (Certificate, PublicKey) {
        let token = SoftToken::with_key(RsaPrivateKey::new(&mut rand_core::OsRng, 1024).unwrap());
        let validity = Validity::self_signed_at(datetime!(2026-01-15 08:00:00 UTC)).unwrap();
        token
            .with_session(|session| {
                let keys = session.key_pair()?;
                let public_key = PublicKey::export(session, keys.public)?;
                let signer = HsmSigner::new(session, keys.private);
                let cert = Certificate::new_self_signed(&public_key, &signer, validity)?;
                Ok((cert, public_key))
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_algorithm_identifiers_carry_null() {
        let id: AlgorithmIdentifierOwned = SignatureAlgorithm::Sha256WithRSA.into();
        assert_eq!(id.oid, const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION);
        assert!(id.to_der().unwrap().ends_with(&[0x05, 0x00]));
    }

    #[test]
    fn test_self_signed_fields() {
        let (cert, public_key) = self_signed();

        assert_eq!(cert.serial_number().as_bytes(), &[1]);
        assert_eq!(cert.subject().unwrap(), DistinguishedName::signer_identity());
        assert_eq!(cert.issuer().unwrap(), DistinguishedName::signer_identity());
        assert_eq!(cert.subject_public_key().unwrap(), public_key);

        let validity = cert.validity().unwrap();
        assert_eq!(validity.not_before, datetime!(2025-01-15 08:00:00 UTC));
        assert_eq!(validity.not_after, datetime!(2027-01-15 08:00:00 UTC));
        assert_eq!(
            cert.inner.signature_algorithm,
            cert.inner.tbs_certificate.signature
        );
    }

    #[test]
    fn test_self_signed_extension_order() {
        let (cert, public_key) = self_signed();
        let extensions = cert.extensions().unwrap();

        let oids: Vec<_> = extensions.iter().map(|ext| ext.oid).collect();
        assert_eq!(
            oids,
            vec![
                BasicConstraints::OID,
                KeyUsage::OID,
                ExtendedKeyUsage::OID,
                NetscapeCertType::OID,
                SubjectAltName::OID,
                SubjectKeyIdentifier::OID,
            ]
        );
        assert!(extensions.iter().all(|ext| !ext.critical));

        let ski: SubjectKeyIdentifier = extensions[5].to_extension().unwrap();
        assert_eq!(ski.0, public_key.key_identifier());
        let san: SubjectAltName = extensions[4].to_extension().unwrap();
        assert_eq!(san.names[0], AltName::Uri(SIGNER_WEBID.to_string()));
    }

    #[test]
    fn test_pem_round_trip() {
        let (cert, _) = self_signed();
        let pem = cert.to_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(Certificate::from_pem(&pem).unwrap(), cert);
    }
}

use std::time::SystemTime;

use der::Encode;
use der::asn1::{OctetString, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;

use crate::cert::params::{DistinguishedName, ExtensionParam};
use crate::error::{Result, SignerError};
use crate::key::PublicKey;

/// Unsigned certificate body in the crate's own types.
///
/// The issuer and subject are kept as [`DistinguishedName`]s so the same
/// value can come from a freshly assembled certificate or from a decoded one.
/// Validity is held as `OffsetDateTime` and only narrowed to UTCTime when the
/// body is encoded.
#[derive(Debug, Clone)]
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub issuer: DistinguishedName,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Builds the x509-cert structure that gets signed. Fails if a validity
    /// bound lies outside the UTCTime range (1950..2050).
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| -> Result<x509_cert::ext::Extension> {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: utc_time(self.not_before)?,
            not_after: utc_time(self.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: SerialNumber::new(self.serial_number.as_slice())?,
            signature: self.signature_algorithm.clone(),
            issuer: self.issuer.as_x509_name()?,
            validity,
            subject: self.subject.as_x509_name()?,
            subject_public_key_info: self.subject_public_key.as_spki().clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }

    pub fn from_tbs_certificate_inner(inner: TbsCertificateInner) -> Result<Self> {
        let issuer = DistinguishedName::from_x509_name(&inner.issuer)?;
        let subject = DistinguishedName::from_x509_name(&inner.subject)?;
        let subject_public_key = PublicKey::from_x509spki(&inner.subject_public_key_info)?;

        let extensions = inner
            .extensions
            .unwrap_or_default()
            .iter()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect::<Vec<_>>();

        Ok(Self {
            serial_number: inner.serial_number.as_bytes().into(),
            signature_algorithm: inner.signature,
            issuer,
            not_before: offset_date_time(inner.validity.not_before),
            not_after: offset_date_time(inner.validity.not_after),
            subject,
            subject_public_key,
            extensions,
        })
    }

    /// The exact bytes a signer hashes.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner()?.to_der()?)
    }
}

fn utc_time(at: OffsetDateTime) -> Result<Time> {
    let system_time: SystemTime = at.into();
    UtcTime::from_system_time(system_time)
        .map(Time::UtcTime)
        .map_err(|e| SignerError::Encoding(format!("validity time {at}: {e}")))
}

fn offset_date_time(time: Time) -> OffsetDateTime {
    match time {
        Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}

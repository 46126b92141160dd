use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519::{C, CN, L, O, OU, ST};
use der::{Any, Tagged};
use der::asn1::{PrintableStringRef, SetOfVec, Utf8StringRef};
use time::{Date, Month, OffsetDateTime, Time};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{Result, SignerError};

/// Distinguished name parameters for building an X.509 certificate or CSR.
///
/// Attributes are encoded in the order CN, C, ST, L, O, OU, one per RDN, and
/// absent ones are skipped.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// The fixed identity used as subject and issuer of the signing certificates.
    pub fn signer_identity() -> Self {
        DistinguishedName::builder()
            .common_name("Sample Name".to_string())
            .country("US".to_string())
            .state("Virginia".to_string())
            .locality("Blacksburg".to_string())
            .organization("Test".to_string())
            .organization_unit("Test".to_string())
            .build()
    }

    fn attributes(&self) -> Vec<(ObjectIdentifier, &str)> {
        let optional = [
            (C, &self.country),
            (ST, &self.state),
            (L, &self.locality),
            (O, &self.organization),
            (OU, &self.organization_unit),
        ];

        std::iter::once((CN, self.common_name.as_str()))
            .chain(
                optional
                    .into_iter()
                    .filter_map(|(oid, value)| value.as_deref().map(|v| (oid, v))),
            )
            .collect()
    }

    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// The country is a PrintableString, everything else a UTF8String.
    pub fn as_x509_name(&self) -> Result<Name> {
        let rdns = self
            .attributes()
            .into_iter()
            .map(|(oid, value)| -> Result<RelativeDistinguishedName> {
                let value = if oid == C {
                    Any::encode_from(&PrintableStringRef::new(value)?)?
                } else {
                    Any::encode_from(&Utf8StringRef::new(value)?)?
                };
                let atv = AttributeTypeAndValue { oid, value };
                Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 `Name`.
    ///
    /// Attributes other than CN, C, ST, L, O and OU are ignored.
    pub fn from_x509_name(x509dn: &Name) -> Result<Self> {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let slot = match attr.oid {
                    CN => {
                        dn.common_name = directory_string(&attr.value)?;
                        continue;
                    }
                    C => &mut dn.country,
                    ST => &mut dn.state,
                    L => &mut dn.locality,
                    O => &mut dn.organization,
                    OU => &mut dn.organization_unit,
                    _ => continue,
                };
                *slot = Some(directory_string(&attr.value)?);
            }
        }

        Ok(dn)
    }
}

fn directory_string(value: &Any) -> Result<String> {
    if let Ok(s) = value.decode_as::<Utf8StringRef<'_>>() {
        return Ok(s.as_str().to_string());
    }
    if let Ok(s) = value.decode_as::<PrintableStringRef<'_>>() {
        return Ok(s.as_str().to_string());
    }
    Err(SignerError::Decoding(format!(
        "unsupported directory string tag {}",
        value.tag()
    )))
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Validity of the self-signed signing certificate built at `now`.
    ///
    /// `not_before` is one calendar year before `now` and `not_after` is two
    /// calendar years after `not_before`, both at whole-second precision.
    pub fn self_signed_at(now: OffsetDateTime) -> Result<Self> {
        let now = now
            .to_offset(time::UtcOffset::UTC)
            .replace_nanosecond(0)
            .map_err(|e| SignerError::InvalidInput(e.to_string()))?;
        let not_before = add_years(now, -1)?;
        let not_after = add_years(not_before, 2)?;
        Ok(Self {
            not_before,
            not_after,
        })
    }
}

/// Shifts `at` by whole calendar years, keeping month, day and time of day.
/// February 29 in a non-leap target year becomes March 1.
fn add_years(at: OffsetDateTime, years: i32) -> Result<OffsetDateTime> {
    let year = at.year() + years;
    let date = match Date::from_calendar_date(year, at.month(), at.day()) {
        Ok(date) => date,
        Err(_) => Date::from_calendar_date(year, Month::March, 1)
            .map_err(|e| SignerError::InvalidInput(e.to_string()))?,
    };
    let time: Time = at.time();
    Ok(date.with_time(time).assume_offset(at.offset()))
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use der::Encode;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_self_signed_validity_is_relative_to_not_before() {
        let now = datetime!(2026-10-18 12:34:56.789 UTC);
        let validity = Validity::self_signed_at(now).unwrap();
        assert_eq!(validity.not_before, datetime!(2025-10-18 12:34:56 UTC));
        assert_eq!(validity.not_after, datetime!(2027-10-18 12:34:56 UTC));
    }

    #[test]
    fn test_leap_day_rolls_forward() {
        let now = datetime!(2028-02-29 00:00:00 UTC);
        let validity = Validity::self_signed_at(now).unwrap();
        assert_eq!(validity.not_before, datetime!(2027-03-01 00:00:00 UTC));
        assert_eq!(validity.not_after, datetime!(2029-03-01 00:00:00 UTC));
    }

    #[test]
    fn test_signer_identity_round_trip() {
        let dn = DistinguishedName::signer_identity();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 6);
        assert_eq!(name.0[0].0.get(0).unwrap().oid, CN);
        assert_eq!(name.0[1].0.get(0).unwrap().oid, C);
        assert_eq!(DistinguishedName::from_x509_name(&name).unwrap(), dn);
    }

    #[test]
    fn test_absent_attributes_are_skipped() {
        let dn = DistinguishedName::builder()
            .common_name("only.cn".to_string())
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 1);
        assert!(!name.to_der().unwrap().is_empty());
    }
}

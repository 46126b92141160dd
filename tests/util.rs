#![allow(dead_code)]

use std::sync::OnceLock;

use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerInfo};
use der::Decode;
use der::oid::ObjectIdentifier;
use der::Any;
use hsm_signer::ca::CertificateAuthority;
use hsm_signer::cert::Certificate;
use hsm_signer::cert::params::{DistinguishedName, Validity};
use hsm_signer::csr::CertificationRequest;
use hsm_signer::error::{Result, SignerError};
use hsm_signer::hsm::soft::SoftToken;
use hsm_signer::hsm::{Token, TokenSession};
use hsm_signer::issuer::Issuer;
use hsm_signer::key::PublicKey;
use hsm_signer::service::Certificates;
use hsm_signer::signer::{HsmSigner, Sha256Digest, Signer};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use spki::AlgorithmIdentifierOwned;
use time::OffsetDateTime;

/// The token key shared by all tests of one test binary.
pub fn token_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand_core::OsRng, 2048).unwrap())
        .clone()
}

pub fn token() -> SoftToken {
    SoftToken::with_key(token_key())
}

pub fn token_public_key() -> RsaPublicKey {
    RsaPublicKey::from(&token_key())
}

/// Self-signed certificate for the token's key, built the way startup does.
pub fn self_signed(token: &SoftToken) -> Certificate {
    token
        .with_session(|session| {
            let keys = session.key_pair()?;
            let public_key = PublicKey::export(session, keys.public)?;
            let signer = HsmSigner::new(session, keys.private);
            let validity = Validity::self_signed_at(OffsetDateTime::now_utc())?;
            Certificate::new_self_signed(&public_key, &signer, validity)
        })
        .unwrap()
        .unwrap()
}

pub fn request(token: &SoftToken) -> CertificationRequest {
    token
        .with_session(|session| {
            let keys = session.key_pair()?;
            let public_key = PublicKey::export(session, keys.public)?;
            let signer = HsmSigner::new(session, keys.private);
            CertificationRequest::new(&DistinguishedName::signer_identity(), &public_key, &signer)
        })
        .unwrap()
        .unwrap()
}

pub fn self_signed_only(token: &SoftToken) -> Certificates {
    Certificates {
        self_signed: Some(self_signed(token)),
        ca_issued: None,
    }
}

/// A CA that is never reachable.
pub struct UnavailableCa;

impl CertificateAuthority for UnavailableCa {
    fn issue(&self, _request: &CertificationRequest) -> Result<Certificate> {
        Err(SignerError::ExternalCa("CA host unreachable".to_string()))
    }
}

/// A signer over a key held in memory.
pub struct LocalSigner(pub RsaPrivateKey);

impl Signer for LocalSigner {
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        hsm_signer::cert::SignatureAlgorithm::Sha256WithRSA.into()
    }

    fn sign_digest(&self, digest: &Sha256Digest) -> Result<Vec<u8>> {
        self.0
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes())
            .map_err(|e| SignerError::Oracle(e.to_string()))
    }
}

/// An in-process CA issuing serial 0x2a certificates.
pub struct LocalCa {
    pub name: DistinguishedName,
    pub signer: LocalSigner,
}

impl LocalCa {
    pub fn new() -> Self {
        Self {
            name: DistinguishedName::builder()
                .common_name("Test Signing CA".to_string())
                .organization("Test".to_string())
                .build(),
            signer: LocalSigner(RsaPrivateKey::new(&mut rand_core::OsRng, 1024).unwrap()),
        }
    }

    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.signer.0)
    }
}

impl Issuer for LocalCa {
    fn issuer_name(&self) -> DistinguishedName {
        self.name.clone()
    }

    fn signer(&self) -> &dyn Signer {
        &self.signer
    }

    fn serial_number(&self) -> Vec<u8> {
        vec![0x2a]
    }
}

impl CertificateAuthority for LocalCa {
    fn issue(&self, request: &CertificationRequest) -> Result<Certificate> {
        request.verify()?;
        let now = OffsetDateTime::now_utc();
        let validity = Validity {
            not_before: now.replace_nanosecond(0).unwrap(),
            not_after: now.replace_nanosecond(0).unwrap() + time::Duration::days(720),
        };
        Issuer::issue(
            self,
            &request.subject()?,
            &request.public_key()?,
            Vec::new(),
            validity,
        )
    }
}

/// Decodes a DER ContentInfo holding SignedData.
pub fn signed_data(der: &[u8]) -> SignedData {
    let content_info = ContentInfo::from_der(der).unwrap();
    assert_eq!(content_info.content_type, const_oid::db::rfc5911::ID_SIGNED_DATA);
    content_info.content.decode_as::<SignedData>().unwrap()
}

pub fn signer_info(signed_data: &SignedData) -> SignerInfo {
    assert_eq!(signed_data.signer_infos.0.len(), 1);
    signed_data.signer_infos.0.get(0).unwrap().clone()
}

pub fn signed_attribute(signer_info: &SignerInfo, oid: ObjectIdentifier) -> Any {
    signer_info
        .signed_attrs
        .as_ref()
        .unwrap()
        .iter()
        .find(|attr| attr.oid == oid)
        .unwrap()
        .values
        .get(0)
        .unwrap()
        .clone()
}

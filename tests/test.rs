mod util;

use const_oid::db::rfc5911::{ID_CONTENT_TYPE, ID_DATA, ID_MESSAGE_DIGEST, ID_SIGNING_TIME};
use der::asn1::{OctetString, UtcTime};
use der::oid::ObjectIdentifier;
use der::Encode;
use hsm_signer::ca::CertificateAuthority;
use hsm_signer::cert::Certificate;
use hsm_signer::cert::params::DistinguishedName;
use hsm_signer::error::SignerError;
use hsm_signer::hsm::soft::SoftToken;
use hsm_signer::key::PublicKey;
use hsm_signer::service::{
    ArtifactStore, Certificates, SELF_SIGNED_CERT_FILE, SigningMode, SigningService,
};
use rsa::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// The signature of a certificate made through the token verifies with the
/// token's public key.
#[test]
fn self_signed_certificate_signature_verifies() {
    let token = util::token();
    let cert = util::self_signed(&token);

    let tbs = cert.inner.tbs_certificate.to_der().unwrap();
    util::token_public_key()
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&tbs),
            cert.inner.signature.raw_bytes(),
        )
        .unwrap();
    assert_eq!(token.sessions_opened(), token.sessions_closed());
}

/// notBefore is construction time minus one year; notAfter is notBefore plus
/// exactly two years.
#[test]
fn self_signed_validity_window() {
    let before = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
    let cert = util::self_signed(&util::token());
    let after = OffsetDateTime::now_utc();

    let validity = cert.validity().unwrap();
    let not_before = validity.not_before;
    let not_after = validity.not_after;

    assert_eq!(not_after.year(), not_before.year() + 2);
    assert_eq!(not_after.month(), not_before.month());
    assert_eq!(not_after.day(), not_before.day());
    assert_eq!(not_after.time(), not_before.time());

    let built_at = not_before.replace_year(not_before.year() + 1).unwrap();
    assert!(built_at >= before && built_at <= after, "{built_at} not in [{before}, {after}]");
}

/// Re-encoding an exported public key through the standard SPKI path is
/// byte-identical.
#[test]
fn exported_public_key_round_trips() {
    let public = util::token_public_key();
    let key = PublicKey::from_rsa_components(&public.n().to_bytes_be(), &public.e().to_bytes_be())
        .unwrap();
    let der = key.to_der().unwrap();

    use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
    let decoded = rsa::RsaPublicKey::from_public_key_der(&der).unwrap();
    assert_eq!(decoded.to_public_key_der().unwrap().as_bytes(), der.as_slice());
}

/// "hello world" signed under the self-signed certificate carries the three
/// signed attributes and a signature valid under the token key.
#[test]
fn hello_world_detached_signature() {
    let token = util::token();
    let service = SigningService::new(token.clone(), util::self_signed_only(&token));

    let before = OffsetDateTime::now_utc().unix_timestamp();
    let der = service
        .sign(SigningMode::SelfSigned, b"hello world")
        .unwrap()
        .expect("self-signed mode is available");
    let after = OffsetDateTime::now_utc().unix_timestamp();

    let signed_data = util::signed_data(&der);
    assert!(signed_data.encap_content_info.econtent.is_none());
    let signer_info = util::signer_info(&signed_data);

    let content_type = util::signed_attribute(&signer_info, ID_CONTENT_TYPE);
    assert_eq!(content_type.decode_as::<ObjectIdentifier>().unwrap(), ID_DATA);

    let message_digest = util::signed_attribute(&signer_info, ID_MESSAGE_DIGEST)
        .decode_as::<OctetString>()
        .unwrap();
    assert_eq!(
        message_digest.as_bytes(),
        Sha256::digest(b"hello world").as_slice()
    );

    let signing_time = util::signed_attribute(&signer_info, ID_SIGNING_TIME)
        .decode_as::<UtcTime>()
        .unwrap();
    let signed_at = OffsetDateTime::from(signing_time.to_system_time()).unix_timestamp();
    assert!(signed_at >= before && signed_at <= after);

    let signed_attrs = signer_info.signed_attrs.as_ref().unwrap().to_der().unwrap();
    util::token_public_key()
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&signed_attrs),
            signer_info.signature.as_bytes(),
        )
        .unwrap();

    assert_eq!(token.sessions_opened(), token.sessions_closed());
}

/// The signer info points at the certificate of the selected mode.
#[test]
fn ca_mode_references_ca_issued_certificate() {
    let token = util::token();
    let ca = util::LocalCa::new();
    let dir = tempfile::tempdir().unwrap();
    let certificates = Certificates::provision(&token, &ca, &ArtifactStore::new(dir.path()));

    let ca_cert = certificates.ca_issued.clone().expect("CA certificate issued");
    assert_eq!(ca_cert.issuer().unwrap(), ca.name);
    assert_eq!(ca_cert.subject().unwrap(), DistinguishedName::signer_identity());
    assert_eq!(ca_cert.serial_number().as_bytes(), &[0x2a]);

    let service = SigningService::new(token.clone(), certificates);
    let der = service.sign(SigningMode::Ca, b"contract").unwrap().unwrap();
    let signer_info = util::signer_info(&util::signed_data(&der));

    match signer_info.sid {
        cms::signed_data::SignerIdentifier::IssuerAndSerialNumber(sid) => {
            assert_eq!(sid.issuer, ca_cert.inner.tbs_certificate.issuer);
            assert_eq!(sid.serial_number.as_bytes(), &[0x2a]);
        }
        other => panic!("unexpected signer identifier {other:?}"),
    }
}

/// CA-issued certificates carry the CA's signature, not the token's.
#[test]
fn ca_issued_certificate_is_signed_by_ca() {
    let token = util::token();
    let ca = util::LocalCa::new();
    let cert = CertificateAuthority::issue(&ca, &util::request(&token)).unwrap();

    let tbs = cert.inner.tbs_certificate.to_der().unwrap();
    ca.public_key()
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(&tbs),
            cert.inner.signature.raw_bytes(),
        )
        .unwrap();
    assert_eq!(
        cert.subject_public_key().unwrap().rsa(),
        &util::token_public_key()
    );
}

#[test]
fn ca_mode_without_ca_certificate_returns_none() {
    let token = util::token();
    let service = SigningService::new(token.clone(), util::self_signed_only(&token));
    let signatures_before = token.signatures();

    assert!(service.sign(SigningMode::Ca, b"data").unwrap().is_none());
    assert_eq!(token.signatures(), signatures_before);
    assert_eq!(token.sessions_opened(), token.sessions_closed());
}

#[test]
fn absent_token_returns_none() {
    let token = util::token();
    let certificates = util::self_signed_only(&token);
    let absent = SoftToken::absent();
    let service = SigningService::new(absent.clone(), certificates);

    assert!(service.sign(SigningMode::SelfSigned, b"data").unwrap().is_none());
    assert_eq!(absent.sessions_opened(), 0);
}

#[test]
fn oracle_failure_closes_session() {
    let token = util::token();
    let service = SigningService::new(token.clone(), util::self_signed_only(&token));
    token.fail_signing(true);

    let result = service.sign(SigningMode::SelfSigned, b"data");
    assert!(matches!(result, Err(SignerError::Oracle(_))));
    assert_eq!(token.sessions_opened(), token.sessions_closed());
}

/// Two signatures over the same content differ only in signing time and
/// signature value.
#[test]
fn repeated_signatures_differ_only_in_time_and_signature() {
    let token = util::token();
    let service = SigningService::new(token.clone(), util::self_signed_only(&token));

    let first = util::signed_data(&service.sign(SigningMode::SelfSigned, b"same").unwrap().unwrap());
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let mut second =
        util::signed_data(&service.sign(SigningMode::SelfSigned, b"same").unwrap().unwrap());

    let first_info = util::signer_info(&first);
    let second_info = util::signer_info(&second);
    assert_ne!(
        util::signed_attribute(&first_info, ID_SIGNING_TIME),
        util::signed_attribute(&second_info, ID_SIGNING_TIME)
    );
    assert_eq!(
        util::signed_attribute(&first_info, ID_MESSAGE_DIGEST),
        util::signed_attribute(&second_info, ID_MESSAGE_DIGEST)
    );

    second.signer_infos = first.signer_infos.clone();
    assert_eq!(first.to_der().unwrap(), second.to_der().unwrap());
}

/// A failing CA leaves CA mode unavailable without affecting self-signed mode,
/// and the self-signed certificate is persisted.
#[test]
fn failing_ca_does_not_block_self_signed_mode() {
    let token = util::token();
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactStore::new(dir.path().join("artifacts"));

    let certificates = Certificates::provision(&token, &util::UnavailableCa, &artifacts);
    assert!(certificates.ca_issued.is_none());
    let self_signed = certificates.self_signed.clone().unwrap();

    let persisted = std::fs::read_to_string(artifacts.path(SELF_SIGNED_CERT_FILE)).unwrap();
    assert_eq!(Certificate::from_pem(&persisted).unwrap(), self_signed);
    assert_eq!(token.sessions_opened(), token.sessions_closed());

    let service = SigningService::new(token, certificates);
    assert!(service.sign(SigningMode::SelfSigned, b"x").unwrap().is_some());
    assert!(service.sign(SigningMode::Ca, b"x").unwrap().is_none());
}

#[test]
fn provisioning_without_token_leaves_both_modes_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let certificates = Certificates::provision(
        &SoftToken::absent(),
        &util::LocalCa::new(),
        &ArtifactStore::new(dir.path()),
    );
    assert!(certificates.self_signed.is_none());
    assert!(certificates.ca_issued.is_none());
    assert!(!dir.path().join(SELF_SIGNED_CERT_FILE).exists());
}

/// An empty token gets a key pair on first use, and later sessions reuse it.
#[test]
fn key_pair_generated_once_and_reused() {
    let token = SoftToken::new();
    let first = util::self_signed(&token);
    let second = util::self_signed(&token);
    assert_eq!(
        first.subject_public_key().unwrap(),
        second.subject_public_key().unwrap()
    );
}

/// Concurrent requests share the token login; none of them logs another out.
#[test]
fn concurrent_requests_all_sign() {
    let token = util::token();
    let service = SigningService::new(token.clone(), util::self_signed_only(&token));

    let signatures: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = &service;
                scope.spawn(move || service.sign(SigningMode::SelfSigned, format!("doc {i}").as_bytes()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for signature in signatures {
        assert!(signature.unwrap().is_some());
    }
    assert_eq!(token.sessions_opened(), token.sessions_closed());
    assert!(!token.is_logged_in());
}

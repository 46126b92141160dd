//! hsm-signer - detached PKCS#7 signing with an HSM-resident RSA key

use std::net::SocketAddr;
use std::sync::Arc;

use hsm_signer::hsm::pkcs11::Pkcs11Token;
use hsm_signer::service::{ArtifactStore, Certificates, SigningService};
use hsm_signer::settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hsm_signer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting signing service");

    let settings = Settings::from_env()?;
    let token = Pkcs11Token::new(&settings.pkcs11_library, settings.slot_index, settings.pin.clone())
        .map_err(|e| format!("Failed to initialize HSM: {}", e))?;

    let artifacts = ArtifactStore::new(&settings.artifact_dir);
    let ca = settings.openssl_ca();

    // Both certificates exist (or are known to be unavailable) before the
    // first request is accepted.
    let (certificates, token) = tokio::task::spawn_blocking(move || {
        let certificates = Certificates::provision(&token, &ca, &artifacts);
        (certificates, token)
    })
    .await?;

    let service = Arc::new(SigningService::new(token, certificates));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    hsm_signer::http::run(listener, service).await?;

    Ok(())
}

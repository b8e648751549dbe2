use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use voicebridge_gateway::storage::{BlobTranscriptStore, TranscriptStore};
use voicebridge_gateway::telephony::AcsCaller;
use voicebridge_gateway::{AppState, ServerConfig, routes};

/// Voicebridge Gateway - telephony to realtime-AI relay server
#[derive(Parser, Debug)]
#[command(name = "voicebridge-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen address override (host:port)
    #[arg(short = 'l', long = "listen", value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = ServerConfig::from_env()?;
    let http = reqwest::Client::builder().build()?;

    let credential = AppState::credential_from_config(&config, http.clone())?;

    let transcript_store: Option<Arc<dyn TranscriptStore>> = match (
        &config.storage_account,
        &config.storage_access_key,
        &config.storage_container,
    ) {
        (Some(account), Some(key), Some(container)) => {
            info!(account, container, "transcript storage enabled");
            Some(Arc::new(BlobTranscriptStore::azure(account, key, container)?))
        }
        _ => {
            info!("transcript storage not configured, transcripts will be discarded");
            None
        }
    };

    let caller = match (
        &config.acs_connection_string,
        &config.acs_source_number,
        config.callback_url(),
        config.media_transport_url(),
    ) {
        (Some(connection_string), Some(source_number), Some(callback_url), Some(transport_url)) => {
            Some(Arc::new(AcsCaller::from_connection_string(
                http.clone(),
                connection_string,
                source_number,
                &callback_url,
                &transport_url,
            )?))
        }
        _ => {
            info!(
                "outbound calling disabled (ACS connection string, source number or base URL not configured)"
            );
            None
        }
    };

    let address = cli.listen.unwrap_or_else(|| config.address());
    let state = AppState::new(config, credential, transcript_store, caller);
    let app = routes::create_router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("listening on {address}");
    axum::serve(listener, app).await?;

    Ok(())
}

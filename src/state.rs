//! Shared application state.

use std::sync::Arc;

use crate::auth::ClientCredentialsTokenProvider;
use crate::config::{ConfigError, ServerConfig};
use crate::core::relay::Credential;
use crate::storage::TranscriptStore;
use crate::telephony::AcsCaller;

/// State shared by every handler: configuration plus the injected
/// collaborators (credential source, transcript store, call initiator).
pub struct AppState {
    /// Validated server configuration
    pub config: ServerConfig,
    /// Credential handed to each relay session
    pub credential: Credential,
    /// Transcript persistence, when storage is configured
    pub transcript_store: Option<Arc<dyn TranscriptStore>>,
    /// Outbound call initiator, when telephony is configured
    pub caller: Option<Arc<AcsCaller>>,
}

impl AppState {
    /// Assemble the application state from its already-built parts.
    pub fn new(
        config: ServerConfig,
        credential: Credential,
        transcript_store: Option<Arc<dyn TranscriptStore>>,
        caller: Option<Arc<AcsCaller>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            credential,
            transcript_store,
            caller,
        })
    }

    /// Derive the relay credential from configuration: a static API key
    /// when present, otherwise the Entra ID client-credentials provider.
    pub fn credential_from_config(
        config: &ServerConfig,
        http: reqwest::Client,
    ) -> Result<Credential, ConfigError> {
        if let Some(key) = &config.azure_openai_api_key {
            return Ok(Credential::ApiKey(key.clone()));
        }
        match (
            &config.aad_tenant_id,
            &config.aad_client_id,
            &config.aad_client_secret,
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                Ok(Credential::Bearer(Arc::new(
                    ClientCredentialsTokenProvider::new(http, tenant, client, secret),
                )))
            }
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> ServerConfig {
        ServerConfig {
            azure_openai_endpoint: "https://example.openai.azure.com".to_string(),
            azure_openai_deployment: "gpt-4o-realtime".to_string(),
            azure_openai_api_key: Some("key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_credential_prefers_api_key() {
        let credential =
            AppState::credential_from_config(&config_with_key(), reqwest::Client::new()).unwrap();
        assert!(matches!(credential, Credential::ApiKey(_)));
    }

    #[test]
    fn test_credential_falls_back_to_aad() {
        let config = ServerConfig {
            azure_openai_api_key: None,
            aad_tenant_id: Some("t".into()),
            aad_client_id: Some("c".into()),
            aad_client_secret: Some("s".into()),
            ..config_with_key()
        };
        let credential =
            AppState::credential_from_config(&config, reqwest::Client::new()).unwrap();
        assert!(matches!(credential, Credential::Bearer(_)));
    }

    #[test]
    fn test_credential_requires_some_mechanism() {
        let config = ServerConfig {
            azure_openai_api_key: None,
            ..config_with_key()
        };
        assert!(AppState::credential_from_config(&config, reqwest::Client::new()).is_err());
    }
}

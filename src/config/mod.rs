//! Configuration module for the Voicebridge gateway.
//!
//! Configuration is environment-driven (with `.env` support loaded in
//! `main`): the realtime endpoint and credentials, the public base URL ACS
//! connects back to, the default session settings, and the optional
//! telephony/storage integrations. Everything is validated up front so a
//! misconfigured gateway refuses to start instead of failing mid-call.

use std::env;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty
    #[error("missing required configuration: {name}")]
    Missing {
        /// Environment variable name
        name: &'static str,
    },

    /// A variable is present but unparsable
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Environment variable name
        name: &'static str,
        /// What went wrong
        message: String,
    },

    /// Neither an API key nor a complete Entra ID credential is configured
    #[error(
        "no usable credential: set AZURE_OPENAI_API_KEY or all of AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
    )]
    MissingCredentials,

    /// Only part of the Entra ID triple is configured
    #[error("incomplete Entra ID credential: tenant id, client id and client secret must all be set")]
    IncompleteAadCredentials,
}

/// Server configuration.
///
/// Contains everything needed to run the gateway:
/// - Listen address
/// - Realtime endpoint, deployment and credentials
/// - Default session settings (voice, instructions, sampling)
/// - ACS telephony integration (optional)
/// - Transcript blob storage (optional)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// Public HTTPS base URL of this gateway, used to build the media
    /// transport and webhook callback URLs handed to ACS
    pub public_base_url: Option<String>,
    /// Path of the telephony media WebSocket endpoint
    pub media_ws_path: String,

    // Realtime endpoint
    pub azure_openai_endpoint: String,
    pub azure_openai_deployment: String,
    pub azure_openai_api_key: Option<String>,

    // Entra ID client credentials (alternative to the API key)
    pub aad_tenant_id: Option<String>,
    pub aad_client_id: Option<String>,
    pub aad_client_secret: Option<String>,

    // Default session settings
    pub voice: String,
    pub model: Option<String>,
    pub system_message: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_tokens: Option<i64>,
    pub disable_audio: Option<bool>,

    // Telephony integration
    pub acs_connection_string: Option<String>,
    pub acs_source_number: Option<String>,

    // Transcript storage
    pub storage_account: Option<String>,
    pub storage_access_key: Option<String>,
    pub storage_container: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: None,
            media_ws_path: "/acs/media".to_string(),
            azure_openai_endpoint: String::new(),
            azure_openai_deployment: String::new(),
            azure_openai_api_key: None,
            aad_tenant_id: None,
            aad_client_id: None,
            aad_client_secret: None,
            voice: "alloy".to_string(),
            model: None,
            system_message: None,
            temperature: None,
            max_response_tokens: None,
            disable_audio: None,
            acs_connection_string: None,
            acs_source_number: None,
            storage_account: None,
            storage_access_key: None,
            storage_container: None,
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = optional("HOST") {
            config.host = host;
        }
        if let Some(port) = optional("PORT") {
            config.port = port.parse().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                message: format!("{e}"),
            })?;
        }

        config.public_base_url =
            optional("ACS_BASE_URL").map(|s| s.trim_end_matches('/').to_string());
        if let Some(path) = optional("ACS_MEDIA_PATH") {
            config.media_ws_path = path;
        }

        config.azure_openai_endpoint = optional("AZURE_OPENAI_ENDPOINT").unwrap_or_default();
        config.azure_openai_deployment = optional("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default();
        config.azure_openai_api_key = optional("AZURE_OPENAI_API_KEY");
        config.aad_tenant_id = optional("AZURE_TENANT_ID");
        config.aad_client_id = optional("AZURE_CLIENT_ID");
        config.aad_client_secret = optional("AZURE_CLIENT_SECRET");

        if let Some(voice) = optional("AZURE_OPENAI_VOICE_CHOICE") {
            config.voice = voice;
        }
        config.model = optional("AZURE_OPENAI_MODEL");
        config.system_message = optional("AZURE_OPENAI_SYSTEM_MESSAGE");
        if let Some(temperature) = optional("AZURE_OPENAI_TEMPERATURE") {
            config.temperature = Some(temperature.parse().map_err(|e| ConfigError::Invalid {
                name: "AZURE_OPENAI_TEMPERATURE",
                message: format!("{e}"),
            })?);
        }
        if let Some(max_tokens) = optional("AZURE_OPENAI_MAX_TOKENS") {
            config.max_response_tokens =
                Some(max_tokens.parse().map_err(|e| ConfigError::Invalid {
                    name: "AZURE_OPENAI_MAX_TOKENS",
                    message: format!("{e}"),
                })?);
        }
        if let Some(disable_audio) = optional("AZURE_OPENAI_DISABLE_AUDIO") {
            config.disable_audio =
                Some(disable_audio.parse().map_err(|e| ConfigError::Invalid {
                    name: "AZURE_OPENAI_DISABLE_AUDIO",
                    message: format!("{e}"),
                })?);
        }

        config.acs_connection_string = optional("ACS_CONNECTION_STRING");
        config.acs_source_number = optional("ACS_SOURCE_NUMBER");

        config.storage_account = optional("AZURE_STORAGE_ACCOUNT");
        config.storage_access_key = optional("AZURE_STORAGE_ACCESS_KEY");
        config.storage_container = optional("AZURE_STORAGE_CONTAINER");

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. Fails when the realtime endpoint is
    /// unusable or no credential mechanism is available.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.azure_openai_endpoint.is_empty() {
            return Err(ConfigError::Missing {
                name: "AZURE_OPENAI_ENDPOINT",
            });
        }
        if self.azure_openai_deployment.is_empty() {
            return Err(ConfigError::Missing {
                name: "AZURE_OPENAI_DEPLOYMENT",
            });
        }

        let aad_parts = [
            &self.aad_tenant_id,
            &self.aad_client_id,
            &self.aad_client_secret,
        ];
        let aad_present = aad_parts.iter().filter(|part| part.is_some()).count();

        if self.azure_openai_api_key.is_none() {
            match aad_present {
                3 => {}
                0 => return Err(ConfigError::MissingCredentials),
                _ => return Err(ConfigError::IncompleteAadCredentials),
            }
        }

        Ok(())
    }

    /// Listen address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Public WebSocket URL ACS streams call media to, derived from the
    /// public base URL by swapping the scheme.
    pub fn media_transport_url(&self) -> Option<String> {
        let base = self.public_base_url.as_ref()?;
        let path = self.media_ws_path.trim_start_matches('/');
        let url = format!("{base}/{path}");
        Some(
            url.replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1),
        )
    }

    /// Public URL ACS posts call-state events to.
    pub fn callback_url(&self) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{base}/acs/callbacks"))
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

// =============================================================================
// Tests
// =============================================================================

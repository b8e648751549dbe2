//! Outbound call signaling against the ACS Call Automation REST API.
//!
//! The caller places outbound PSTN calls with bidirectional media streaming
//! pointed at this gateway's media WebSocket endpoint. Requests are signed
//! with the ACS connection-string HMAC-SHA256 scheme (`x-ms-date`, `host`
//! and `x-ms-content-sha256` as signed headers).

use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

/// Call Automation REST API version.
pub const ACS_API_VERSION: &str = "2024-09-15";

type HmacSha256 = Hmac<Sha256>;

/// Errors that can occur while signaling a call.
#[derive(Debug, Error)]
pub enum CallerError {
    /// The connection string is not `endpoint=…;accesskey=…`
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The REST call could not be sent
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// ACS rejected the call request
    #[error("call request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The request body could not be serialized
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// The request date or signature could not be produced
    #[error("failed to sign request")]
    Signing,
}

/// Media streaming configuration attached to an outbound call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamingOptions {
    /// WebSocket URL the media stream connects to
    pub transport_url: String,
    /// Transport kind (`websocket`)
    pub transport_type: String,
    /// Streamed content (`audio`)
    pub content_type: String,
    /// Channel layout (`mixed`)
    pub audio_channel_type: String,
    /// Wire format of the audio payloads
    pub audio_format: String,
    /// Start streaming as soon as the call connects
    pub start_media_streaming: bool,
    /// Stream audio back into the call as well
    pub enable_bidirectional: bool,
}

impl MediaStreamingOptions {
    /// Bidirectional 24 kHz mono PCM over WebSocket, started immediately.
    pub fn bidirectional_pcm24k(transport_url: &str) -> Self {
        Self {
            transport_url: transport_url.to_string(),
            transport_type: "websocket".to_string(),
            content_type: "audio".to_string(),
            audio_channel_type: "mixed".to_string(),
            audio_format: "Pcm24KMono".to_string(),
            start_media_streaming: true,
            enable_bidirectional: true,
        }
    }
}

/// Outbound call initiator bound to one ACS resource.
pub struct AcsCaller {
    http: reqwest::Client,
    endpoint: String,
    host: String,
    access_key: Vec<u8>,
    source_number: String,
    callback_url: String,
    transport_url: String,
}

impl AcsCaller {
    /// Build a caller from an ACS connection string
    /// (`endpoint=https://…;accesskey=…`).
    pub fn from_connection_string(
        http: reqwest::Client,
        connection_string: &str,
        source_number: &str,
        callback_url: &str,
        transport_url: &str,
    ) -> Result<Self, CallerError> {
        let (endpoint, access_key) = parse_connection_string(connection_string)?;
        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| CallerError::InvalidConnectionString(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CallerError::InvalidConnectionString("endpoint has no host".into()))?;
        let host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        info!(transport_url, "ACS media transport configured");

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
            access_key,
            source_number: source_number.to_string(),
            callback_url: callback_url.to_string(),
            transport_url: transport_url.to_string(),
        })
    }

    /// Place an outbound call to `target_number` with media streaming
    /// attached. Returns the call connection id assigned by ACS.
    pub async fn initiate_call(&self, target_number: &str) -> Result<String, CallerError> {
        info!(target_number, "initiating outbound call");

        let body = json!({
            "targets": [{
                "kind": "phoneNumber",
                "phoneNumber": { "value": target_number }
            }],
            "sourceCallerIdNumber": { "value": self.source_number },
            "callbackUri": self.callback_url,
            "mediaStreamingOptions": MediaStreamingOptions::bidirectional_pcm24k(&self.transport_url),
        });
        let body_bytes = serde_json::to_vec(&body)?;

        let path_and_query = format!("/calling/callConnections?api-version={ACS_API_VERSION}");
        let url = format!("{}{}", self.endpoint, path_and_query);

        let date = http_date()?;
        let content_hash = BASE64_STANDARD.encode(Sha256::digest(&body_bytes));
        let signature = self.sign(&string_to_sign(
            "POST",
            &path_and_query,
            &date,
            &self.host,
            &content_hash,
        ))?;

        let response = self
            .http
            .post(&url)
            .header("x-ms-date", &date)
            .header("x-ms-content-sha256", &content_hash)
            .header(
                "Authorization",
                format!(
                    "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={signature}"
                ),
            )
            .header("Content-Type", "application/json")
            .body(body_bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: Value = response.json().await?;
        let call_connection_id = created
            .get("callConnectionId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(call_connection_id, "call created");
        Ok(call_connection_id)
    }

    fn sign(&self, string_to_sign: &str) -> Result<String, CallerError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.access_key).map_err(|_| CallerError::Signing)?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Split `endpoint=…;accesskey=…` into its parts, decoding the key.
fn parse_connection_string(connection_string: &str) -> Result<(String, Vec<u8>), CallerError> {
    let mut endpoint = None;
    let mut access_key = None;

    for part in connection_string.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "endpoint" => endpoint = Some(value.to_string()),
            "accesskey" => {
                access_key = Some(BASE64_STANDARD.decode(value).map_err(|_| {
                    CallerError::InvalidConnectionString("accesskey is not base64".into())
                })?);
            }
            _ => {}
        }
    }

    match (endpoint, access_key) {
        (Some(endpoint), Some(key)) => Ok((endpoint, key)),
        _ => Err(CallerError::InvalidConnectionString(
            "expected endpoint=…;accesskey=…".into(),
        )),
    }
}

/// The canonical string covered by the request signature.
fn string_to_sign(
    method: &str,
    path_and_query: &str,
    date: &str,
    host: &str,
    content_hash: &str,
) -> String {
    format!("{method}\n{path_and_query}\n{date};{host};{content_hash}")
}

/// Current time as an RFC 1123 HTTP date (`Tue, 01 Jan 2030 00:00:00 GMT`).
fn http_date() -> Result<String, CallerError> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    OffsetDateTime::now_utc()
        .format(&format)
        .map_err(|_| CallerError::Signing)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_string() {
        let (endpoint, key) =
            parse_connection_string("endpoint=https://acs.communication.azure.com/;accesskey=c2VjcmV0")
                .unwrap();
        assert_eq!(endpoint, "https://acs.communication.azure.com/");
        assert_eq!(key, b"secret");
    }

    #[test]
    fn test_parse_connection_string_case_insensitive_keys() {
        let (endpoint, _) =
            parse_connection_string("Endpoint=https://acs.example.com;AccessKey=c2VjcmV0").unwrap();
        assert_eq!(endpoint, "https://acs.example.com");
    }

    #[test]
    fn test_parse_connection_string_rejects_garbage() {
        assert!(parse_connection_string("no-delimiters-here").is_err());
        assert!(parse_connection_string("endpoint=https://acs.example.com").is_err());
        assert!(parse_connection_string("endpoint=https://x;accesskey=!!notbase64!!").is_err());
    }

    #[test]
    fn test_string_to_sign_layout() {
        let signed = string_to_sign(
            "POST",
            "/calling/callConnections?api-version=2024-09-15",
            "Tue, 01 Jan 2030 00:00:00 GMT",
            "acs.communication.azure.com",
            "hash==",
        );
        assert_eq!(
            signed,
            "POST\n/calling/callConnections?api-version=2024-09-15\nTue, 01 Jan 2030 00:00:00 GMT;acs.communication.azure.com;hash=="
        );
    }

    #[test]
    fn test_http_date_shape() {
        let date = http_date().unwrap();
        assert!(date.ends_with(" GMT"));
        assert_eq!(date.matches(':').count(), 2);
    }

    #[test]
    fn test_media_streaming_options_serialization() {
        let options = MediaStreamingOptions::bidirectional_pcm24k("wss://gw.example.com/acs/media");
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["transportUrl"], "wss://gw.example.com/acs/media");
        assert_eq!(value["transportType"], "websocket");
        assert_eq!(value["contentType"], "audio");
        assert_eq!(value["audioChannelType"], "mixed");
        assert_eq!(value["audioFormat"], "Pcm24KMono");
        assert_eq!(value["startMediaStreaming"], true);
        assert_eq!(value["enableBidirectional"], true);
    }
}

//! Acestream engine HTTP client
//!
//! Asks the engine whether a content id is live and reports engine health.
//! Neither operation returns an error: every failure is folded into the
//! returned verdict so one bad probe cannot abort a batch.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::AppResult;

/// Engine quirk: this error text accompanies streams that are playable
const NEWER_DOWNLOAD_MARKER: &str = "got newer download";

/// Classified outcome of one liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeVerdict {
    pub is_online: bool,
    pub error: Option<String>,
}

impl ProbeVerdict {
    pub fn online() -> Self {
        Self {
            is_online: true,
            error: None,
        }
    }

    pub fn offline<S: Into<String>>(error: S) -> Self {
        Self {
            is_online: false,
            error: Some(error.into()),
        }
    }
}

/// Something that can tell whether a channel is live
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, channel_id: &str) -> ProbeVerdict;
}

/// Interpret the engine's answer to a `get_status` request
pub fn classify_status_response(status: u16, body: &str) -> ProbeVerdict {
    if status != StatusCode::OK.as_u16() {
        return ProbeVerdict::offline(format!("HTTP {status}"));
    }

    let document: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return ProbeVerdict::offline(format!("invalid response format: {e}")),
    };
    let Some(object) = document.as_object() else {
        return ProbeVerdict::offline("invalid response format: expected a JSON object");
    };

    let error = match object.get("error") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };

    if let Some(text) = &error {
        if text.to_lowercase().contains(NEWER_DOWNLOAD_MARKER) {
            return ProbeVerdict::online();
        }
    }

    let is_live = object
        .get("response")
        .and_then(|response| response.get("is_live"))
        .and_then(Value::as_i64)
        == Some(1);

    match error {
        None if is_live => ProbeVerdict::online(),
        Some(text) if !text.trim().is_empty() => ProbeVerdict::offline(text),
        _ => ProbeVerdict::offline("channel is not live"),
    }
}

/// Health of the engine itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub available: bool,
    pub message: String,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub playlist_loaded: Option<bool>,
    pub connected: Option<bool>,
}

impl EngineStatus {
    fn unavailable(message: String) -> Self {
        Self {
            available: false,
            message,
            version: None,
            platform: None,
            playlist_loaded: None,
            connected: None,
        }
    }
}

#[derive(Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
}

impl EngineClient {
    pub fn new(config: &EngineConfig) -> AppResult<Self> {
        let client = Client::builder().timeout(config.probe_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query `get_status` and `get_network_connection_status`
    pub async fn engine_status(&self) -> EngineStatus {
        let status = self.server_api("get_status").await;
        let network = self.server_api("get_network_connection_status").await;

        match (status, network) {
            (Ok(status), Ok(network)) => {
                let result = &status["result"];
                let version = result["version"]["version"]
                    .as_str()
                    .unwrap_or("Unknown")
                    .to_string();
                EngineStatus {
                    available: true,
                    message: format!("Acestream Engine v{version} is online"),
                    platform: Some(
                        result["version"]["platform"]
                            .as_str()
                            .unwrap_or("Unknown")
                            .to_string(),
                    ),
                    version: Some(version),
                    playlist_loaded: Some(result["playlist_loaded"].as_bool().unwrap_or(false)),
                    connected: Some(network["result"]["connected"].as_bool().unwrap_or(false)),
                }
            }
            (status, network) => {
                let mut details = Vec::new();
                if let Err(e) = status {
                    details.push(format!("status API {e}"));
                }
                if let Err(e) = network {
                    details.push(format!("network API {e}"));
                }
                let message = format!(
                    "Acestream Engine at {} is not responding properly: {}",
                    self.base_url,
                    details.join(", ")
                );
                warn!("{}", message);
                EngineStatus::unavailable(message)
            }
        }
    }

    async fn server_api(&self, method: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(format!("{}/server/api", self.base_url))
            .query(&[("api_version", "3"), ("method", method)])
            .send()
            .await
            .map_err(|e| format!("unreachable: {e}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("returned {}", status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("sent invalid JSON: {e}"))
    }
}

#[async_trait]
impl LivenessProbe for EngineClient {
    async fn probe(&self, channel_id: &str) -> ProbeVerdict {
        let request = self
            .client
            .get(format!("{}/ace/getstream", self.base_url))
            .query(&[("id", channel_id), ("format", "json"), ("method", "get_status")]);

        let verdict = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => classify_status_response(status, &body),
                    Err(e) => ProbeVerdict::offline(e.to_string()),
                }
            }
            Err(e) => ProbeVerdict::offline(e.to_string()),
        };

        debug!(
            "Probe {}: {}",
            channel_id,
            match &verdict.error {
                None => "online".to_string(),
                Some(e) => format!("offline ({e})"),
            }
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, r#"{"response": {"is_live": 1}, "error": null}"#, true, None)]
    #[case(200, r#"{"response": {"is_live": 0}, "error": null}"#, false, Some("channel is not live"))]
    #[case(200, r#"{"response": null, "error": "got NEWER download available"}"#, true, None)]
    #[case(200, r#"{"response": null, "error": "failed to load content"}"#, false, Some("failed to load content"))]
    #[case(200, r#"{"response": {"is_live": 1}, "error": "stream stopped"}"#, false, Some("stream stopped"))]
    #[case(503, "Service Unavailable", false, Some("HTTP 503"))]
    #[case(404, r#"{"response": {"is_live": 1}}"#, false, Some("HTTP 404"))]
    fn test_classify_status_response(
        #[case] status: u16,
        #[case] body: &str,
        #[case] online: bool,
        #[case] error: Option<&str>,
    ) {
        let verdict = classify_status_response(status, body);
        assert_eq!(verdict.is_online, online);
        assert_eq!(verdict.error.as_deref(), error);
    }

    #[test]
    fn test_malformed_body() {
        let verdict = classify_status_response(200, "<html>oops</html>");
        assert!(!verdict.is_online);
        assert!(verdict
            .error
            .unwrap()
            .starts_with("invalid response format: "));

        let verdict = classify_status_response(200, "[1, 2]");
        assert_eq!(
            verdict.error.as_deref(),
            Some("invalid response format: expected a JSON object")
        );
    }

    #[test]
    fn test_client_uses_normalized_url() {
        let config = EngineConfig {
            url: "6878/".to_string(),
            ..EngineConfig::default()
        };
        let client = EngineClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:6878");
    }
}

//! Connection endpoint discovery.
//!
//! Before opening the persistent connection the client asks an HTTP
//! endpoint where to connect. The reply is `{ "path": "ws://…" }`.

use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Resolves the websocket URL to connect to.
///
/// Runs on the transport's worker, hence `Send + Sync`.
pub trait EndpointDiscovery: Send + Sync {
    fn discover(&self) -> SyncResult<String>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    path: String,
}

/// Parse a discovery reply body and validate the address it names.
pub fn parse_discovery_response(body: &str) -> SyncResult<String> {
    let response: DiscoveryResponse = serde_json::from_str(body)
        .map_err(|e| SyncError::Discovery(format!("Invalid discovery response: {e}")))?;
    validate_ws_url(&response.path)?;
    Ok(response.path)
}

/// Accept only `ws://` and `wss://` URLs.
pub fn validate_ws_url(address: &str) -> SyncResult<()> {
    let parsed = Url::parse(address)
        .map_err(|e| SyncError::Discovery(format!("Invalid URL '{address}': {e}")))?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(SyncError::Discovery(format!(
            "Invalid WebSocket URL scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}

/// Looks the address up with an HTTP GET.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    url: String,
    timeout: Duration,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpDiscovery {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl EndpointDiscovery for HttpDiscovery {
    fn discover(&self) -> SyncResult<String> {
        log::info!("Discovering connection endpoint via {}", self.url);
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let body = agent
            .get(&self.url)
            .call()
            .map_err(|e| SyncError::Discovery(format!("Request to {} failed: {e}", self.url)))?
            .into_string()
            .map_err(|e| SyncError::Discovery(format!("Failed to read response: {e}")))?;
        let path = parse_discovery_response(&body)?;
        log::info!("Discovered endpoint {path}");
        Ok(path)
    }
}

/// A fixed, already known address.
#[derive(Debug, Clone)]
pub struct StaticEndpoint(pub String);

impl StaticEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }
}

impl EndpointDiscovery for StaticEndpoint {
    fn discover(&self) -> SyncResult<String> {
        validate_ws_url(&self.0)?;
        Ok(self.0.clone())
    }
}

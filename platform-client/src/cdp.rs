use engage_core::BrowserError;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Body of `GET /json/version` on a Chrome remote debugging port.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Checks that a Chrome instance with remote debugging is listening locally.
#[derive(Debug, Clone)]
pub struct CdpProbe {
    client: Client,
    port: u16,
}

impl CdpProbe {
    pub fn new(port: u16) -> Result<Self, BrowserError> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| BrowserError::Transport {
                details: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// HTTP endpoint to hand to a CDP client.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub async fn check(&self) -> Result<CdpVersion, BrowserError> {
        let url = format!("{}/json/version", self.endpoint());
        debug!("Probing {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                debug!("CDP probe failed: {}", e);
                BrowserError::NotReachable { port: self.port }
            })?;

        if !response.status().is_success() {
            debug!("CDP probe returned {}", response.status());
            return Err(BrowserError::NotReachable { port: self.port });
        }

        let version: CdpVersion = response.json().await.map_err(|e| BrowserError::Transport {
            details: format!("Unexpected /json/version body: {}", e),
        })?;

        info!("Connected to {} on port {}", version.browser, self.port);
        Ok(version)
    }
}

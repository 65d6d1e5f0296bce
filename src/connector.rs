//! Remote browser connector: turns a configured endpoint into a live CDP
//! connection.
//!
//! `ws`/`wss` endpoints are the DevTools websocket of an already-running
//! browser and are dialed directly. `http`/`https` endpoints are remote
//! automation hosts; the websocket URL is discovered through the host's
//! `/json/version` route. The endpoint is an explicit per-connector value,
//! so two clients pointed at different hosts never interfere.

use chromiumoxide::browser::Browser;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserEndpoint;
use crate::error::{ClientError, ClientResult};

/// A connected browser plus the task draining its CDP event stream.
pub struct BrowserHandle {
    pub browser: Browser,
    pub event_loop: JoinHandle<()>,
}

#[derive(Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

pub struct RemoteBrowserConnector {
    endpoint: BrowserEndpoint,
    http: reqwest::Client,
}

impl RemoteBrowserConnector {
    pub fn new(endpoint: BrowserEndpoint) -> Self {
        Self {
            endpoint,
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &BrowserEndpoint {
        &self.endpoint
    }

    /// Resolve the DevTools websocket URL for this endpoint.
    ///
    /// Direct websocket endpoints resolve to themselves; automation hosts
    /// are asked via `/json/version`.
    pub async fn resolve_websocket_url(&self) -> ClientResult<String> {
        if self.endpoint.scheme().is_websocket() {
            return Ok(self.endpoint.address().to_string());
        }

        let version_url = format!("{}/json/version", self.endpoint.address());
        debug!(url = %version_url, "discovering DevTools websocket");
        let info: VersionInfo = self
            .http
            .get(&version_url)
            // Allow a slow host time to bring up /json/version.
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|err| ClientError::communication("querying the automation host", err))?
            .error_for_status()
            .map_err(|err| ClientError::communication("querying the automation host", err))?
            .json()
            .await
            .map_err(|err| {
                ClientError::communication("reading the automation host version info", err)
            })?;

        Ok(info.web_socket_debugger_url)
    }

    /// Dial the endpoint and spawn the CDP event loop.
    ///
    /// Any failure here is a [`ClientError::Communication`]; the caller
    /// holds no partial state to discard because nothing is cached at this
    /// layer.
    pub async fn connect(&self) -> ClientResult<BrowserHandle> {
        let ws_url = self.resolve_websocket_url().await?;
        info!(endpoint = %self.endpoint, "connecting to remote browser");

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|err| ClientError::communication("connecting to the remote browser", err))?;

        // The handler must be polled for the connection to make progress.
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(%err, "CDP event loop error");
                }
            }
            debug!("CDP event loop ended");
        });

        Ok(BrowserHandle {
            browser,
            event_loop,
        })
    }
}

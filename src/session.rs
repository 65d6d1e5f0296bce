//! Session lifecycle: lazy creation, reuse, and idempotent teardown of the
//! browser / page / event-loop triple.
//!
//! One client instance owns exactly one session. The handle store has its
//! own lock, separate from the client's single-flight guard, so `cleanup`
//! can tear a session down while a flow is mid-flight; the flow's next
//! driver call then fails with a communication error.

use std::sync::atomic::{AtomicBool, Ordering};

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connector::{BrowserHandle, RemoteBrowserConnector};
use crate::error::{ClientError, ClientResult};

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Absent,
    Connecting,
    Connected,
}

struct SessionHandles {
    browser: Browser,
    page: Page,
    event_loop: JoinHandle<()>,
}

pub struct SessionLifecycle {
    connector: RemoteBrowserConnector,
    viewport: (u32, u32),
    user_agent: String,
    keep_alive: AtomicBool,
    connecting: AtomicBool,
    handles: Mutex<Option<SessionHandles>>,
}

impl SessionLifecycle {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connector: RemoteBrowserConnector::new(config.endpoint.clone()),
            viewport: config.viewport,
            user_agent: config.user_agent.clone(),
            // Ephemeral by default; a session costs a browser tab on the
            // remote host.
            keep_alive: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            handles: Mutex::new(None),
        }
    }

    /// Get the live page, connecting lazily on first use.
    ///
    /// A cached session is liveness-probed with a cheap CDP call; a dead
    /// one is discarded and replaced.
    pub async fn acquire(&self) -> ClientResult<Page> {
        let mut slot = self.handles.lock().await;

        if let Some(handles) = slot.as_ref() {
            if handles.browser.version().await.is_ok() {
                return Ok(handles.page.clone());
            }
            debug!("cached session no longer responds, reconnecting");
            if let Some(stale) = slot.take() {
                teardown(stale).await;
            }
        }

        self.connecting.store(true, Ordering::SeqCst);
        let connected = self.connect_session().await;
        self.connecting.store(false, Ordering::SeqCst);

        let handles = connected?;
        let page = handles.page.clone();
        *slot = Some(handles);
        Ok(page)
    }

    async fn connect_session(&self) -> ClientResult<SessionHandles> {
        let BrowserHandle {
            mut browser,
            event_loop,
        } = self.connector.connect().await?;

        match self.open_page(&browser).await {
            Ok(page) => Ok(SessionHandles {
                browser,
                page,
                event_loop,
            }),
            Err(err) => {
                // Half-built sessions are discarded whole.
                let _ = browser.close().await;
                event_loop.abort();
                Err(err)
            }
        }
    }

    async fn open_page(&self, browser: &Browser) -> ClientResult<Page> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| ClientError::communication("opening a browser page", err))?;

        let identity = SetUserAgentOverrideParams::builder()
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(ClientError::Unexpected)?;
        page.execute(identity)
            .await
            .map_err(|err| ClientError::communication("applying the identity string", err))?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(self.viewport.0 as i64)
            .height(self.viewport.1 as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(ClientError::Unexpected)?;
        page.execute(metrics)
            .await
            .map_err(|err| ClientError::communication("applying the viewport", err))?;

        Ok(page)
    }

    /// Tear the session down. Idempotent; safe from `Absent`.
    pub async fn release(&self) {
        let taken = self.handles.lock().await.take();
        match taken {
            Some(handles) => {
                info!("releasing browser session");
                teardown(handles).await;
            }
            None => debug!("release with no active session"),
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }

    /// Toggle session reuse. Turning it off while a session is active
    /// releases the session immediately.
    pub async fn set_keep_alive(&self, keep: bool) {
        self.keep_alive.store(keep, Ordering::SeqCst);
        if !keep {
            self.release().await;
        }
    }

    pub async fn status(&self) -> SessionStatus {
        if self.connecting.load(Ordering::SeqCst) {
            return SessionStatus::Connecting;
        }
        if self.handles.lock().await.is_some() {
            SessionStatus::Connected
        } else {
            SessionStatus::Absent
        }
    }
}

/// Close page, then browser, then stop the event loop. Shutdown errors are
/// swallowed; an already-closed handle is not a failure.
async fn teardown(handles: SessionHandles) {
    let SessionHandles {
        mut browser,
        page,
        event_loop,
    } = handles;

    if let Err(err) = page.close().await {
        debug!(%err, "page close failed during teardown");
    }
    if let Err(err) = browser.close().await {
        debug!(%err, "browser close failed during teardown");
    }
    event_loop.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserEndpoint, ClientConfig, Credentials};

    fn lifecycle() -> SessionLifecycle {
        let config = ClientConfig::new(
            Credentials::new("user", "pass"),
            BrowserEndpoint::parse("ws://127.0.0.1:1").unwrap(),
        );
        SessionLifecycle::new(&config)
    }

    #[tokio::test]
    async fn starts_absent_and_ephemeral() {
        let session = lifecycle();
        assert_eq!(session.status().await, SessionStatus::Absent);
        assert!(!session.keep_alive());
    }

    #[tokio::test]
    async fn release_from_absent_is_a_noop() {
        let session = lifecycle();
        session.release().await;
        session.release().await;
        assert_eq!(session.status().await, SessionStatus::Absent);
    }

    #[tokio::test]
    async fn keep_alive_toggle_round_trips() {
        let session = lifecycle();
        session.set_keep_alive(true).await;
        assert!(session.keep_alive());
        // Toggling off with no session active must not error.
        session.set_keep_alive(false).await;
        assert!(!session.keep_alive());
    }

    #[tokio::test]
    async fn acquire_against_a_dead_endpoint_is_a_communication_error() {
        let session = lifecycle();
        let err = session.acquire().await.unwrap_err();
        assert!(err.is_communication());
        assert_eq!(session.status().await, SessionStatus::Absent);
    }
}

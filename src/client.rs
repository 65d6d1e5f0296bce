//! The public client: composes session, login, and scraping into the five
//! operations the outside world sees.
//!
//! The session is not reentrant; interleaved flows would fight over page
//! navigation. All flow entry points are therefore serialized behind one
//! single-flight lock. `set_keep_session` and `cleanup` deliberately
//! bypass that lock: cleanup is the one coarse cancellation primitive, so
//! it must be able to tear down a session a stuck flow is holding.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth;
use crate::config::ClientConfig;
use crate::device::DeviceRecord;
use crate::driver::wait_for_body;
use crate::error::{ClientError, ClientResult};
use crate::scrape;
use crate::session::{SessionLifecycle, SessionStatus};

/// Client for one vendor-console account. Instances are independent; run
/// as many concurrently as you have accounts.
pub struct OppoCloudClient {
    config: ClientConfig,
    session: SessionLifecycle,
    flight: Mutex<()>,
}

/// The two operations the bounded-retry policy composes. Split out so the
/// policy is testable without a browser.
#[async_trait]
trait FetchPortal: Send {
    async fn scrape(&mut self) -> ClientResult<Vec<DeviceRecord>>;
    async fn login(&mut self) -> ClientResult<()>;
}

/// Fetch with exactly one login-and-retry cycle on an authentication
/// failure. A second consecutive authentication failure propagates; it is
/// never retried again.
async fn fetch_with_reauth(portal: &mut dyn FetchPortal) -> ClientResult<Vec<DeviceRecord>> {
    match portal.scrape().await {
        Err(ClientError::Authentication(reason)) => {
            info!(%reason, "console rejected the session, logging in again");
            portal.login().await?;
            portal.scrape().await
        }
        other => other,
    }
}

struct LivePortal<'a> {
    page: Page,
    config: &'a ClientConfig,
}

#[async_trait]
impl FetchPortal for LivePortal<'_> {
    async fn scrape(&mut self) -> ClientResult<Vec<DeviceRecord>> {
        scrape::scrape(&self.page, self.config).await
    }

    async fn login(&mut self) -> ClientResult<()> {
        auth::login(&self.page, self.config).await
    }
}

impl OppoCloudClient {
    pub fn new(config: ClientConfig) -> Self {
        let session = SessionLifecycle::new(&config);
        Self {
            config,
            session,
            flight: Mutex::new(()),
        }
    }

    /// Fetch the current device list, logging in again at most once if the
    /// session turns out to be stale. With keep-alive off, the session is
    /// released afterwards whatever the outcome.
    pub async fn fetch_devices(&self) -> ClientResult<Vec<DeviceRecord>> {
        let _flight = self.flight.lock().await;

        let page = self.acquire_session().await?;
        let mut portal = LivePortal {
            page,
            config: &self.config,
        };
        let result = fetch_with_reauth(&mut portal).await;

        if !self.session.keep_alive() {
            self.session.release().await;
        }
        result
    }

    /// Run the login flow on the current (or a fresh) session.
    pub async fn login(&self) -> ClientResult<()> {
        let _flight = self.flight.lock().await;
        let page = self.acquire_session().await?;
        auth::login(&page, &self.config).await
    }

    /// Verify the remote browser is reachable and can render the console.
    /// Any failure tears the session down and surfaces as a communication
    /// error.
    pub async fn test_connection(&self) -> ClientResult<bool> {
        let _flight = self.flight.lock().await;
        let page = self.acquire_session().await?;

        let outcome: ClientResult<()> = async {
            page.goto(self.config.login_url.as_str()).await?;
            let _ = page.wait_for_navigation().await;
            wait_for_body(&page, self.config.waits.interactive).await
        }
        .await;

        match outcome {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(%err, "connection test failed, discarding session");
                self.session.release().await;
                Err(ClientError::Communication {
                    context: "testing the remote browser connection".into(),
                    source: Some(Box::new(err)),
                })
            }
        }
    }

    /// Toggle session reuse across fetches. Turning it off while a session
    /// is active releases the session immediately.
    pub async fn set_keep_session(&self, keep: bool) {
        self.session.set_keep_alive(keep).await;
    }

    /// Forcibly tear down the session. The coarse cancellation primitive:
    /// an in-flight flow on this session will fail with a driver-level
    /// communication error.
    pub async fn cleanup(&self) {
        self.session.release().await;
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.session.status().await
    }

    /// Session acquisition with the forced-cleanup contract: a
    /// communication failure never leaves half-connected handles behind.
    async fn acquire_session(&self) -> ClientResult<Page> {
        match self.session.acquire().await {
            Ok(page) => Ok(page),
            Err(err) => {
                if err.is_communication() {
                    self.session.release().await;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted portal: a queue of scrape outcomes plus call counters.
    struct ScriptedPortal {
        scrape_outcomes: Vec<ClientResult<Vec<DeviceRecord>>>,
        scrape_calls: usize,
        login_calls: usize,
        login_outcome: ClientResult<()>,
    }

    impl ScriptedPortal {
        fn new(scrape_outcomes: Vec<ClientResult<Vec<DeviceRecord>>>) -> Self {
            Self {
                scrape_outcomes,
                scrape_calls: 0,
                login_calls: 0,
                login_outcome: Ok(()),
            }
        }
    }

    #[async_trait]
    impl FetchPortal for ScriptedPortal {
        async fn scrape(&mut self) -> ClientResult<Vec<DeviceRecord>> {
            self.scrape_calls += 1;
            self.scrape_outcomes.remove(0)
        }

        async fn login(&mut self) -> ClientResult<()> {
            self.login_calls += 1;
            match &self.login_outcome {
                Ok(()) => Ok(()),
                Err(ClientError::Authentication(msg)) => {
                    Err(ClientError::Authentication(msg.clone()))
                }
                Err(_) => Err(ClientError::Unexpected("scripted".into())),
            }
        }
    }

    fn auth_err() -> ClientError {
        ClientError::Authentication("kicked out".into())
    }

    #[tokio::test]
    async fn clean_scrape_never_logs_in() {
        let mut portal = ScriptedPortal::new(vec![Ok(vec![])]);
        let devices = fetch_with_reauth(&mut portal).await.unwrap();
        assert!(devices.is_empty());
        assert_eq!(portal.scrape_calls, 1);
        assert_eq!(portal.login_calls, 0);
    }

    #[tokio::test]
    async fn one_auth_failure_triggers_exactly_one_login_and_retry() {
        let mut portal = ScriptedPortal::new(vec![Err(auth_err()), Ok(vec![])]);
        fetch_with_reauth(&mut portal).await.unwrap();
        assert_eq!(portal.scrape_calls, 2);
        assert_eq!(portal.login_calls, 1);
    }

    #[tokio::test]
    async fn second_consecutive_auth_failure_propagates_unretried() {
        let mut portal = ScriptedPortal::new(vec![Err(auth_err()), Err(auth_err())]);
        let err = fetch_with_reauth(&mut portal).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(portal.scrape_calls, 2);
        assert_eq!(portal.login_calls, 1);
    }

    #[tokio::test]
    async fn login_failure_skips_the_retry() {
        let mut portal = ScriptedPortal::new(vec![Err(auth_err()), Ok(vec![])]);
        portal.login_outcome = Err(auth_err());
        let err = fetch_with_reauth(&mut portal).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(portal.scrape_calls, 1);
        assert_eq!(portal.login_calls, 1);
    }

    #[tokio::test]
    async fn non_auth_failures_are_not_retried() {
        let mut portal = ScriptedPortal::new(vec![Err(ClientError::timeout(
            "loading the device list",
            std::time::Duration::from_secs(30),
        ))]);
        let err = fetch_with_reauth(&mut portal).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert_eq!(portal.scrape_calls, 1);
        assert_eq!(portal.login_calls, 0);
    }
}

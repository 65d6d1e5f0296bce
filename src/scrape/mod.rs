//! Device scraping from the find-device surface.
//!
//! The console has rendered its device list two different ways over time:
//! newer builds expose the application state as an in-page object, older
//! builds only render markup. Extraction is therefore a strategy behind a
//! capability probe: the state object is preferred, the DOM walk is the
//! fallback. Both produce the same vendor-shaped [`RawSnapshot`].

pub mod dom_walk;
pub mod state_object;

use async_trait::async_trait;
use chromiumoxide::page::Page;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::device::{parse_snapshot, DeviceRecord, RawSnapshot};
use crate::driver::{current_url, eval_json, wait_until};
use crate::error::{ClientError, ClientResult};

use dom_walk::DomWalkStrategy;
use state_object::StateObjectStrategy;

/// Selector for the rendered device-list container (legacy markup).
pub(crate) const DEVICE_LIST_CONTAINER: &str = "#device-list > div.device-list";
/// The login affordance; its presence on the find surface means we were
/// bounced.
pub(crate) const LOGIN_MARKER: &str = "div.wrapper-login span.btn";

/// One way of pulling raw device entries off the page.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can work on the current page.
    async fn probe(&self, page: &Page) -> ClientResult<bool>;

    /// One extraction attempt. `Ok(None)` while the data has not
    /// materialized yet; the caller polls.
    async fn try_extract(&self, page: &Page) -> ClientResult<Option<RawSnapshot>>;

    /// Consulted once after the extraction budget is exhausted. `Some`
    /// substitutes a snapshot for the timeout, `None` keeps it.
    async fn settle_timeout(&self, _page: &Page) -> ClientResult<Option<RawSnapshot>> {
        Ok(None)
    }
}

/// Navigate to the find-device surface and extract all device records.
pub async fn scrape(page: &Page, config: &ClientConfig) -> ClientResult<Vec<DeviceRecord>> {
    let waits = &config.waits;

    debug!(url = %config.find_url, "opening the find-device surface");
    page.goto(config.find_url.as_str()).await?;
    let _ = page.wait_for_navigation().await;

    settle(page, config).await?;

    // A bounce back to the login surface means the session is stale.
    // Fail right away instead of waiting out the device-list budget.
    let url = current_url(page).await?;
    if !url.starts_with(config.find_url.as_str()) {
        return Err(ClientError::Authentication(
            "not logged in or page redirected unexpectedly".into(),
        ));
    }

    let strategy = select_strategy(page, config).await?;
    info!(strategy = strategy.name(), "extraction strategy selected");

    let attempt = wait_until("loading the device list", waits.device_list, waits.poll, || {
        strategy.try_extract(page)
    })
    .await;

    let snapshot = match attempt {
        Ok(snapshot) => snapshot,
        Err(timeout @ ClientError::Timeout { .. }) => {
            match strategy.settle_timeout(page).await? {
                Some(snapshot) => snapshot,
                None => return Err(timeout),
            }
        }
        Err(err) => return Err(err),
    };

    let records = parse_snapshot(&snapshot);
    info!(devices = records.len(), "scrape complete");
    Ok(records)
}

/// Wait for the page to settle into something recognizable: the state
/// object, the rendered device list, or the login affordance.
async fn settle(page: &Page, config: &ClientConfig) -> ClientResult<()> {
    let script = format!(
        "(() => {{
            if ({state_root}) return true;
            if (document.querySelector({container})) return true;
            if (document.querySelector({login})) return true;
            return false;
        }})()",
        state_root = state_object::STATE_ROOT,
        container = serde_json::to_string(DEVICE_LIST_CONTAINER)?,
        login = serde_json::to_string(LOGIN_MARKER)?,
    );

    wait_until(
        "settling the find-device surface",
        config.waits.page_settle,
        config.waits.poll,
        || {
            let script = script.clone();
            async move {
                let settled: bool = eval_json(page, &script).await?;
                Ok(if settled { Some(()) } else { None })
            }
        },
    )
    .await
}

/// Probe for the state object; fall back to walking the markup.
async fn select_strategy(
    page: &Page,
    config: &ClientConfig,
) -> ClientResult<Box<dyn ExtractionStrategy>> {
    let state = StateObjectStrategy;
    if state.probe(page).await? {
        return Ok(Box::new(state));
    }
    Ok(Box::new(DomWalkStrategy::new(config.waits.clone())))
}

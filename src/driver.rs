//! Low-level page driving: typed JS evaluation, login-frame evaluation,
//! bounded polling waits, and dialog dismissal.
//!
//! Everything the auth and scrape flows do on a page goes through these
//! helpers so every wait point carries a step label and a budget.

use std::future::Future;
use std::time::{Duration, Instant};

use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{ClientError, ClientResult};

/// Evaluate a JS expression and deserialize its result.
pub async fn eval_json<T: DeserializeOwned>(page: &Page, script: &str) -> ClientResult<T> {
    let result = page.evaluate(script).await?;
    result
        .into_value::<T>()
        .map_err(|err| ClientError::Unexpected(format!("unreadable evaluation result: {err:?}")))
}

/// Evaluate a `(doc) => ...` function body against the login sub-frame's
/// document. The login frame is same-origin, so its `contentDocument` is
/// reachable from the top-level context. Returns `None` while the frame
/// has not been attached yet.
pub async fn eval_in_frame<T: DeserializeOwned>(
    page: &Page,
    frame_selector: &str,
    body: &str,
) -> ClientResult<Option<T>> {
    let script = format!(
        "(() => {{
            const frame = document.querySelector({selector});
            if (!frame || !frame.contentDocument || !frame.contentDocument.body) return null;
            return ({body})(frame.contentDocument);
        }})()",
        selector = serde_json::to_string(frame_selector)?,
    );
    eval_json(page, &script).await
}

/// Poll `probe` until it yields a value or `budget` is exhausted.
///
/// The probe returns `Ok(None)` while the condition is not met yet; any
/// error aborts the wait immediately. On exhaustion the caller gets a
/// [`ClientError::Timeout`] naming `step`.
pub async fn wait_until<T, F, Fut>(
    step: &str,
    budget: Duration,
    poll: Duration,
    mut probe: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<Option<T>>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            trace!(step, elapsed_ms = started.elapsed().as_millis() as u64, "wait satisfied");
            return Ok(value);
        }
        if started.elapsed() >= budget {
            return Err(ClientError::timeout(step, budget));
        }
        tokio::time::sleep(poll).await;
    }
}

/// The current top-level URL.
pub async fn current_url(page: &Page) -> ClientResult<String> {
    Ok(page.url().await?.unwrap_or_default())
}

/// Click a dismiss affordance if one shows up within `budget`.
///
/// Absence is not an error; returns whether anything was dismissed.
pub async fn dismiss_dialog(page: &Page, selector: &str, budget: Duration) -> ClientResult<bool> {
    let script = format!(
        "(() => {{
            const button = document.querySelector({selector});
            if (!button) return false;
            button.click();
            return true;
        }})()",
        selector = serde_json::to_string(selector)?,
    );

    let outcome = wait_until(
        "dismissing a consent dialog",
        budget,
        Duration::from_millis(250),
        || {
            let script = script.clone();
            async move {
                let clicked: bool = eval_json(page, &script).await?;
                Ok(if clicked { Some(()) } else { None })
            }
        },
    )
    .await;

    match outcome {
        Ok(()) => {
            debug!(selector, "consent dialog dismissed");
            Ok(true)
        }
        Err(ClientError::Timeout { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Wait for a document body to exist, the coarse "page has content" signal.
pub async fn wait_for_body(page: &Page, budget: Duration) -> ClientResult<()> {
    wait_until(
        "waiting for the page body",
        budget,
        Duration::from_millis(250),
        || async move {
            let present: bool = eval_json(page, "!!document.body").await?;
            Ok(if present { Some(()) } else { None })
        },
    )
    .await
}

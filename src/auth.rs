//! Login flow against the vendor console.
//!
//! The console renders a marketing shell with a "sign in" affordance that
//! reveals an account form inside a same-origin iframe. The flow walks
//! that sequence step by step; every wait is bounded, and a timeout names
//! the step it happened in. Success is defined by the top-level URL
//! leaving the login surface. Before submitting, a passive observer is
//! planted in the login frame so that a silent rejection still yields
//! diagnostic text.

use std::sync::LazyLock;
use std::time::Duration;

use chromiumoxide::page::Page;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::driver::{current_url, dismiss_dialog, eval_in_frame, wait_until};
use crate::error::{ClientError, ClientResult};

const SIGN_IN_BUTTON: &str = "div.wrapper-login span.btn";
const LOGIN_FRAME: &str = "iframe";
const PHONE_FIELD: &str = "div:nth-child(1) > form input[type='tel']";
const PASSWORD_FIELD: &str = "div:nth-child(1) > form input[type='password']";
const SUBMIT_BUTTON: &str = "div:nth-child(1) > form button";
const CONSENT_BUTTON: &str = ".dialog-wrap .btn-confirm, .agreement-dialog .confirm";

/// Vendor error banners worth surfacing, in the locales the console ships.
static ERROR_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(?i)incorrect|invalid|fail|wrong|locked|错误|失败|不正确|不存在|频繁")
        .expect("keyword pattern compiles")
});

/// Run the whole login sequence. Returns only once the console has
/// navigated away from the login surface.
pub async fn login(page: &Page, config: &ClientConfig) -> ClientResult<()> {
    let waits = &config.waits;

    debug!(url = %config.login_url, "opening the login surface");
    page.goto(config.login_url.as_str()).await?;
    let _ = page.wait_for_navigation().await;

    // A first-visit terms dialog sometimes covers the page.
    dismiss_dialog(page, CONSENT_BUTTON, waits.consent).await?;

    reveal_account_form(page, waits.interactive, waits.poll).await?;
    fill_credentials(page, config).await?;
    plant_notice_observer(page).await?;
    submit(page, waits.interactive, waits.poll).await?;

    // Some accounts get a second consent prompt after submitting.
    dismiss_dialog(page, CONSENT_BUTTON, waits.post_submit_consent).await?;

    match confirm_redirect(page, config).await {
        Ok(()) => {
            info!("login confirmed, console left the login surface");
            Ok(())
        }
        Err(ClientError::Timeout { .. }) => {
            let diagnostic = drain_notices(page)
                .await
                .unwrap_or_default()
                .unwrap_or_else(|| "login did not leave the login surface".to_string());
            Err(ClientError::Authentication(diagnostic))
        }
        Err(err) => Err(err),
    }
}

/// Click the "sign in" affordance once it is interactive.
async fn reveal_account_form(page: &Page, budget: Duration, poll: Duration) -> ClientResult<()> {
    wait_until("revealing the sign-in form", budget, poll, || async move {
        match page.find_element(SIGN_IN_BUTTON).await {
            Ok(button) => {
                button.click().await?;
                Ok(Some(()))
            }
            Err(_) => Ok(None),
        }
    })
    .await
}

/// Fill both credential fields inside the login frame and fire the input
/// events the console's client-side validation listens for.
async fn fill_credentials(page: &Page, config: &ClientConfig) -> ClientResult<()> {
    let script = format!(
        "(doc) => {{
            const tel = doc.querySelector({phone});
            const pwd = doc.querySelector({password});
            if (!tel || !pwd) return false;
            const put = (field, value) => {{
                field.focus();
                field.value = value;
                field.dispatchEvent(new Event('input', {{ bubbles: true }}));
                field.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }};
            put(tel, {username});
            put(pwd, {secret});
            return true;
        }}",
        phone = serde_json::to_string(PHONE_FIELD)?,
        password = serde_json::to_string(PASSWORD_FIELD)?,
        username = serde_json::to_string(&config.credentials.username)?,
        secret = serde_json::to_string(&config.credentials.password)?,
    );

    wait_until(
        "filling the credential form",
        config.waits.interactive,
        config.waits.poll,
        || {
            let script = script.clone();
            async move {
                let filled = eval_in_frame::<bool>(page, LOGIN_FRAME, &script).await?;
                Ok(match filled {
                    Some(true) => Some(()),
                    _ => None,
                })
            }
        },
    )
    .await
}

/// Plant a MutationObserver in the login frame that records newly-inserted
/// text. Drained once, after a failed submit; filtering happens on our side.
async fn plant_notice_observer(page: &Page) -> ClientResult<()> {
    const OBSERVER: &str = "(doc) => {
        if (doc.__noticeLog) return true;
        const log = [];
        doc.__noticeLog = log;
        const watcher = new MutationObserver((mutations) => {
            for (const m of mutations) {
                for (const node of m.addedNodes) {
                    const text = (node.textContent || '').trim();
                    if (text && text.length < 200 && log.length < 20) log.push(text);
                }
            }
        });
        watcher.observe(doc.body, { childList: true, subtree: true });
        return true;
    }";

    let planted = eval_in_frame::<bool>(page, LOGIN_FRAME, OBSERVER).await?;
    if planted != Some(true) {
        // The frame was there a moment ago; losing it now means the page
        // is being torn down under us.
        warn!("login frame vanished before the notice observer was planted");
    }
    Ok(())
}

/// Pull everything the observer saw and boil it down to one diagnostic.
async fn drain_notices(page: &Page) -> ClientResult<Option<String>> {
    let raw = eval_in_frame::<Vec<String>>(page, LOGIN_FRAME, "(doc) => doc.__noticeLog || []")
        .await?
        .unwrap_or_default();
    Ok(summarize_notices(raw))
}

/// Deduplicate, keyword-filter, and join captured notice text.
fn summarize_notices(raw: Vec<String>) -> Option<String> {
    let mut seen: Vec<String> = Vec::new();
    for notice in raw {
        let notice = notice.trim().to_string();
        if notice.is_empty() || !ERROR_KEYWORDS.is_match(&notice) {
            continue;
        }
        if !seen.contains(&notice) {
            seen.push(notice);
        }
    }
    if seen.is_empty() {
        None
    } else {
        Some(seen.join("; "))
    }
}

/// Wait for the submit button to leave its validation-disabled state, then
/// activate it.
async fn submit(page: &Page, budget: Duration, poll: Duration) -> ClientResult<()> {
    let script = format!(
        "(doc) => {{
            const button = doc.querySelector({submit});
            if (!button) return false;
            const classes = (button.className || '').split(/\\s+/);
            if (button.disabled || classes.some((c) => c.includes('disabled'))) return false;
            button.click();
            return true;
        }}",
        submit = serde_json::to_string(SUBMIT_BUTTON)?,
    );

    wait_until("submitting the credentials", budget, poll, || {
        let script = script.clone();
        async move {
            let clicked = eval_in_frame::<bool>(page, LOGIN_FRAME, &script).await?;
            Ok(match clicked {
                Some(true) => Some(()),
                _ => None,
            })
        }
    })
    .await
}

/// The success signal: the top-level URL leaves the login surface.
async fn confirm_redirect(page: &Page, config: &ClientConfig) -> ClientResult<()> {
    wait_until(
        "confirming the login redirect",
        config.waits.interactive,
        config.waits.poll,
        || async move {
            let url = current_url(page).await?;
            Ok(if url.starts_with(config.login_url.as_str()) {
                None
            } else {
                Some(())
            })
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_filtered_against_error_keywords() {
        let raw = vec![
            "Welcome back".to_string(),
            "账号或密码错误".to_string(),
            "Loading...".to_string(),
        ];
        assert_eq!(summarize_notices(raw).as_deref(), Some("账号或密码错误"));
    }

    #[test]
    fn notices_are_deduplicated_and_joined_in_order() {
        let raw = vec![
            "Sign-in failed".to_string(),
            "Sign-in failed".to_string(),
            "密码不正确".to_string(),
        ];
        assert_eq!(
            summarize_notices(raw).as_deref(),
            Some("Sign-in failed; 密码不正确")
        );
    }

    #[test]
    fn no_matching_notices_yields_none() {
        assert_eq!(summarize_notices(vec![]), None);
        assert_eq!(summarize_notices(vec!["just noise".to_string()]), None);
    }

    #[test]
    fn keyword_pattern_covers_localized_variants() {
        for text in ["Invalid account", "登录失败", "验证码错误", "操作频繁"] {
            assert!(ERROR_KEYWORDS.is_match(text), "should match: {text}");
        }
        assert!(!ERROR_KEYWORDS.is_match("一切正常"));
    }
}

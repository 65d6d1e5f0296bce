//! Client configuration: account credentials, browser endpoint, wait budgets.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Login surface of the vendor console.
pub const DEFAULT_LOGIN_URL: &str = "https://cloud.heytap.com/login";
/// Find-device surface of the vendor console.
pub const DEFAULT_FIND_URL: &str = "https://cloud.heytap.com/find";

/// Account credentials for the vendor console.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// The password must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the remote browser is reached. The scheme fully determines the
/// connection strategy used by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointScheme {
    /// Direct DevTools websocket of an already-running browser.
    Ws,
    /// Direct DevTools websocket over TLS.
    Wss,
    /// Remote automation endpoint; the websocket URL is discovered via
    /// its `/json/version` route.
    Http,
    /// Remote automation endpoint over TLS.
    Https,
}

impl EndpointScheme {
    pub fn is_websocket(self) -> bool {
        matches!(self, EndpointScheme::Ws | EndpointScheme::Wss)
    }
}

/// A validated remote-browser endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEndpoint {
    scheme: EndpointScheme,
    address: String,
}

impl BrowserEndpoint {
    /// Parse and validate an endpoint URL.
    ///
    /// `ws`/`wss` URLs are kept verbatim. For `http`/`https` a trailing
    /// `/wd/hub` suffix (users habitually paste Selenium grid URLs) and
    /// trailing slashes are stripped to derive the base address.
    pub fn parse(raw: &str) -> ClientResult<Self> {
        let url = Url::parse(raw.trim()).map_err(|err| {
            ClientError::communication(format!("parsing endpoint URL {raw:?}"), err)
        })?;

        let scheme = match url.scheme() {
            "ws" => EndpointScheme::Ws,
            "wss" => EndpointScheme::Wss,
            "http" => EndpointScheme::Http,
            "https" => EndpointScheme::Https,
            other => {
                return Err(ClientError::communication_msg(format!(
                    "rejecting unsupported endpoint scheme {other:?} in {raw:?}"
                )));
            }
        };

        let address = if scheme.is_websocket() {
            url.as_str().trim_end_matches('/').to_string()
        } else {
            let mut base = url.as_str().trim_end_matches('/').to_string();
            if let Some(stripped) = base.strip_suffix("/wd/hub") {
                base = stripped.trim_end_matches('/').to_string();
            }
            base
        };

        Ok(Self { scheme, address })
    }

    pub fn scheme(&self) -> EndpointScheme {
        self.scheme
    }

    /// The normalized address: a websocket URL for `ws`/`wss`, a base
    /// HTTP address for `http`/`https`.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for BrowserEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Upper bounds for every wait point in the login and scrape flows.
/// Each wait is bounded individually; there is no end-to-end deadline.
#[derive(Debug, Clone)]
pub struct WaitBudgets {
    /// Pre-login consent/terms dialog.
    pub consent: Duration,
    /// Post-submit consent dialog.
    pub post_submit_consent: Duration,
    /// Any single element becoming present or interactive.
    pub interactive: Duration,
    /// The find-device page settling into a recognizable shape.
    pub page_settle: Duration,
    /// The device list materializing with data.
    pub device_list: Duration,
    /// Poll interval for all of the above.
    pub poll: Duration,
}

impl Default for WaitBudgets {
    fn default() -> Self {
        Self {
            consent: Duration::from_secs(3),
            post_submit_consent: Duration::from_secs(5),
            interactive: Duration::from_secs(10),
            page_settle: Duration::from_secs(10),
            device_list: Duration::from_secs(30),
            poll: Duration::from_millis(250),
        }
    }
}

/// Everything one client instance needs to drive the vendor console.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub endpoint: BrowserEndpoint,
    /// Viewport applied to the page; the console hides the device list on
    /// small windows.
    pub viewport: (u32, u32),
    /// Identity string presented to the console.
    pub user_agent: String,
    pub login_url: String,
    pub find_url: String,
    pub waits: WaitBudgets,
}

impl ClientConfig {
    pub fn new(credentials: Credentials, endpoint: BrowserEndpoint) -> Self {
        Self {
            credentials,
            endpoint,
            viewport: (1600, 900),
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            )
            .to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            find_url: DEFAULT_FIND_URL.to_string(),
            waits: WaitBudgets::default(),
        }
    }
}

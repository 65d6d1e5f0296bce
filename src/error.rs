//! Typed failure kinds for the OPPO Cloud client.
//!
//! Every public operation fails with exactly one of these kinds. The
//! orchestrator recovers [`ClientError::Authentication`] locally (one
//! login-and-retry cycle); everything else propagates to the caller.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;

/// All errors the client can surface.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Anything that does not fit a more specific kind.
    #[error("unexpected client failure: {0}")]
    Unexpected(String),

    /// A bounded wait was exceeded during a navigation or login step.
    #[error("timed out while {step} (waited {}ms)", .waited.as_millis())]
    Timeout { step: String, waited: Duration },

    /// The browser connection could not be established or maintained.
    #[error("browser communication failed while {context}")]
    Communication {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Login failed, or a previously-authenticated session turned out to
    /// be logged out.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl ClientError {
    /// A communication failure wrapping the underlying driver error.
    pub fn communication(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ClientError::Communication {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A communication failure with no underlying cause to attach.
    pub fn communication_msg(context: impl Into<String>) -> Self {
        ClientError::Communication {
            context: context.into(),
            source: None,
        }
    }

    pub fn timeout(step: impl Into<String>, waited: Duration) -> Self {
        ClientError::Timeout {
            step: step.into(),
            waited,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, ClientError::Communication { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for ClientError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ClientError::communication("driving the browser", err)
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Unexpected(format!("malformed page payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_step_and_budget() {
        let err = ClientError::timeout("confirming the login redirect", Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "timed out while confirming the login redirect (waited 10000ms)"
        );
    }

    #[test]
    fn kind_predicates() {
        assert!(ClientError::Authentication("nope".into()).is_authentication());
        assert!(ClientError::communication_msg("connecting").is_communication());
        assert!(!ClientError::Unexpected("x".into()).is_authentication());
    }
}

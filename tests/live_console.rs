//! Live smoke test against a real remote browser and account.
//!
//! Needs `OPPO_USERNAME`, `OPPO_PASSWORD`, and `OPPO_BROWSER_URL` in the
//! environment, so it is ignored by default:
//!
//! ```sh
//! cargo test --test live_console -- --ignored
//! ```

use oppo_cloud_client::{BrowserEndpoint, ClientConfig, Credentials, OppoCloudClient, SessionStatus};

fn client_from_env() -> OppoCloudClient {
    let username = std::env::var("OPPO_USERNAME").expect("OPPO_USERNAME");
    let password = std::env::var("OPPO_PASSWORD").expect("OPPO_PASSWORD");
    let browser_url = std::env::var("OPPO_BROWSER_URL").expect("OPPO_BROWSER_URL");

    let endpoint = BrowserEndpoint::parse(&browser_url).expect("endpoint parses");
    OppoCloudClient::new(ClientConfig::new(
        Credentials::new(username, password),
        endpoint,
    ))
}

#[tokio::test]
#[ignore] // Requires a reachable remote browser and real credentials
async fn connection_test_round_trips() {
    let client = client_from_env();
    assert!(client.test_connection().await.expect("connection test"));
    client.cleanup().await;
    assert_eq!(client.session_status().await, SessionStatus::Absent);
}

#[tokio::test]
#[ignore] // Requires a reachable remote browser and real credentials
async fn ephemeral_fetch_releases_the_session() {
    let client = client_from_env();
    client.set_keep_session(false).await;

    let devices = client.fetch_devices().await.expect("fetch");
    for device in &devices {
        // Both-or-neither coordinate invariant.
        assert_eq!(device.latitude.is_some(), device.longitude.is_some());
    }
    assert_eq!(client.session_status().await, SessionStatus::Absent);

    // Keep-alive on: the session must survive the fetch.
    client.set_keep_session(true).await;
    client.fetch_devices().await.expect("fetch with keep-alive");
    assert_eq!(client.session_status().await, SessionStatus::Connected);
    client.cleanup().await;
}

// Copyright 2026 OPPO Cloud Client Contributors
// SPDX-License-Identifier: Apache-2.0

//! Headless-browser client for the OPPO Cloud (HeyTap) find-device console.
//!
//! Drives a remotely-hosted Chromium over CDP to log in, scrape the device
//! list (from the in-page application state when available, from the
//! rendered markup otherwise), and convert vendor GCJ-02 coordinates to
//! WGS-84. One [`client::OppoCloudClient`] per account; the browser
//! session behind it can be kept alive across fetches or torn down after
//! each one.

pub mod auth;
pub mod client;
pub mod config;
pub mod connector;
pub mod device;
pub mod driver;
pub mod error;
pub mod geo;
pub mod scrape;
pub mod session;

pub use client::OppoCloudClient;
pub use config::{BrowserEndpoint, ClientConfig, Credentials};
pub use device::DeviceRecord;
pub use error::{ClientError, ClientResult};
pub use session::SessionStatus;

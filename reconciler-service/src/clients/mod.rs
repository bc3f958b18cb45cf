//! HTTP implementations of the gateway and commerce platform contracts.

pub mod ach;
pub mod card;
pub mod platform;

use anyhow::Result;
use std::time::Duration;

pub use ach::HttpAchGateway;
pub use card::HttpCardGateway;
pub use platform::HttpCommercePlatform;

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Response body excerpt for error messages.
fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

//! HTTP Gateway
//!
//! Narrow interfaces to the world outside the cluster: the DNS provider's REST
//! API, the deployed service's health endpoint, and public name resolution.
//! Stages only see the traits, so tests can substitute scripted collaborators.

use crate::error::HarnessError;
use reqwest::Client;
use std::time::Duration;

pub mod dns;
pub mod health;
pub mod resolve;

pub use dns::{CloudflareDns, DnsApi};
pub use health::{HealthProbe, HealthResponse, HttpHealthProbe};
pub use resolve::{NameResolver, SystemResolver};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client for all gateway calls.
pub fn build_http_client() -> Result<Client, HarnessError> {
    Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| HarnessError::Http(format!("Failed to create HTTP client: {}", e)))
}

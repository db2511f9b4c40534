//! Unauthenticated health probe against the deployed service.

use crate::error::HarnessError;
use async_trait::async_trait;
use reqwest::Client;

/// Status code and body of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, url: &str) -> Result<HealthResponse, HarnessError>;
}

/// Plain GET over reqwest.
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, url: &str) -> Result<HealthResponse, HarnessError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HealthResponse { status, body })
    }
}

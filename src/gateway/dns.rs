//! DNS provider client (Cloudflare v4 REST API).

use crate::error::HarnessError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Create and delete address records.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Create an A record and return its identifier.
    async fn create_record(
        &self,
        zone: &str,
        name: &str,
        address: &str,
    ) -> Result<String, HarnessError>;

    /// Delete a record. A record that no longer exists counts as deleted.
    async fn delete_record(&self, zone: &str, record_id: &str) -> Result<(), HarnessError>;
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    result: Option<CreatedRecord>,
}

#[derive(Deserialize)]
struct CreatedRecord {
    #[serde(default)]
    id: String,
}

/// Cloudflare client authenticated with an account email and API key.
pub struct CloudflareDns {
    client: Client,
    api_base: String,
    auth_email: String,
    auth_key: String,
}

impl CloudflareDns {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        auth_email: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth_email: auth_email.into(),
            auth_key: auth_key.into(),
        }
    }

    fn records_url(&self, zone: &str) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, zone)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-Auth-Email", &self.auth_email)
            .header("X-Auth-Key", &self.auth_key)
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl DnsApi for CloudflareDns {
    async fn create_record(
        &self,
        zone: &str,
        name: &str,
        address: &str,
    ) -> Result<String, HarnessError> {
        let request = CreateRecordRequest {
            record_type: "A",
            name,
            content: address,
        };
        let response = self
            .authed(self.client.post(self.records_url(zone)))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(HarnessError::DnsApi(format!(
                "record creation returned status {}: {}",
                status, body
            )));
        }

        let parsed: CreateRecordResponse = serde_json::from_str(&body).map_err(|e| {
            HarnessError::DnsApi(format!("unexpected creation response ({}): {}", e, body))
        })?;
        match parsed.result {
            Some(record) if !record.id.is_empty() => {
                info!(zone, name, address, record_id = %record.id, "Created DNS record");
                Ok(record.id)
            }
            _ => Err(HarnessError::DnsApi(format!(
                "creation response has no record id: {}",
                body
            ))),
        }
    }

    async fn delete_record(&self, zone: &str, record_id: &str) -> Result<(), HarnessError> {
        let url = format!("{}/{}", self.records_url(zone), record_id);
        let response = self.authed(self.client.delete(&url)).send().await?;
        let status = response.status();

        if status.is_success() {
            info!(zone, record_id, %status, "Deleted DNS record");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            warn!(zone, record_id, "DNS record already gone");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(HarnessError::DnsApi(format!(
                "record deletion returned status {}: {}",
                status, body
            )))
        }
    }
}

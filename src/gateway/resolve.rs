//! Public name resolution.

use crate::error::HarnessError;
use async_trait::async_trait;
use std::net::IpAddr;

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Addresses currently returned for `host`, in resolver order.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, HarnessError>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, HarnessError> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

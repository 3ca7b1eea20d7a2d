//! Remote partition providers
//!
//! A provider returns the full user list as an ordered sequence of zip
//! partitions. [`SoapPartitionSource`] talks to the e-invoice web service;
//! tests plug in their own [`PartitionSource`].

pub mod soap;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{PartitionBlob, Role};

pub use soap::SoapPartitionSource;

/// Parameters of a user list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionQuery {
    /// Alias of the requesting account
    pub identifier: String,
    /// Tax number of the requesting account
    pub vkn_tckn: String,
    pub role: Role,
    pub include_binary: bool,
}

#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Fetch every partition of the user list, in provider order
    async fn fetch_partitions(
        &self,
        query: &PartitionQuery,
    ) -> Result<Vec<PartitionBlob>, ProviderError>;
}

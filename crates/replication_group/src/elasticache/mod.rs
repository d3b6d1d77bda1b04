//! The ElastiCache control plane as seen by the reconcile core.
//!
//! Every mutating call returns as soon as the request has been accepted; the
//! outcome is only visible through later describe calls.

pub mod aws;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use aws::{AwsElastiCache, AwsSettings};
pub use types::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

#[async_trait]
pub trait ElastiCacheApi: Send + Sync {
    /// Submits a new replication group and returns the identity the remote system assigned.
    async fn create_group(&self, request: &CreateRequest) -> Result<String, RemoteError>;

    async fn describe_group(&self, id: &str) -> Result<ObservedGroup, RemoteError>;

    /// Fetches the per-member settings that the group description does not carry.
    async fn describe_member(&self, member_id: &str) -> Result<MemberDetail, RemoteError>;

    async fn modify_group(&self, id: &str, request: &ModifyRequest) -> Result<(), RemoteError>;

    async fn delete_group(&self, id: &str) -> Result<(), RemoteError>;
}

use thiserror::Error;
use tokio::time::Duration;

use crate::elasticache::RemoteError;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Finalizer Error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("invalid replication group ({id}): {reason}")]
    ValidationError { id: String, reason: String },

    #[error("ElastiCache request for ({id}) failed: {source}")]
    RemoteError {
        id: String,
        #[source]
        source: RemoteError,
    },

    #[error("timed out after {timeout:?} waiting for replication group ({id}), last status {last_status}")]
    PollTimeout {
        id: String,
        last_status: String,
        timeout: Duration,
    },

    #[error("replication group ({id}) reached unexpected status {status}")]
    UnexpectedStatus { id: String, status: String },

    #[error("replication group ({id}) disappeared while waiting for {target}")]
    ResourceVanished { id: String, target: String },
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::KubeError(_) => "kubeerror",
            StdError::FinalizerError(_) => "finalizererror",
            StdError::MetadataMissing(_) => "metadatamissing",
            StdError::ValidationError { .. } => "validationerror",
            StdError::RemoteError { .. } => "remoteerror",
            StdError::PollTimeout { .. } => "polltimeout",
            StdError::UnexpectedStatus { .. } => "unexpectedstatus",
            StdError::ResourceVanished { .. } => "resourcevanished",
        }
        .to_string()
    }

    /// How long to wait before trying a failed reconcile again.
    pub fn requeue_after(&self) -> Duration {
        match self {
            StdError::FinalizerError(e) => match e.as_ref() {
                kube::runtime::finalizer::Error::ApplyFailed(inner)
                | kube::runtime::finalizer::Error::CleanupFailed(inner) => inner.requeue_after(),
                _ => Duration::from_secs(30),
            },
            StdError::ValidationError { .. } | StdError::UnexpectedStatus { .. } => {
                Duration::from_secs(5 * 60)
            }
            StdError::RemoteError { .. } => Duration::from_secs(60),
            _ => Duration::from_secs(30),
        }
    }

    pub(crate) fn remote(id: &str, source: RemoteError) -> Self {
        StdError::RemoteError {
            id: id.to_string(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
        }
    }

    pub fn requeue_after(&self) -> Duration {
        match self {
            Error::StdError(e) => e.requeue_after(),
        }
    }

    pub fn inner(&self) -> &StdError {
        match self {
            Error::StdError(e) => e,
        }
    }
}

impl From<StdError> for Error {
    fn from(error: StdError) -> Self {
        Error::StdError(error)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

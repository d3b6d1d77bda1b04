//! Classification of the free-text status strings ElastiCache reports.

pub const AVAILABLE: &str = "available";
pub const CREATING: &str = "creating";
pub const MODIFYING: &str = "modifying";
pub const SNAPSHOTTING: &str = "snapshotting";
pub const DELETING: &str = "deleting";
pub const CREATE_FAILED: &str = "create-failed";
pub const INCOMPATIBLE_PARAMETERS: &str = "incompatible-parameters";
pub const INCOMPATIBLE_NETWORK: &str = "incompatible-network";
pub const RESTORE_FAILED: &str = "restore-failed";
pub const DELETED: &str = "deleted";

pub const CREATE_PENDING: &[&str] = &[CREATING];
pub const UPDATE_PENDING: &[&str] = &[MODIFYING, SNAPSHOTTING];
pub const DELETE_PENDING: &[&str] = &[
    CREATING,
    AVAILABLE,
    DELETING,
    INCOMPATIBLE_PARAMETERS,
    INCOMPATIBLE_NETWORK,
    RESTORE_FAILED,
];
pub const CREATE_FAILED_STATES: &[&str] = &[CREATE_FAILED];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMatch {
    Pending(String),
    Target(String),
    Other(String),
}

/// Buckets a raw group status relative to the pending set and an optional target.
///
/// A group can report the target status while its node group is still
/// settling, so a node group status other than `available` keeps it pending.
pub fn classify(
    status: &str,
    node_group_status: Option<&str>,
    pending: &[&str],
    target: Option<&str>,
) -> StatusMatch {
    if pending.contains(&status) {
        return StatusMatch::Pending(status.to_string());
    }

    match target {
        Some(target) if status == target => match node_group_status {
            Some(ng) if ng != AVAILABLE => StatusMatch::Pending(CREATING.to_string()),
            _ => StatusMatch::Target(status.to_string()),
        },
        _ => StatusMatch::Other(status.to_string()),
    }
}

/// Coarse lifecycle of a group, used for the resource phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLifecycle {
    Pending,
    Available,
    Deleted,
    Unknown,
}

impl GroupLifecycle {
    pub fn from_status(status: &str) -> Self {
        match status {
            AVAILABLE => GroupLifecycle::Available,
            CREATING | MODIFYING | SNAPSHOTTING | DELETING => GroupLifecycle::Pending,
            DELETED => GroupLifecycle::Deleted,
            _ => GroupLifecycle::Unknown,
        }
    }
}

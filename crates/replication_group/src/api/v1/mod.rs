use core::fmt;
use std::fmt::Display;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod replicationgroup;

/// Whether the remote system promotes a replica when the primary fails.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AutomaticFailover {
    Enabled,
    Disabled,
}

impl AutomaticFailover {
    pub fn is_enabled(self) -> bool {
        matches!(self, AutomaticFailover::Enabled)
    }

    /// Maps the remote failover status, which also reports the transitional
    /// `enabling` and `disabling` values, onto the requested setting.
    pub fn from_remote(status: &str) -> Option<Self> {
        match status {
            "enabled" | "enabling" => Some(AutomaticFailover::Enabled),
            "disabled" | "disabling" => Some(AutomaticFailover::Disabled),
            _ => None,
        }
    }
}

impl Display for AutomaticFailover {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AutomaticFailover::Enabled => write!(f, "enabled"),
            AutomaticFailover::Disabled => write!(f, "disabled"),
        }
    }
}

/// Placement of the cache clusters across availability zones.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AzMode {
    SingleAz,
    CrossAz,
}

impl Display for AzMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AzMode::SingleAz => write!(f, "single-az"),
            AzMode::CrossAz => write!(f, "cross-az"),
        }
    }
}

/// Per-operation overrides for how long a reconcile waits on the remote system, in seconds.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct Timeouts {
    pub create: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

/// A status condition, shaped like the Kubernetes `metav1.Condition`.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct GroupCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    /// RFC 3339 timestamp of the last status flip
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

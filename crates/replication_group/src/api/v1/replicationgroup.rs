use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::v1::{AutomaticFailover, AzMode, GroupCondition, Timeouts};
use crate::controllers::replication_group::view::GroupView;

pub static REPLICATION_GROUP_FINALIZER: &str = "replication-group.cache.oltp.molnett.org";

/// Desired configuration of an ElastiCache replication group.
///
/// `replication_group_id`, `port`, `subnet_group_name`, `snapshot_arns`,
/// `availability_zones` and `az_mode` are create-only: changing them after
/// creation is rejected and the resource has to be recreated.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "ReplicationGroup",
    group = "cache.oltp.molnett.org",
    version = "v1",
    namespaced
)]
#[kube(status = "ReplicationGroupStatus", shortname = "rg")]
pub struct ReplicationGroupSpec {
    /// Identifier of the replication group. ElastiCache keeps identifiers in
    /// lowercase, so mixed-case input is normalised.
    pub replication_group_id: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Instance class of every cache node, e.g. `cache.m5.large`.
    pub node_type: String,

    /// Number of cache clusters (primary plus replicas).
    pub num_cache_clusters: i32,

    pub port: i32,

    #[serde(default)]
    pub parameter_group_name: Option<String>,
    #[serde(default)]
    pub engine_version: Option<String>,

    /// Weekly maintenance window, e.g. `sun:05:00-sun:09:00`. Compared case-insensitively.
    #[serde(default)]
    pub maintenance_window: Option<String>,

    #[serde(default)]
    pub subnet_group_name: Option<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub security_group_names: Vec<String>,

    /// SNS topic for notifications. An empty string turns notifications off.
    #[serde(default)]
    pub notification_topic_arn: Option<String>,

    /// RDB snapshots in S3 used to seed the node group.
    #[serde(default)]
    pub snapshot_arns: Vec<String>,

    /// Daily window during which the snapshotting member takes its snapshot, e.g. `05:00-09:00`.
    #[serde(default)]
    pub snapshot_window: Option<String>,

    /// Days to keep automatic snapshots, at most 35. Zero disables snapshots.
    #[serde(default)]
    pub snapshot_retention_limit: Option<i32>,

    #[serde(default)]
    pub automatic_failover: Option<AutomaticFailover>,

    /// Preferred availability zone of each cache cluster, in creation order.
    #[serde(default)]
    pub availability_zones: Vec<String>,

    #[serde(default)]
    pub az_mode: Option<AzMode>,

    /// Apply modifications now instead of in the next maintenance window.
    #[serde(default)]
    pub apply_immediately: bool,

    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Create-only settings as they were submitted when the group was created.
///
/// ElastiCache does not report these back, so they are kept in the status to
/// detect attempts to change them later.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct CreateSettings {
    pub port: i32,
    pub subnet_group_name: Option<String>,
    #[serde(default)]
    pub snapshot_arns: Vec<String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    pub az_mode: Option<AzMode>,
}

impl CreateSettings {
    pub fn from_spec(spec: &ReplicationGroupSpec) -> Self {
        Self {
            port: spec.port,
            subnet_group_name: spec.subnet_group_name.clone(),
            snapshot_arns: spec.snapshot_arns.clone(),
            availability_zones: spec.availability_zones.clone(),
            az_mode: spec.az_mode,
        }
    }
}

/// The status object of `ReplicationGroup`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct ReplicationGroupStatus {
    #[serde(default)]
    pub conditions: Vec<GroupCondition>,
    pub phase: Option<String>,

    /// Identity assigned at creation. Cleared once the remote group is gone.
    pub replication_group_id: Option<String>,

    /// Raw status string last reported by ElastiCache.
    pub remote_status: Option<String>,

    pub observed: Option<GroupView>,
    pub create_settings: Option<CreateSettings>,
    pub last_error: Option<String>,
    pub observed_generation: Option<i64>,
}

use core::fmt;
use std::fmt::Display;

pub const DEFAULT_ENGINE: &str = "redis";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Primary,
    Replica,
}

impl MemberRole {
    pub fn from_remote(role: &str) -> Option<Self> {
        match role {
            "primary" => Some(MemberRole::Primary),
            "replica" => Some(MemberRole::Replica),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemberRole::Primary => "primary",
            MemberRole::Replica => "replica",
        }
    }
}

impl Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One cache cluster of a node group, as listed by the group description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub cache_cluster_id: String,
    pub role: Option<MemberRole>,
    pub read_endpoint: Option<Endpoint>,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroup {
    pub node_group_id: String,
    pub status: Option<String>,
    pub primary_endpoint: Option<Endpoint>,
    pub members: Vec<Member>,
}

/// A replication group as reported by the remote system at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedGroup {
    pub replication_group_id: String,
    pub status: String,
    pub description: Option<String>,
    pub automatic_failover: Option<String>,
    pub multi_az: Option<String>,
    /// Failover setting waiting for the maintenance window.
    pub pending_automatic_failover: Option<String>,
    pub node_groups: Vec<NodeGroup>,
}

impl ObservedGroup {
    /// The only supported topology is a single node group holding every member.
    pub fn sole_node_group(&self) -> Option<&NodeGroup> {
        match self.node_groups.as_slice() {
            [node_group] => Some(node_group),
            _ => None,
        }
    }

    pub fn member_count(&self) -> usize {
        self.node_groups.iter().map(|ng| ng.members.len()).sum()
    }
}

/// Settings of a single member, only available through the per-member describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDetail {
    pub cache_cluster_id: String,
    pub node_type: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub parameter_group_name: Option<String>,
    pub subnet_group_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub security_group_names: Vec<String>,
    pub maintenance_window: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub notification_topic_status: Option<String>,
    pub snapshot_window: Option<String>,
    pub snapshot_retention_limit: Option<i32>,
    pub pending_node_type: Option<String>,
    pub pending_engine_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub replication_group_id: String,
    pub description: String,
    pub engine: String,
    pub node_type: String,
    pub num_cache_clusters: i32,
    pub port: i32,
    pub engine_version: Option<String>,
    pub subnet_group_name: Option<String>,
    pub parameter_group_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub security_group_names: Vec<String>,
    pub maintenance_window: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub snapshot_arns: Vec<String>,
    pub snapshot_window: Option<String>,
    pub snapshot_retention_limit: Option<i32>,
    pub automatic_failover_enabled: Option<bool>,
    pub multi_az_enabled: Option<bool>,
    pub preferred_availability_zones: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTopicStatus {
    Active,
    Inactive,
}

impl NotificationTopicStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationTopicStatus::Active => "active",
            NotificationTopicStatus::Inactive => "inactive",
        }
    }
}

/// A single combined modification. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyRequest {
    pub apply_immediately: bool,
    pub description: Option<String>,
    pub node_type: Option<String>,
    pub num_cache_clusters: Option<i32>,
    pub parameter_group_name: Option<String>,
    pub maintenance_window: Option<String>,
    pub engine_version: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub notification_topic_status: Option<NotificationTopicStatus>,
    pub security_group_ids: Option<Vec<String>>,
    pub security_group_names: Option<Vec<String>>,
    pub automatic_failover_enabled: Option<bool>,
    pub snapshot_retention_limit: Option<i32>,
    pub snapshot_window: Option<String>,
    pub snapshotting_cluster_id: Option<String>,
}

impl ModifyRequest {
    /// Names of the fields this request changes, in a stable order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("description", self.description.is_some()),
            ("node_type", self.node_type.is_some()),
            ("num_cache_clusters", self.num_cache_clusters.is_some()),
            ("parameter_group_name", self.parameter_group_name.is_some()),
            ("maintenance_window", self.maintenance_window.is_some()),
            ("engine_version", self.engine_version.is_some()),
            ("notification_topic_arn", self.notification_topic_arn.is_some()),
            ("notification_topic_status", self.notification_topic_status.is_some()),
            ("security_group_ids", self.security_group_ids.is_some()),
            ("security_group_names", self.security_group_names.is_some()),
            ("automatic_failover", self.automatic_failover_enabled.is_some()),
            ("snapshot_retention_limit", self.snapshot_retention_limit.is_some()),
            ("snapshot_window", self.snapshot_window.is_some()),
        ];
        fields
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// True when anything other than the cluster count changes.
    pub fn has_group_changes(&self) -> bool {
        self.changed_fields()
            .iter()
            .any(|field| *field != "num_cache_clusters")
    }
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::elasticache::{MemberDetail, ObservedGroup};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct EndpointView {
    pub address: String,
    pub port: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct CacheNodeView {
    pub id: String,
    pub address: Option<String>,
    pub port: Option<i32>,
    pub availability_zone: Option<String>,
    pub role: Option<String>,
}

/// Changes accepted by ElastiCache that wait for the next maintenance window.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct PendingChangesView {
    pub node_type: Option<String>,
    pub engine_version: Option<String>,
    pub automatic_failover: Option<String>,
}

impl PendingChangesView {
    pub fn is_empty(&self) -> bool {
        self.node_type.is_none() && self.engine_version.is_none() && self.automatic_failover.is_none()
    }
}

/// What the caller sees of a replication group after a read.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct GroupView {
    pub replication_group_id: String,
    pub status: String,
    pub description: Option<String>,
    pub automatic_failover: Option<String>,
    pub multi_az: Option<String>,

    /// Primary endpoint. Empty for unsupported topologies.
    pub endpoint: Option<EndpointView>,
    #[serde(default)]
    pub cache_nodes: Vec<CacheNodeView>,

    pub node_type: Option<String>,
    pub num_cache_clusters: i32,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub parameter_group_name: Option<String>,
    pub subnet_group_name: Option<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub security_group_names: Vec<String>,
    pub maintenance_window: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub notification_topic_status: Option<String>,
    pub snapshot_window: Option<String>,
    pub snapshot_retention_limit: Option<i32>,

    /// Member the snapshot settings were taken from.
    pub snapshotting_cluster_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingChangesView>,
}

impl GroupView {
    /// The node type the group will run once pending changes are applied.
    pub fn settled_node_type(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .and_then(|p| p.node_type.as_deref())
            .or(self.node_type.as_deref())
    }

    pub fn settled_engine_version(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .and_then(|p| p.engine_version.as_deref())
            .or(self.engine_version.as_deref())
    }

    pub fn settled_automatic_failover(&self) -> Option<&str> {
        self.pending
            .as_ref()
            .and_then(|p| p.automatic_failover.as_deref())
            .or(self.automatic_failover.as_deref())
    }
}

impl GroupView {
    /// Projects a group description and the details of its members into a view.
    ///
    /// `details` must be in member order. Only a single node group is supported;
    /// anything else yields the top-level fields alone.
    pub fn assemble(group: &ObservedGroup, details: &[MemberDetail]) -> Self {
        let mut view = GroupView {
            replication_group_id: group.replication_group_id.to_lowercase(),
            status: group.status.clone(),
            description: group.description.clone(),
            automatic_failover: group.automatic_failover.clone(),
            multi_az: group.multi_az.clone(),
            ..Default::default()
        };

        let Some(node_group) = group.sole_node_group() else {
            warn!(
                id = %view.replication_group_id,
                node_groups = group.node_groups.len(),
                "Unsupported replication group topology, endpoint and nodes are left empty"
            );
            return view;
        };

        view.endpoint = node_group.primary_endpoint.as_ref().map(|e| EndpointView {
            address: e.address.clone(),
            port: e.port,
        });
        view.num_cache_clusters = node_group.members.len() as i32;
        view.cache_nodes = node_group
            .members
            .iter()
            .map(|member| CacheNodeView {
                id: member.cache_cluster_id.clone(),
                address: member.read_endpoint.as_ref().map(|e| e.address.clone()),
                port: member.read_endpoint.as_ref().map(|e| e.port),
                availability_zone: member.availability_zone.clone(),
                role: member.role.map(|r| r.to_string()),
            })
            .collect();

        if let Some(first) = details.first() {
            view.node_type = first.node_type.clone();
            view.engine = first.engine.clone();
            view.engine_version = first.engine_version.clone();
            view.parameter_group_name = first.parameter_group_name.clone();
            view.subnet_group_name = first.subnet_group_name.clone();
            view.security_group_ids = first.security_group_ids.clone();
            view.security_group_names = first.security_group_names.clone();
            view.maintenance_window = first.maintenance_window.clone();
            view.notification_topic_arn = first.notification_topic_arn.clone();
            view.notification_topic_status = first.notification_topic_status.clone();
        }

        let pending = PendingChangesView {
            node_type: details.first().and_then(|d| d.pending_node_type.clone()),
            engine_version: details.first().and_then(|d| d.pending_engine_version.clone()),
            automatic_failover: group.pending_automatic_failover.clone(),
        };
        view.pending = (!pending.is_empty()).then_some(pending);

        // Only one member takes snapshots; its settings speak for the group.
        let snapshot_source = details
            .iter()
            .rev()
            .find(|d| d.snapshot_retention_limit.is_some_and(|limit| limit > 0))
            .or(details.first());
        if let Some(source) = snapshot_source {
            view.snapshot_window = source.snapshot_window.clone();
            view.snapshot_retention_limit = source.snapshot_retention_limit;
            view.snapshotting_cluster_id = Some(source.cache_cluster_id.clone());
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{detail, member, observed_group};
    use crate::elasticache::MemberRole;

    #[test]
    fn snapshot_fields_come_from_the_member_with_retention() {
        let group = observed_group(
            "orders",
            "available",
            vec![
                member("orders-001", MemberRole::Primary),
                member("orders-002", MemberRole::Replica),
                member("orders-003", MemberRole::Replica),
            ],
        );
        let mut b = detail("orders-002");
        b.snapshot_retention_limit = Some(3);
        b.snapshot_window = Some("05:00-06:00".to_string());

        for details in [
            vec![detail("orders-001"), b.clone(), detail("orders-003")],
            vec![b.clone(), detail("orders-001"), detail("orders-003")],
            vec![detail("orders-001"), detail("orders-003"), b.clone()],
        ] {
            let view = GroupView::assemble(&group, &details);
            assert_eq!(view.snapshot_retention_limit, Some(3));
            assert_eq!(view.snapshot_window.as_deref(), Some("05:00-06:00"));
            assert_eq!(view.snapshotting_cluster_id.as_deref(), Some("orders-002"));
        }
    }

    #[test]
    fn group_fields_come_from_the_first_member() {
        let group = observed_group(
            "orders",
            "available",
            vec![
                member("orders-001", MemberRole::Primary),
                member("orders-002", MemberRole::Replica),
            ],
        );
        let mut second = detail("orders-002");
        second.node_type = Some("cache.t3.small".to_string());

        let view = GroupView::assemble(&group, &[detail("orders-001"), second]);

        assert_eq!(view.node_type.as_deref(), Some("cache.m5.large"));
        assert_eq!(view.num_cache_clusters, 2);
        assert_eq!(view.cache_nodes[0].role.as_deref(), Some("primary"));
        assert_eq!(view.snapshot_retention_limit, Some(0));
        assert_eq!(view.snapshotting_cluster_id.as_deref(), Some("orders-001"));
        assert!(view.endpoint.is_some());
    }

    #[test]
    fn pending_changes_are_carried_into_the_view() {
        let mut group = observed_group("orders", "available", vec![member("orders-001", MemberRole::Primary)]);
        group.pending_automatic_failover = Some("enabled".to_string());
        let mut first = detail("orders-001");
        first.pending_node_type = Some("cache.m5.xlarge".to_string());

        let view = GroupView::assemble(&group, &[first]);

        assert_eq!(view.node_type.as_deref(), Some("cache.m5.large"));
        assert_eq!(view.settled_node_type(), Some("cache.m5.xlarge"));
        assert_eq!(view.settled_engine_version(), Some("7.0.7"));
        assert_eq!(view.settled_automatic_failover(), Some("enabled"));

        let settled = GroupView::assemble(&observed_group("orders", "available", vec![]), &[]);
        assert_eq!(settled.pending, None);
    }

    #[test]
    fn unsupported_topology_keeps_top_level_fields() {
        let mut group = observed_group("Orders", "available", vec![member("orders-001", MemberRole::Primary)]);
        group.node_groups.push(group.node_groups[0].clone());

        let view = GroupView::assemble(&group, &[]);

        assert_eq!(view.replication_group_id, "orders");
        assert_eq!(view.status, "available");
        assert!(view.endpoint.is_none());
        assert!(view.cache_nodes.is_empty());
    }
}

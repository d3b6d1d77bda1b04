use std::collections::BTreeSet;
use tracing::warn;

use super::validate::normalize_group_id;
use super::view::{CacheNodeView, GroupView};
use crate::api::v1::replicationgroup::{CreateSettings, ReplicationGroupSpec};
use crate::api::v1::{AutomaticFailover, AzMode};
use crate::elasticache::{CreateRequest, ModifyRequest, NotificationTopicStatus, DEFAULT_ENGINE};
use crate::util::errors::{Result, StdError};

const DEFAULT_DESCRIPTION: &str = "Managed by replication-group-controller";

/// The single modification that brings an observed group in line with the desired spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDiff {
    pub patch: ModifyRequest,
    pub changed: bool,
    /// Requested changes that could not be expressed and were left out of the patch.
    pub dropped: Vec<&'static str>,
}

/// Picks the member that takes snapshots: the only member, or else the last non-primary.
pub fn select_snapshot_donor(nodes: &[CacheNodeView]) -> Option<&str> {
    match nodes {
        [only] => Some(only.id.as_str()),
        _ => nodes
            .iter()
            .rev()
            .find(|node| node.role.as_deref() != Some("primary"))
            .map(|node| node.id.as_str()),
    }
}

pub fn create_request(desired: &ReplicationGroupSpec) -> CreateRequest {
    let multi_az = desired.az_mode.map(|mode| mode == AzMode::CrossAz);

    CreateRequest {
        replication_group_id: normalize_group_id(&desired.replication_group_id),
        description: desired
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        engine: DEFAULT_ENGINE.to_string(),
        node_type: desired.node_type.clone(),
        num_cache_clusters: desired.num_cache_clusters,
        port: desired.port,
        engine_version: desired.engine_version.clone(),
        subnet_group_name: desired.subnet_group_name.clone(),
        parameter_group_name: desired.parameter_group_name.clone(),
        security_group_ids: desired.security_group_ids.clone(),
        security_group_names: desired.security_group_names.clone(),
        maintenance_window: desired.maintenance_window.clone(),
        notification_topic_arn: desired.notification_topic_arn.clone().filter(|arn| !arn.is_empty()),
        snapshot_arns: desired.snapshot_arns.clone(),
        snapshot_window: desired.snapshot_window.clone(),
        snapshot_retention_limit: desired.snapshot_retention_limit,
        automatic_failover_enabled: desired.automatic_failover.map(AutomaticFailover::is_enabled),
        multi_az_enabled: multi_az,
        preferred_availability_zones: desired.availability_zones.clone(),
    }
}

fn create_only_violations(
    desired: &ReplicationGroupSpec,
    view: &GroupView,
    recorded: Option<&CreateSettings>,
) -> Vec<String> {
    let mut violations = Vec::new();

    let id = normalize_group_id(&desired.replication_group_id);
    if id != view.replication_group_id {
        violations.push(format!(
            "replication_group_id cannot change from {} to {id}",
            view.replication_group_id
        ));
    }

    let observed_port = view
        .endpoint
        .as_ref()
        .map(|e| e.port)
        .or(recorded.map(|r| r.port));
    if let Some(port) = observed_port.filter(|port| *port != desired.port) {
        violations.push(format!("port cannot change from {port} to {}", desired.port));
    }

    if let Some(subnet) = &desired.subnet_group_name {
        let observed = view
            .subnet_group_name
            .as_ref()
            .or(recorded.and_then(|r| r.subnet_group_name.as_ref()));
        if let Some(observed) = observed.filter(|observed| *observed != subnet) {
            violations.push(format!("subnet_group_name cannot change from {observed} to {subnet}"));
        }
    }

    if let Some(recorded) = recorded {
        if !desired.snapshot_arns.is_empty() && desired.snapshot_arns != recorded.snapshot_arns {
            violations.push("snapshot_arns cannot change after creation".to_string());
        }
        if !desired.availability_zones.is_empty()
            && desired.availability_zones != recorded.availability_zones
        {
            violations.push("availability_zones cannot change after creation".to_string());
        }
        if let Some(mode) = desired.az_mode {
            if recorded.az_mode.is_some_and(|recorded| recorded != mode) {
                violations.push(format!("az_mode cannot change to {mode}"));
            }
        }
    }
    violations
}

fn differs(desired: &Option<String>, observed: &Option<String>) -> Option<String> {
    desired.as_ref().filter(|d| Some(*d) != observed.as_ref()).cloned()
}

fn differs_as_set(desired: &[String], observed: &[String]) -> Option<Vec<String>> {
    if desired.is_empty() {
        return None;
    }
    let wanted: BTreeSet<&String> = desired.iter().collect();
    let current: BTreeSet<&String> = observed.iter().collect();
    (wanted != current).then(|| desired.to_vec())
}

/// Compares the desired spec with the last observed view.
///
/// Unset optional fields and empty lists are left to the remote system and never
/// produce a change. Create-only fields that differ fail the diff.
pub fn diff(
    desired: &ReplicationGroupSpec,
    view: &GroupView,
    recorded: Option<&CreateSettings>,
) -> Result<GroupDiff> {
    let violations = create_only_violations(desired, view, recorded);
    if !violations.is_empty() {
        return Err(StdError::ValidationError {
            id: view.replication_group_id.clone(),
            reason: violations.join("; "),
        }
        .into());
    }

    let mut patch = ModifyRequest {
        apply_immediately: desired.apply_immediately,
        ..Default::default()
    };
    let mut dropped = Vec::new();

    patch.description = differs(&desired.description, &view.description).filter(|d| !d.is_empty());
    patch.automatic_failover_enabled = desired
        .automatic_failover
        .filter(|wanted| {
            view.settled_automatic_failover()
                .and_then(AutomaticFailover::from_remote)
                != Some(*wanted)
        })
        .map(AutomaticFailover::is_enabled);

    // Everything below is only known once the members have been described.
    // Changes already pending for the maintenance window count as applied.
    if !view.cache_nodes.is_empty() {
        if view.settled_node_type() != Some(desired.node_type.as_str()) {
            patch.node_type = Some(desired.node_type.clone());
        }
        if view.num_cache_clusters != desired.num_cache_clusters {
            patch.num_cache_clusters = Some(desired.num_cache_clusters);
        }
        patch.parameter_group_name = differs(&desired.parameter_group_name, &view.parameter_group_name);
        patch.engine_version = desired
            .engine_version
            .clone()
            .filter(|wanted| view.settled_engine_version() != Some(wanted.as_str()));
        patch.maintenance_window = desired
            .maintenance_window
            .as_ref()
            .filter(|wanted| {
                view.maintenance_window.as_deref().map(str::to_lowercase) != Some(wanted.to_lowercase())
            })
            .cloned();
        patch.security_group_ids = differs_as_set(&desired.security_group_ids, &view.security_group_ids);
        patch.security_group_names = differs_as_set(&desired.security_group_names, &view.security_group_names);

        match desired.notification_topic_arn.as_deref() {
            Some("") => {
                if view.notification_topic_status.as_deref() == Some("active") {
                    patch.notification_topic_arn = Some(String::new());
                    patch.notification_topic_status = Some(NotificationTopicStatus::Inactive);
                }
            }
            Some(arn) if view.notification_topic_arn.as_deref() != Some(arn) => {
                patch.notification_topic_arn = Some(arn.to_string());
            }
            Some(arn) if view.notification_topic_status.as_deref() != Some("active") => {
                patch.notification_topic_arn = Some(arn.to_string());
                patch.notification_topic_status = Some(NotificationTopicStatus::Active);
            }
            _ => {}
        }

        let retention = desired
            .snapshot_retention_limit
            .filter(|limit| view.snapshot_retention_limit != Some(*limit));
        let window = differs(&desired.snapshot_window, &view.snapshot_window);
        if retention.is_some() || window.is_some() {
            match select_snapshot_donor(&view.cache_nodes) {
                Some(donor) => {
                    patch.snapshot_retention_limit = retention;
                    patch.snapshot_window = window;
                    patch.snapshotting_cluster_id = Some(donor.to_string());
                }
                None => {
                    warn!(
                        id = %view.replication_group_id,
                        "No member can take snapshots, leaving snapshot settings unchanged"
                    );
                    if retention.is_some() {
                        dropped.push("snapshot_retention_limit");
                    }
                    if window.is_some() {
                        dropped.push("snapshot_window");
                    }
                }
            }
        }
    }

    Ok(GroupDiff {
        changed: !patch.is_empty(),
        patch,
        dropped,
    })
}

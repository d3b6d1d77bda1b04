use chrono::{SecondsFormat, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use serde_json::json;
use std::fmt;
use tracing::info;

use crate::api::v1::replicationgroup::{ReplicationGroup, ReplicationGroupStatus};
use crate::api::v1::GroupCondition;
use crate::controllers::replication_group::reconcile::GroupState;
use crate::util::errors::{Error, Result, StdError};

pub const READY_CONDITION: &str = "Ready";
pub const SYNCED_CONDITION: &str = "Synced";

// Must match the replication group controller's field manager
pub const STATUS_FIELD_MANAGER: &str = "replication-group-controller";

/// Sets the condition of the same type to new_condition and reports whether anything changed.
///
/// LastTransitionTime only moves when the status flips or the condition is new.
pub fn set_condition(conditions: &mut Vec<GroupCondition>, mut new_condition: GroupCondition) -> bool {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == new_condition.type_) else {
        new_condition.last_transition_time = now;
        conditions.push(new_condition);
        return true;
    };

    let mut changed = false;
    if existing.status != new_condition.status {
        existing.status = new_condition.status;
        existing.last_transition_time = now;
        changed = true;
    }
    if existing.reason != new_condition.reason {
        existing.reason = new_condition.reason;
        changed = true;
    }
    if existing.message != new_condition.message {
        existing.message = new_condition.message;
        changed = true;
    }
    if existing.observed_generation != new_condition.observed_generation {
        existing.observed_generation = new_condition.observed_generation;
        changed = true;
    }
    changed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    Pending,
    Creating,
    Available,
    Modifying,
    Deleting,
    Failed,
}

impl fmt::Display for GroupPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GroupPhase::Pending => write!(f, "Pending"),
            GroupPhase::Creating => write!(f, "Creating"),
            GroupPhase::Available => write!(f, "Available"),
            GroupPhase::Modifying => write!(f, "Modifying"),
            GroupPhase::Deleting => write!(f, "Deleting"),
            GroupPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Builds the next status from the current one and the outcome of a reconcile pass.
pub fn next_status(
    current: Option<&ReplicationGroupStatus>,
    generation: Option<i64>,
    state: &GroupState,
    phase: GroupPhase,
    error: Option<&Error>,
) -> ReplicationGroupStatus {
    let mut conditions = current.map(|s| s.conditions.clone()).unwrap_or_default();

    let (ready, reason, message) = match phase {
        GroupPhase::Available => ("True", "Available", "Replication group is available".to_string()),
        other => ("False", "NotAvailable", format!("Replication group is {}", other.to_string().to_lowercase())),
    };
    set_condition(
        &mut conditions,
        GroupCondition {
            type_: READY_CONDITION.to_string(),
            status: ready.to_string(),
            reason: reason.to_string(),
            message,
            observed_generation: generation,
            ..Default::default()
        },
    );

    let (synced, reason, message) = match error {
        None => ("True", "ReconcileSucceeded".to_string(), String::new()),
        Some(e) => ("False", e.metric_label(), e.to_string()),
    };
    set_condition(
        &mut conditions,
        GroupCondition {
            type_: SYNCED_CONDITION.to_string(),
            status: synced.to_string(),
            reason,
            message,
            observed_generation: generation,
            ..Default::default()
        },
    );

    ReplicationGroupStatus {
        conditions,
        phase: Some(phase.to_string()),
        replication_group_id: state.id.clone(),
        remote_status: state.view.as_ref().map(|v| v.status.clone()),
        observed: state.view.clone(),
        create_settings: state.create_settings.clone(),
        last_error: error.map(|e| e.to_string()),
        observed_generation: generation,
    }
}

pub struct GroupStatusManager<'a> {
    group: &'a ReplicationGroup,
    client: kube::Client,
}

impl<'a> GroupStatusManager<'a> {
    pub fn new(client: &kube::Client, group: &'a ReplicationGroup) -> Self {
        Self {
            group,
            client: client.clone(),
        }
    }

    /// Writes the identity, observed view and conditions of one reconcile pass.
    pub async fn publish(&self, state: &GroupState, phase: GroupPhase, error: Option<&Error>) -> Result<()> {
        let name = self.group.name_any();
        let namespace = self
            .group
            .namespace()
            .ok_or_else(|| StdError::MetadataMissing(format!("namespace of {name}")))?;
        let api: Api<ReplicationGroup> = Api::namespaced(self.client.clone(), &namespace);

        let status = next_status(
            self.group.status.as_ref(),
            self.group.metadata.generation,
            state,
            phase,
            error,
        );

        let patch = Patch::Apply(json!({
            "apiVersion": "cache.oltp.molnett.org/v1",
            "kind": "ReplicationGroup",
            "metadata": {
                "name": name,
                "namespace": namespace
            },
            "status": status
        }));

        api.patch_status(&name, &PatchParams::apply(STATUS_FIELD_MANAGER).force(), &patch)
            .await
            .map_err(StdError::KubeError)?;

        info!("Updated replication group {} phase to {}", name, phase);
        Ok(())
    }
}

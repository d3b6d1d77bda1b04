//! Helpers for testing the reconcile core without AWS.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::v1::replicationgroup::ReplicationGroupSpec;
use crate::elasticache::*;

pub fn spec(id: &str) -> ReplicationGroupSpec {
    ReplicationGroupSpec {
        replication_group_id: id.to_string(),
        node_type: "cache.m5.large".to_string(),
        num_cache_clusters: 2,
        port: 6379,
        subnet_group_name: Some("private".to_string()),
        ..Default::default()
    }
}

pub fn member(id: &str, role: MemberRole) -> Member {
    Member {
        cache_cluster_id: id.to_string(),
        role: Some(role),
        read_endpoint: Some(Endpoint {
            address: format!("{id}.cache.amazonaws.com"),
            port: 6379,
        }),
        availability_zone: Some("eu-north-1a".to_string()),
    }
}

pub fn observed_group(id: &str, status: &str, members: Vec<Member>) -> ObservedGroup {
    ObservedGroup {
        replication_group_id: id.to_lowercase(),
        status: status.to_string(),
        description: None,
        automatic_failover: Some("disabled".to_string()),
        multi_az: Some("disabled".to_string()),
        pending_automatic_failover: None,
        node_groups: vec![NodeGroup {
            node_group_id: "0001".to_string(),
            status: Some(status.to_string()),
            primary_endpoint: Some(Endpoint {
                address: format!("{}.cache.amazonaws.com", id.to_lowercase()),
                port: 6379,
            }),
            members,
        }],
    }
}

pub fn detail(id: &str) -> MemberDetail {
    MemberDetail {
        cache_cluster_id: id.to_string(),
        node_type: Some("cache.m5.large".to_string()),
        engine: Some(DEFAULT_ENGINE.to_string()),
        engine_version: Some("7.0.7".to_string()),
        subnet_group_name: Some("private".to_string()),
        maintenance_window: Some("sun:05:00-sun:09:00".to_string()),
        snapshot_retention_limit: Some(0),
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    DescribeGroup(String),
    DescribeMember(String),
    Modify(String, ModifyRequest),
    Delete(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Call::Create(_) | Call::Modify(..) | Call::Delete(_))
    }
}

/// A scripted describe response, consumed before falling back to the stored group.
#[derive(Debug, Clone)]
pub enum Scripted {
    Status(&'static str),
    NotFound,
    Error(&'static str),
}

#[derive(Default)]
struct FakeState {
    groups: HashMap<String, ObservedGroup>,
    details: HashMap<String, MemberDetail>,
    member_errors: HashMap<String, &'static str>,
    describes: VecDeque<Scripted>,
    calls: Vec<Call>,
}

/// In-memory ElastiCache that records every call.
///
/// Creating a group stores it as `creating` with `num_cache_clusters` members;
/// scripted describe responses override the stored status one call at a time.
/// Modifications made without `apply_immediately` land in the pending values.
#[derive(Default)]
pub struct FakeElastiCache {
    state: Mutex<FakeState>,
}

impl FakeElastiCache {
    pub fn with_group(group: ObservedGroup) -> Self {
        let fake = Self::default();
        fake.insert(group);
        fake
    }

    pub fn insert(&self, group: ObservedGroup) {
        let mut state = self.state.lock().unwrap();
        for member in group.node_groups.iter().flat_map(|ng| ng.members.iter()) {
            state
                .details
                .entry(member.cache_cluster_id.clone())
                .or_insert_with(|| detail(&member.cache_cluster_id));
        }
        state.groups.insert(group.replication_group_id.clone(), group);
    }

    pub fn set_detail(&self, detail: MemberDetail) {
        let mut state = self.state.lock().unwrap();
        state.details.insert(detail.cache_cluster_id.clone(), detail);
    }

    /// Makes every describe of `member_id` fail with a transport error.
    pub fn fail_member(&self, member_id: &str, message: &'static str) {
        self.state.lock().unwrap().member_errors.insert(member_id.to_string(), message);
    }

    pub fn script(&self, responses: impl IntoIterator<Item = Scripted>) {
        self.state.lock().unwrap().describes.extend(responses);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn group(&self, id: &str) -> Option<ObservedGroup> {
        self.state.lock().unwrap().groups.get(id).cloned()
    }
}

#[async_trait]
impl ElastiCacheApi for FakeElastiCache {
    async fn create_group(&self, request: &CreateRequest) -> Result<String, RemoteError> {
        let id = request.replication_group_id.clone();
        self.state.lock().unwrap().calls.push(Call::Create(id.clone()));

        let members = (1..=request.num_cache_clusters)
            .map(|n| {
                let role = if n == 1 { MemberRole::Primary } else { MemberRole::Replica };
                member(&format!("{id}-{n:03}"), role)
            })
            .collect();
        let mut group = observed_group(&id, "creating", members);
        group.description = Some(request.description.clone());
        self.insert(group);

        // the remote system echoes the identity in lowercase
        Ok(id.to_lowercase())
    }

    async fn describe_group(&self, id: &str) -> Result<ObservedGroup, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DescribeGroup(id.to_string()));

        let scripted = state.describes.pop_front();
        let stored = state.groups.get(id).cloned();
        match (scripted, stored) {
            (Some(Scripted::Error(message)), _) => Err(RemoteError::Transport(message.to_string())),
            (Some(Scripted::NotFound), _) | (None, None) => {
                Err(RemoteError::NotFound(format!("replication group {id}")))
            }
            (Some(Scripted::Status(status)), Some(mut group)) => {
                group.status = status.to_string();
                for node_group in &mut group.node_groups {
                    node_group.status = Some(status.to_string());
                }
                state.groups.insert(id.to_string(), group.clone());
                Ok(group)
            }
            (Some(Scripted::Status(_)), None) => Err(RemoteError::NotFound(format!("replication group {id}"))),
            (None, Some(group)) => Ok(group),
        }
    }

    async fn describe_member(&self, member_id: &str) -> Result<MemberDetail, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DescribeMember(member_id.to_string()));
        if let Some(message) = state.member_errors.get(member_id) {
            return Err(RemoteError::Transport(message.to_string()));
        }
        state
            .details
            .get(member_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("cache cluster {member_id}")))
    }

    async fn modify_group(&self, id: &str, request: &ModifyRequest) -> Result<(), RemoteError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.calls.push(Call::Modify(id.to_string(), request.clone()));
        let Some(group) = state.groups.get_mut(id) else {
            return Err(RemoteError::NotFound(format!("replication group {id}")));
        };
        group.status = "modifying".to_string();

        let immediate = request.apply_immediately;
        if let Some(enabled) = request.automatic_failover_enabled {
            let value = Some(if enabled { "enabled" } else { "disabled" }.to_string());
            if immediate {
                group.automatic_failover = value;
            } else {
                group.pending_automatic_failover = value;
            }
        }
        if let Some(description) = &request.description {
            group.description = Some(description.clone());
        }

        for member in group.node_groups.iter().flat_map(|ng| ng.members.iter()) {
            let Some(detail) = state.details.get_mut(&member.cache_cluster_id) else {
                continue;
            };
            if let Some(node_type) = &request.node_type {
                if immediate {
                    detail.node_type = Some(node_type.clone());
                } else {
                    detail.pending_node_type = Some(node_type.clone());
                }
            }
            if let Some(version) = &request.engine_version {
                if immediate {
                    detail.engine_version = Some(version.clone());
                } else {
                    detail.pending_engine_version = Some(version.clone());
                }
            }
            if let Some(arn) = &request.notification_topic_arn {
                detail.notification_topic_arn = Some(arn.clone());
            }
            if let Some(status) = request.notification_topic_status {
                detail.notification_topic_status = Some(status.as_str().to_string());
            }
        }
        Ok(())
    }

    async fn delete_group(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(id.to_string()));
        match state.groups.get_mut(id) {
            Some(group) => {
                group.status = "deleting".to_string();
                Ok(())
            }
            None => Err(RemoteError::NotFound(format!("replication group {id}"))),
        }
    }
}

use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region};
use aws_sdk_elasticache::error::DisplayErrorContext;
use aws_sdk_elasticache::types as ec;
use aws_sdk_elasticache::Client;
use tracing::{debug, error, info};

use super::types::*;
use super::{ElastiCacheApi, RemoteError};

/// Connection settings for the ElastiCache API. Credentials come from the
/// default AWS provider chain.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub max_attempts: u32,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            max_attempts: 11,
        }
    }
}

pub struct AwsElastiCache {
    client: Client,
}

impl AwsElastiCache {
    pub async fn connect(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(settings.max_attempts));
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        info!(
            region = ?config.region(),
            max_attempts = settings.max_attempts,
            "Configured ElastiCache client"
        );
        Self::from_client(Client::new(&config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn change_replica_count(&self, id: &str, num_cache_clusters: i32) -> Result<(), RemoteError> {
        let current = self.describe_group(id).await?.member_count() as i32;
        // the primary is not counted as a replica
        let replicas = num_cache_clusters - 1;

        if num_cache_clusters > current {
            info!(id, current, num_cache_clusters, "Increasing replica count");
            self.client
                .increase_replica_count()
                .replication_group_id(id)
                .new_replica_count(replicas)
                .apply_immediately(true)
                .send()
                .await
                .map_err(transport)?;
        } else if num_cache_clusters < current {
            info!(id, current, num_cache_clusters, "Decreasing replica count");
            self.client
                .decrease_replica_count()
                .replication_group_id(id)
                .new_replica_count(replicas)
                .apply_immediately(true)
                .send()
                .await
                .map_err(transport)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ElastiCacheApi for AwsElastiCache {
    async fn create_group(&self, request: &CreateRequest) -> Result<String, RemoteError> {
        if !request.snapshot_arns.is_empty() {
            debug!(snapshot_arns = ?request.snapshot_arns, "Restoring replication group from S3 snapshot");
        }

        let output = self
            .client
            .create_replication_group()
            .replication_group_id(&request.replication_group_id)
            .replication_group_description(&request.description)
            .engine(&request.engine)
            .cache_node_type(&request.node_type)
            .num_cache_clusters(request.num_cache_clusters)
            .port(request.port)
            .set_engine_version(request.engine_version.clone())
            .set_cache_subnet_group_name(request.subnet_group_name.clone())
            .set_cache_parameter_group_name(request.parameter_group_name.clone())
            .set_security_group_ids(non_empty(&request.security_group_ids))
            .set_cache_security_group_names(non_empty(&request.security_group_names))
            .set_preferred_maintenance_window(request.maintenance_window.clone())
            .set_notification_topic_arn(request.notification_topic_arn.clone())
            .set_snapshot_arns(non_empty(&request.snapshot_arns))
            .set_snapshot_window(request.snapshot_window.clone())
            .set_snapshot_retention_limit(request.snapshot_retention_limit)
            .set_automatic_failover_enabled(request.automatic_failover_enabled)
            .set_multi_az_enabled(request.multi_az_enabled)
            .set_preferred_cache_cluster_azs(non_empty(&request.preferred_availability_zones))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to create replication group {}: {}", request.replication_group_id, DisplayErrorContext(&e));
                transport(e)
            })?;

        Ok(output
            .replication_group()
            .and_then(|group| group.replication_group_id())
            .unwrap_or(&request.replication_group_id)
            .to_string())
    }

    async fn describe_group(&self, id: &str) -> Result<ObservedGroup, RemoteError> {
        let output = match self
            .client
            .describe_replication_groups()
            .replication_group_id(id)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_replication_group_not_found_fault()) =>
            {
                return Err(RemoteError::NotFound(format!("replication group {id}")));
            }
            Err(e) => return Err(transport(e)),
        };

        let group = output
            .replication_groups()
            .iter()
            .find(|group| {
                group
                    .replication_group_id()
                    .is_some_and(|found| found.eq_ignore_ascii_case(id))
            })
            .ok_or_else(|| {
                RemoteError::Transport(format!("no matching replication group for id ({id})"))
            })?;

        Ok(observed_group(group))
    }

    async fn describe_member(&self, member_id: &str) -> Result<MemberDetail, RemoteError> {
        let output = match self
            .client
            .describe_cache_clusters()
            .cache_cluster_id(member_id)
            .show_cache_node_info(true)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_cache_cluster_not_found_fault()) =>
            {
                return Err(RemoteError::NotFound(format!("cache cluster {member_id}")));
            }
            Err(e) => return Err(transport(e)),
        };

        let cluster = output.cache_clusters().first().ok_or_else(|| {
            RemoteError::Transport(format!("no cache cluster returned for id ({member_id})"))
        })?;

        Ok(member_detail(member_id, cluster))
    }

    async fn modify_group(&self, id: &str, request: &ModifyRequest) -> Result<(), RemoteError> {
        if request.has_group_changes() {
            self.client
                .modify_replication_group()
                .replication_group_id(id)
                .apply_immediately(request.apply_immediately)
                .set_replication_group_description(request.description.clone())
                .set_cache_node_type(request.node_type.clone())
                .set_cache_parameter_group_name(request.parameter_group_name.clone())
                .set_preferred_maintenance_window(request.maintenance_window.clone())
                .set_engine_version(request.engine_version.clone())
                .set_notification_topic_arn(request.notification_topic_arn.clone())
                .set_notification_topic_status(
                    request.notification_topic_status.map(|s| s.as_str().to_string()),
                )
                .set_security_group_ids(request.security_group_ids.clone())
                .set_cache_security_group_names(request.security_group_names.clone())
                .set_automatic_failover_enabled(request.automatic_failover_enabled)
                .set_snapshot_retention_limit(request.snapshot_retention_limit)
                .set_snapshot_window(request.snapshot_window.clone())
                .set_snapshotting_cluster_id(request.snapshotting_cluster_id.clone())
                .send()
                .await
                .map_err(transport)?;

            // ElastiCache refuses a replica count change while the group is modifying,
            // so the next reconcile picks it up once the group is available again.
            if request.num_cache_clusters.is_some() {
                info!(id, "Deferring cluster count change until the modification completes");
            }
            return Ok(());
        }

        // replica count changes are always applied immediately
        if let Some(num_cache_clusters) = request.num_cache_clusters {
            self.change_replica_count(id, num_cache_clusters).await?;
        }
        Ok(())
    }

    async fn delete_group(&self, id: &str) -> Result<(), RemoteError> {
        match self
            .client
            .delete_replication_group()
            .replication_group_id(id)
            .retain_primary_cluster(false)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|e| e.is_replication_group_not_found_fault()) =>
            {
                Err(RemoteError::NotFound(format!("replication group {id}")))
            }
            Err(e) => Err(transport(e)),
        }
    }
}

fn transport<E: std::error::Error>(error: E) -> RemoteError {
    RemoteError::Transport(DisplayErrorContext(error).to_string())
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn endpoint(endpoint: &ec::Endpoint) -> Option<Endpoint> {
    Some(Endpoint {
        address: endpoint.address()?.to_string(),
        port: endpoint.port()?,
    })
}

fn observed_group(group: &ec::ReplicationGroup) -> ObservedGroup {
    ObservedGroup {
        replication_group_id: group.replication_group_id().unwrap_or_default().to_lowercase(),
        status: group.status().unwrap_or_default().to_string(),
        description: group.description().map(str::to_string),
        automatic_failover: group.automatic_failover().map(|s| s.as_str().to_string()),
        multi_az: group.multi_az().map(|s| s.as_str().to_string()),
        pending_automatic_failover: group
            .pending_modified_values()
            .and_then(|pending| pending.automatic_failover_status())
            .map(|s| s.as_str().to_string()),
        node_groups: group
            .node_groups()
            .iter()
            .map(|node_group| NodeGroup {
                node_group_id: node_group.node_group_id().unwrap_or_default().to_string(),
                status: node_group.status().map(str::to_string),
                primary_endpoint: node_group.primary_endpoint().and_then(endpoint),
                members: node_group
                    .node_group_members()
                    .iter()
                    .map(|member| Member {
                        cache_cluster_id: member.cache_cluster_id().unwrap_or_default().to_string(),
                        role: member.current_role().and_then(MemberRole::from_remote),
                        read_endpoint: member.read_endpoint().and_then(endpoint),
                        availability_zone: member.preferred_availability_zone().map(str::to_string),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn member_detail(member_id: &str, cluster: &ec::CacheCluster) -> MemberDetail {
    MemberDetail {
        cache_cluster_id: member_id.to_string(),
        node_type: cluster.cache_node_type().map(str::to_string),
        engine: cluster.engine().map(str::to_string),
        engine_version: cluster.engine_version().map(str::to_string),
        parameter_group_name: cluster
            .cache_parameter_group()
            .and_then(|group| group.cache_parameter_group_name())
            .map(str::to_string),
        subnet_group_name: cluster.cache_subnet_group_name().map(str::to_string),
        security_group_ids: cluster
            .security_groups()
            .iter()
            .filter_map(|group| group.security_group_id())
            .map(str::to_string)
            .collect(),
        security_group_names: cluster
            .cache_security_groups()
            .iter()
            .filter_map(|group| group.cache_security_group_name())
            .map(str::to_string)
            .collect(),
        maintenance_window: cluster.preferred_maintenance_window().map(str::to_string),
        notification_topic_arn: cluster
            .notification_configuration()
            .and_then(|config| config.topic_arn())
            .map(str::to_string),
        notification_topic_status: cluster
            .notification_configuration()
            .and_then(|config| config.topic_status())
            .map(str::to_string),
        snapshot_window: cluster.snapshot_window().map(str::to_string),
        snapshot_retention_limit: cluster.snapshot_retention_limit(),
        pending_node_type: cluster
            .pending_modified_values()
            .and_then(|pending| pending.cache_node_type())
            .map(str::to_string),
        pending_engine_version: cluster
            .pending_modified_values()
            .and_then(|pending| pending.engine_version())
            .map(str::to_string),
    }
}

use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::diff::{create_request, diff};
use super::status::{
    AVAILABLE, CREATE_FAILED_STATES, CREATE_PENDING, DELETE_PENDING, UPDATE_PENDING,
};
use super::validate::{normalize_group_id, validate_group_id, validate_spec};
use super::view::GroupView;
use super::waiter::{wait_for, Expectation, Observation, Refresh, WaitSettings};
use crate::api::v1::replicationgroup::{CreateSettings, ReplicationGroupSpec};
use crate::api::v1::Timeouts;
use crate::elasticache::{ElastiCacheApi, ObservedGroup};
use crate::util::errors::{Result, StdError};

/// How long each operation waits on ElastiCache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub create: WaitSettings,
    pub update: WaitSettings,
    pub delete: WaitSettings,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            create: WaitSettings::new(Duration::from_secs(20 * 60), Duration::from_secs(10)),
            update: WaitSettings::new(Duration::from_secs(10 * 60), Duration::from_secs(5)),
            delete: WaitSettings::new(Duration::from_secs(20 * 60), Duration::from_secs(10)),
        }
    }
}

impl ReconcileSettings {
    pub fn with_overrides(mut self, timeouts: &Timeouts) -> Self {
        if let Some(secs) = timeouts.create {
            self.create.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = timeouts.update {
            self.update.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = timeouts.delete {
            self.delete.timeout = Duration::from_secs(secs);
        }
        self
    }
}

/// Everything kept between reconcile passes: the identity and what was last read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupState {
    pub id: Option<String>,
    pub view: Option<GroupView>,
    pub create_settings: Option<CreateSettings>,
}

impl GroupState {
    fn forget(&mut self) {
        self.id = None;
        self.view = None;
        self.create_settings = None;
    }
}

/// Drives one replication group through create, read, update and delete.
pub struct GroupReconciler<'a> {
    api: &'a dyn ElastiCacheApi,
    settings: ReconcileSettings,
}

impl<'a> GroupReconciler<'a> {
    pub fn new(api: &'a dyn ElastiCacheApi, settings: ReconcileSettings) -> Self {
        Self { api, settings }
    }

    async fn refresh(&self, id: &str) -> Result<Refresh<ObservedGroup>> {
        match self.api.describe_group(id).await {
            Ok(group) => {
                let node_group_status = group.sole_node_group().and_then(|ng| ng.status.clone());
                Ok(Refresh::Found(Observation {
                    status: group.status.clone(),
                    node_group_status,
                    state: group,
                }))
            }
            Err(e) if e.is_not_found() => Ok(Refresh::Gone),
            Err(e) => Err(StdError::remote(id, e).into()),
        }
    }

    /// Creates the group and waits until it is available.
    pub async fn create(&self, desired: &ReplicationGroupSpec, state: &mut GroupState) -> Result<()> {
        self.submit_create(desired, state).await?;
        self.await_created(state).await
    }

    /// Asks ElastiCache to create the group and records the identity it assigns.
    ///
    /// Callers persist the identity before waiting, so a restart during the
    /// wait still finds the group.
    pub async fn submit_create(&self, desired: &ReplicationGroupSpec, state: &mut GroupState) -> Result<()> {
        validate_spec(desired)?;

        let request = create_request(desired);
        let assigned = self
            .api
            .create_group(&request)
            .await
            .map_err(|e| StdError::remote(&request.replication_group_id, e))?;
        let id = normalize_group_id(&assigned);
        info!(%id, "Replication group creation accepted");
        state.id = Some(id);
        state.create_settings = Some(CreateSettings::from_spec(desired));
        Ok(())
    }

    /// Waits for a submitted group to become available, then reads it.
    pub async fn await_created(&self, state: &mut GroupState) -> Result<()> {
        let Some(id) = state.id.clone() else {
            return Err(StdError::MetadataMissing("identity of the replication group being created".to_string()).into());
        };

        let expectation = Expectation {
            target: Some(AVAILABLE),
            pending: CREATE_PENDING,
            failed: CREATE_FAILED_STATES,
        };
        wait_for(&id, &expectation, &self.settings.create, || self.refresh(&id)).await?;

        self.read(state).await
    }

    /// Refreshes the view. A group that no longer exists clears the state.
    pub async fn read(&self, state: &mut GroupState) -> Result<()> {
        let Some(id) = state.id.clone() else {
            state.view = None;
            return Ok(());
        };

        let group = match self.api.describe_group(&id).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => {
                warn!(%id, "Replication group not found, forgetting it");
                state.forget();
                return Ok(());
            }
            Err(e) => return Err(StdError::remote(&id, e).into()),
        };

        let mut details = Vec::new();
        if let Some(node_group) = group.sole_node_group() {
            for member in &node_group.members {
                let detail = self
                    .api
                    .describe_member(&member.cache_cluster_id)
                    .await
                    .map_err(|e| StdError::remote(&id, e))?;
                details.push(detail);
            }
        }

        let view = GroupView::assemble(&group, &details);
        debug!(%id, status = %view.status, members = view.cache_nodes.len(), "Read replication group");
        state.id = Some(view.replication_group_id.clone());
        state.view = Some(view);
        Ok(())
    }

    /// Applies every changed field in one modification and waits for the group to settle.
    ///
    /// Returns whether a modification was sent.
    pub async fn update(&self, desired: &ReplicationGroupSpec, state: &mut GroupState) -> Result<bool> {
        validate_spec(desired)?;

        if state.view.is_none() {
            self.read(state).await?;
        }
        let (Some(id), Some(view)) = (state.id.clone(), state.view.as_ref()) else {
            return Err(StdError::ResourceVanished {
                id: normalize_group_id(&desired.replication_group_id),
                target: AVAILABLE.to_string(),
            }
            .into());
        };

        let diff = diff(desired, view, state.create_settings.as_ref())?;
        if !diff.dropped.is_empty() {
            warn!(%id, dropped = ?diff.dropped, "Some changes could not be applied");
        }
        if !diff.changed {
            debug!(%id, "Replication group is up to date");
            self.read(state).await?;
            return Ok(false);
        }

        info!(%id, fields = ?diff.patch.changed_fields(), "Modifying replication group");
        self.api
            .modify_group(&id, &diff.patch)
            .await
            .map_err(|e| StdError::remote(&id, e))?;

        let expectation = Expectation {
            target: Some(AVAILABLE),
            pending: UPDATE_PENDING,
            failed: &[],
        };
        wait_for(&id, &expectation, &self.settings.update, || self.refresh(&id)).await?;

        self.read(state).await?;
        Ok(true)
    }

    /// Deletes the group and waits until ElastiCache no longer reports it.
    ///
    /// Without a recorded identity the configured identifier is used, since a
    /// create may have been accepted before its identity could be stored.
    pub async fn delete(&self, desired: &ReplicationGroupSpec, state: &mut GroupState) -> Result<()> {
        let id = match state.id.clone() {
            Some(id) => id,
            None => {
                let id = normalize_group_id(&desired.replication_group_id);
                if !validate_group_id(&id).is_empty() {
                    return Ok(());
                }
                warn!(%id, "No identity recorded, deleting by the configured identifier");
                id
            }
        };

        match self.api.delete_group(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(%id, "Replication group already gone");
                state.forget();
                return Ok(());
            }
            Err(e) => return Err(StdError::remote(&id, e).into()),
        }

        let expectation = Expectation {
            target: None,
            pending: DELETE_PENDING,
            failed: &[],
        };
        wait_for(&id, &expectation, &self.settings.delete, || self.refresh(&id)).await?;

        info!(%id, "Replication group deleted");
        state.forget();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elasticache::{MemberRole, NotificationTopicStatus};
    use crate::fixtures::{detail, member, observed_group, spec, Call, FakeElastiCache, Scripted};
    use crate::util::errors::Error;

    fn available_group(id: &str) -> ObservedGroup {
        observed_group(
            id,
            "available",
            vec![
                member(&format!("{id}-001"), MemberRole::Primary),
                member(&format!("{id}-002"), MemberRole::Replica),
            ],
        )
    }

    fn tracked(id: &str) -> GroupState {
        GroupState {
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_spec_makes_no_mutating_calls() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        reconciler.read(&mut state).await.unwrap();
        let before = state.view.clone();

        let patched = reconciler.update(&spec("orders"), &mut state).await.unwrap();

        assert!(!patched);
        assert!(fake.mutating_calls().is_empty());
        assert_eq!(state.view, before);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_case_identity_is_stored_lowercase() {
        let fake = FakeElastiCache::default();
        fake.script([Scripted::Status("creating"), Scripted::Status("available")]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = GroupState::default();

        reconciler.create(&spec("Orders-Cache"), &mut state).await.unwrap();

        assert_eq!(state.id.as_deref(), Some("orders-cache"));
        assert_eq!(fake.calls()[0], Call::Create("orders-cache".to_string()));
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.replication_group_id, "orders-cache");
        assert_eq!(view.status, "available");
        assert_eq!(view.cache_nodes.len(), 2);
        assert_eq!(state.create_settings.as_ref().map(|s| s.port), Some(6379));

        reconciler.read(&mut state).await.unwrap();
        assert_eq!(state.id.as_deref(), Some("orders-cache"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_only_changes_fail_before_any_remote_call() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        reconciler.read(&mut state).await.unwrap();
        let reads = fake.calls().len();

        let mut port = spec("orders");
        port.port = 6380;
        let err = reconciler.update(&port, &mut state).await.unwrap_err();
        assert!(matches!(err, Error::StdError(StdError::ValidationError { .. })));

        let mut subnet = spec("orders");
        subnet.subnet_group_name = Some("public".to_string());
        let err = reconciler.update(&subnet, &mut state).await.unwrap_err();
        assert!(matches!(err, Error::StdError(StdError::ValidationError { .. })));

        assert_eq!(fake.calls().len(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_fields_are_sent_in_one_modification() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        let mut desired = spec("orders");
        desired.node_type = "cache.m5.xlarge".to_string();
        desired.engine_version = Some("7.1".to_string());
        desired.apply_immediately = true;
        fake.script([
            Scripted::Status("available"),
            Scripted::Status("modifying"),
            Scripted::Status("available"),
        ]);

        let patched = reconciler.update(&desired, &mut state).await.unwrap();

        assert!(patched);
        let mutations = fake.mutating_calls();
        assert_eq!(mutations.len(), 1);
        let Call::Modify(id, request) = &mutations[0] else {
            panic!("expected a modification, got {mutations:?}");
        };
        assert_eq!(id, "orders");
        assert!(request.apply_immediately);
        assert_eq!(request.changed_fields(), vec!["node_type", "engine_version"]);
    }

    #[tokio::test(start_paused = true)]
    async fn create_timeout_keeps_the_identity() {
        let fake = FakeElastiCache::default();
        let settings = ReconcileSettings::default().with_overrides(&Timeouts {
            create: Some(60),
            ..Default::default()
        });
        let reconciler = GroupReconciler::new(&fake, settings);
        let mut state = GroupState::default();

        let err = reconciler.create(&spec("orders"), &mut state).await.unwrap_err();

        assert!(matches!(err, Error::StdError(StdError::PollTimeout { .. })));
        assert_eq!(state.id.as_deref(), Some("orders"));
        assert!(state.create_settings.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_until_the_group_is_gone() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        fake.script([
            Scripted::Status("deleting"),
            Scripted::Status("deleting"),
            Scripted::NotFound,
        ]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");

        reconciler.delete(&spec("orders"), &mut state).await.unwrap();

        assert_eq!(state, GroupState::default());
        assert_eq!(fake.mutating_calls(), vec![Call::Delete("orders".to_string())]);
        let describes = fake
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::DescribeGroup(_)))
            .count();
        assert_eq!(describes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_a_missing_group_succeeds() {
        let fake = FakeElastiCache::default();
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");

        reconciler.delete(&spec("orders"), &mut state).await.unwrap();

        assert_eq!(state.id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_without_identity_uses_the_configured_identifier() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        fake.script([Scripted::Status("deleting"), Scripted::NotFound]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = GroupState::default();

        reconciler.delete(&spec("Orders"), &mut state).await.unwrap();

        assert_eq!(fake.mutating_calls(), vec![Call::Delete("orders".to_string())]);
        assert_eq!(state, GroupState::default());
    }

    #[tokio::test]
    async fn submitted_create_records_the_identity_before_waiting() {
        let fake = FakeElastiCache::default();
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = GroupState::default();

        reconciler.submit_create(&spec("Orders"), &mut state).await.unwrap();

        assert_eq!(state.id.as_deref(), Some("orders"));
        assert!(state.create_settings.is_some());
        assert!(state.view.is_none());
        assert_eq!(fake.calls(), vec![Call::Create("orders".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_changes_are_sent_once() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        fake.script([Scripted::Status("available"), Scripted::Status("available")]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        let mut desired = spec("orders");
        desired.node_type = "cache.m5.xlarge".to_string();

        assert!(reconciler.update(&desired, &mut state).await.unwrap());
        let view = state.view.clone().unwrap();
        assert_eq!(view.node_type.as_deref(), Some("cache.m5.large"));
        assert_eq!(view.settled_node_type(), Some("cache.m5.xlarge"));

        assert!(!reconciler.update(&desired, &mut state).await.unwrap());

        let modifications = fake
            .mutating_calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Modify(..)))
            .count();
        assert_eq!(modifications, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_topic_is_reactivated() {
        let arn = "arn:aws:sns:eu-north-1:1:alerts";
        let fake = FakeElastiCache::with_group(available_group("orders"));
        let mut first = detail("orders-001");
        first.notification_topic_arn = Some(arn.to_string());
        first.notification_topic_status = Some("inactive".to_string());
        fake.set_detail(first);
        fake.script([Scripted::Status("available"), Scripted::Status("available")]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        let mut desired = spec("orders");
        desired.notification_topic_arn = Some(arn.to_string());

        assert!(reconciler.update(&desired, &mut state).await.unwrap());

        let mutations = fake.mutating_calls();
        let [Call::Modify(_, request)] = mutations.as_slice() else {
            panic!("expected one modification, got {mutations:?}");
        };
        assert_eq!(request.notification_topic_status, Some(NotificationTopicStatus::Active));
        assert_eq!(
            state.view.as_ref().and_then(|v| v.notification_topic_status.as_deref()),
            Some("active")
        );
        assert!(!reconciler.update(&desired, &mut state).await.unwrap());
    }

    #[tokio::test]
    async fn failed_member_describe_fails_the_read() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");
        reconciler.read(&mut state).await.unwrap();
        let before = state.view.clone();
        assert!(before.is_some());

        fake.fail_member("orders-002", "throttled");
        let err = reconciler.read(&mut state).await.unwrap_err();

        assert!(matches!(
            err,
            Error::StdError(StdError::RemoteError { ref id, .. }) if id == "orders"
        ));
        assert!(err.to_string().contains("throttled"));
        assert_eq!(state.view, before);
    }

    #[tokio::test]
    async fn read_of_a_missing_group_clears_the_identity() {
        let fake = FakeElastiCache::default();
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");

        reconciler.read(&mut state).await.unwrap();

        assert_eq!(state.id, None);
        assert_eq!(state.view, None);
    }

    #[tokio::test]
    async fn read_propagates_transport_errors() {
        let fake = FakeElastiCache::with_group(available_group("orders"));
        fake.script([Scripted::Error("throttled")]);
        let reconciler = GroupReconciler::new(&fake, ReconcileSettings::default());
        let mut state = tracked("orders");

        let err = reconciler.read(&mut state).await.unwrap_err();

        assert!(err.to_string().contains("throttled"));
        assert_eq!(state.id.as_deref(), Some("orders"));
    }

    #[test]
    fn overrides_only_touch_the_timeouts() {
        let settings = ReconcileSettings::default().with_overrides(&Timeouts {
            update: Some(120),
            ..Default::default()
        });
        assert_eq!(settings.update.timeout, Duration::from_secs(120));
        assert_eq!(settings.update.delay, Duration::from_secs(5));
        assert_eq!(settings.create, ReconcileSettings::default().create);
    }
}

use crate::api::v1::replicationgroup::{ReplicationGroup, ReplicationGroupStatus, REPLICATION_GROUP_FINALIZER};
use crate::controllers::replication_group::status::{GroupLifecycle, CREATING, DELETING, MODIFYING, SNAPSHOTTING};
use crate::controllers::replication_group::{GroupReconciler, GroupState, ReconcileSettings};
use crate::elasticache::ElastiCacheApi;
use crate::util::errors::{self, Error, Result, StdError};
use crate::util::status::{GroupPhase, GroupStatusManager};
use crate::util::{metrics, telemetry};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event as Finalizer},
        watcher::Config,
    },
    Resource,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

pub const FIELD_MANAGER: &str = "replication-group-controller";

impl GroupState {
    /// Restores the persisted handle. The view is always read fresh.
    pub fn from_status(status: Option<&ReplicationGroupStatus>) -> Self {
        GroupState {
            id: status.and_then(|s| s.replication_group_id.clone()),
            view: None,
            create_settings: status.and_then(|s| s.create_settings.clone()),
        }
    }
}

fn phase_of(state: &GroupState) -> GroupPhase {
    let Some(view) = &state.view else {
        return if state.id.is_some() {
            GroupPhase::Creating
        } else {
            GroupPhase::Pending
        };
    };
    match view.status.as_str() {
        CREATING => GroupPhase::Creating,
        MODIFYING | SNAPSHOTTING => GroupPhase::Modifying,
        DELETING => GroupPhase::Deleting,
        status => match GroupLifecycle::from_status(status) {
            GroupLifecycle::Available => GroupPhase::Available,
            GroupLifecycle::Pending => GroupPhase::Pending,
            GroupLifecycle::Deleted => GroupPhase::Deleting,
            GroupLifecycle::Unknown => GroupPhase::Failed,
        },
    }
}

fn failure_phase(state: &GroupState, error: &Error) -> GroupPhase {
    match error.inner() {
        StdError::ValidationError { .. }
        | StdError::UnexpectedStatus { .. }
        | StdError::ResourceVanished { .. } => GroupPhase::Failed,
        _ => phase_of(state),
    }
}

impl ReplicationGroup {
    // Reconcile (for non-finalizer related changes)
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());
        let reconciler = GroupReconciler::new(
            ctx.api.as_ref(),
            ctx.settings.with_overrides(&self.spec.timeouts),
        );
        let mut state = GroupState::from_status(self.status.as_ref());

        let result = self.apply(&reconciler, &mut state, &ctx, &recorder).await;

        // the identity has to be persisted even when the pass failed
        let (phase, error) = match &result {
            Ok(_) => (phase_of(&state), None),
            Err(e) => (failure_phase(&state, e), Some(e)),
        };
        let published = GroupStatusManager::new(&ctx.client, self)
            .publish(&state, phase, error)
            .await;

        let patched = result?;
        published?;

        if patched {
            return Ok(Action::requeue(Duration::from_secs(30)));
        }
        if phase != GroupPhase::Available {
            return Ok(Action::requeue(Duration::from_secs(60)));
        }
        // If no events were received, check back every 5 minutes
        Ok(Action::requeue(Duration::from_secs(5 * 60)))
    }

    async fn apply(
        &self,
        reconciler: &GroupReconciler<'_>,
        state: &mut GroupState,
        ctx: &Context,
        recorder: &Recorder,
    ) -> Result<bool> {
        if state.id.is_some() {
            reconciler.read(state).await?;
        }

        if state.id.is_none() {
            self.publish_event(
                recorder,
                EventType::Normal,
                "CreateRequested",
                "Creating",
                format!("Creating replication group `{}`", self.spec.replication_group_id),
            )
            .await;
            let submitted = reconciler.submit_create(&self.spec, state).await;
            ctx.metrics.record_operation("create", submitted.is_ok());
            submitted?;

            // the wait can outlive this process, so the identity is stored first
            GroupStatusManager::new(&ctx.client, self)
                .publish(state, GroupPhase::Creating, None)
                .await?;
            reconciler.await_created(state).await?;
            self.publish_event(
                recorder,
                EventType::Normal,
                "Created",
                "Creating",
                format!("Replication group `{}` is available", state.id.as_deref().unwrap_or_default()),
            )
            .await;
            return Ok(true);
        }

        let updated = reconciler.update(&self.spec, state).await;
        if let Ok(patched) = &updated {
            if *patched {
                ctx.metrics.record_operation("modify", true);
                self.publish_event(
                    recorder,
                    EventType::Normal,
                    "Modified",
                    "Modifying",
                    format!("Modified replication group `{}`", state.id.as_deref().unwrap_or_default()),
                )
                .await;
            }
        }
        updated
    }

    // Finalizer cleanup (the object was deleted, ensure nothing is orphaned)
    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());
        self.publish_event(
            &recorder,
            EventType::Normal,
            "DeleteRequested",
            "Deleting",
            format!("Delete `{}`", self.name_any()),
        )
        .await;

        let reconciler = GroupReconciler::new(
            ctx.api.as_ref(),
            ctx.settings.with_overrides(&self.spec.timeouts),
        );
        let mut state = GroupState::from_status(self.status.as_ref());

        let deleted = reconciler.delete(&self.spec, &mut state).await;
        ctx.metrics.record_operation("delete", deleted.is_ok());
        if let Err(e) = &deleted {
            if let Err(status_error) = GroupStatusManager::new(&ctx.client, self)
                .publish(&state, GroupPhase::Deleting, Some(e))
                .await
            {
                warn!("failed to record delete failure: {}", status_error);
            }
        }
        deleted?;

        Ok(Action::await_change())
    }

    async fn publish_event(
        &self,
        recorder: &Recorder,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            reason: reason.into(),
            note: Some(note),
            action: action.into(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(&event, &self.object_ref(&())).await {
            warn!("failed to publish {} event for {}: {}", reason, self.name_any(), e);
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(
        &self,
        client: Client,
        api: Arc<dyn ElastiCacheApi>,
        settings: ReconcileSettings,
    ) -> Result<Arc<Context>, prometheus::Error> {
        Ok(Arc::new(Context {
            client,
            api,
            settings,
            metrics: metrics::Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// ElastiCache control plane
    pub api: Arc<dyn ElastiCacheApi>,
    /// Default wait settings, overridable per resource
    pub settings: ReconcileSettings,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
}

#[instrument(skip(ctx, group), fields(trace_id))]
pub async fn reconcile(group: Arc<ReplicationGroup>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure("replication-group");
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = group
        .namespace()
        .ok_or_else(|| StdError::MetadataMissing(format!("namespace of {}", group.name_any())))?;
    let groups: Api<ReplicationGroup> = Api::namespaced(ctx.client.clone(), &ns);

    info!("Reconciling ReplicationGroup \"{}\" in {}", group.name_any(), ns);
    finalizer(&groups, REPLICATION_GROUP_FINALIZER, group, |event| async {
        match event {
            Finalizer::Apply(group) => group.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(group) => group.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| errors::Error::StdError(errors::StdError::FinalizerError(Box::new(e))))
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: FIELD_MANAGER.into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

fn error_policy(group: Arc<ReplicationGroup>, error: &errors::Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&group, error);
    Action::requeue(error.requeue_after())
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, api: Arc<dyn ElastiCacheApi>, settings: ReconcileSettings) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("failed to create kube Client")?;

    let groups = Api::<ReplicationGroup>::all(client.clone());
    if let Err(e) = groups.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(e).context("ReplicationGroup CRD is not installed");
    }

    let ctx = state.to_context(client, api, settings)?;
    Controller::new(groups, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

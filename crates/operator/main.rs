use std::sync::Arc;

use clap::Parser;
use replication_group::controllers::replication_group::ReconcileSettings;
use replication_group::controllers::replication_group_controller::{self, State};
use replication_group::elasticache::{AwsElastiCache, ElastiCacheApi};
use replication_group::util::telemetry;
use tracing::info;

mod config;
mod handlers;
mod server;

use config::OperatorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();
    telemetry::init(config.log_format.into())?;

    let api: Arc<dyn ElastiCacheApi> = Arc::new(AwsElastiCache::connect(&config.aws_settings()).await);

    // Initialize Kubernetes controller state
    let state = State::default();
    let controller = replication_group_controller::run(state.clone(), api, ReconcileSettings::default());

    info!("Serving health and metrics on {}", config.listen_address);
    let server = server::start_server(state, &config.listen_address);

    // Both runtimes implements graceful shutdown, so poll until both are done
    let (controller, server) = tokio::join!(controller, server);
    controller?;
    server?;
    Ok(())
}

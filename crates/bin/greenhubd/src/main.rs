//! # greenhubd
//!
//! Composition root that wires all adapters together and runs the hub.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize logging
//! - Open the `SQLite` database and run migrations
//! - Create the MQTT client and the core components (registry, rule engine,
//!   scheduler, ingestion pipeline, history writer)
//! - Load persisted scenarios and schedules
//! - Spawn the bus driver and serve the HTTP API
//! - Shut down on SIGINT/SIGTERM or on the first fatal error, granting
//!   in-flight work a grace period
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;
mod shutdown;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use greenhub_adapter_http_axum::router;
use greenhub_adapter_http_axum::state::AppState;
use greenhub_adapter_mqtt::MqttClient;
use greenhub_adapter_storage_sqlite_sqlx::{
    SqliteDeviceRepository, SqliteScenarioRepository, SqliteScheduleRepository,
    SqliteTelemetryHistoryRepository,
};
use greenhub_app::history::HistoryWriter;
use greenhub_app::ingestion::{self, IngestionPipeline, PipelineContext};
use greenhub_app::registry::DeviceRegistry;
use greenhub_app::rule_engine::{RuleEngine, ScenarioSet};
use greenhub_app::scheduler::Scheduler;
use greenhub_app::services::device_service::DeviceService;
use greenhub_app::services::scenario_service::ScenarioService;
use greenhub_app::services::schedule_service::ScheduleService;
use greenhub_domain::topic::Topics;

use crate::config::Config;

type Pipeline =
    IngestionPipeline<SqliteDeviceRepository, SqliteTelemetryHistoryRepository, MqttClient, MqttClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting greenhubd");

    let shutdown = CancellationToken::new();
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<anyhow::Error>(4);

    // Database
    let db = config
        .storage()
        .build()
        .await
        .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let device_repo = Arc::new(SqliteDeviceRepository::new(pool.clone()));
    let history_repo = Arc::new(SqliteTelemetryHistoryRepository::new(pool.clone()));
    let scenario_repo = Arc::new(SqliteScenarioRepository::new(pool.clone()));
    let schedule_repo = Arc::new(SqliteScheduleRepository::new(pool));

    // Message bus
    let (mqtt, driver) = greenhub_adapter_mqtt::connect(&config.mqtt);
    let mqtt = Arc::new(mqtt);
    let topics = Topics::new(config.mqtt.base_topic.as_str());

    // Core
    let registry = Arc::new(DeviceRegistry::new());
    let scenarios = Arc::new(ScenarioSet::new());
    let rule_engine = Arc::new(RuleEngine::new(Arc::clone(&scenarios), Arc::clone(&mqtt)));
    let scheduler = Scheduler::new(
        Arc::clone(&mqtt),
        Arc::clone(&registry),
        topics.clone(),
        shutdown.clone(),
    );
    // outlives the pipeline so the last telemetry still reaches the history
    let history_shutdown = CancellationToken::new();
    let (history, history_task) = HistoryWriter::spawn(
        Arc::clone(&history_repo),
        config.ingestion.history_queue_capacity,
        history_shutdown.clone(),
    );
    let pipeline: Pipeline = IngestionPipeline::start(
        PipelineContext {
            registry: Arc::clone(&registry),
            rule_engine,
            history,
            device_repo,
            history_repo: Arc::clone(&history_repo),
            subscriber: Arc::clone(&mqtt),
            topics: topics.clone(),
        },
        ingestion::IngestionConfig {
            device_queue_capacity: config.ingestion.device_queue_capacity,
            discovery_queue_capacity: config.ingestion.discovery_queue_capacity,
        },
        &shutdown,
    );

    // Services
    let scenario_service =
        ScenarioService::new(scenario_repo, Arc::clone(&scenarios), Arc::clone(&registry));
    scenario_service
        .load()
        .await
        .context("failed to load scenarios")?;
    let schedule_service =
        ScheduleService::new(schedule_repo, scheduler.clone(), Arc::clone(&registry));
    schedule_service
        .load_all()
        .await
        .context("failed to load schedules")?;
    let device_service = DeviceService::new(registry, history_repo, Arc::clone(&mqtt), topics)
        .with_permit_join_secs(config.mqtt.permit_join_secs);

    // Bus driver
    let driver_task = {
        let fatal = fatal_tx.clone();
        let pipeline = pipeline.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = driver.run(pipeline, token).await {
                report_fatal(&fatal, anyhow::Error::new(err).context("message bus unavailable"))
                    .await;
            }
        })
    };

    // HTTP
    let state = AppState::new(device_service, scenario_service, schedule_service);
    let app = router::build(state);
    let http_task = tokio::spawn(serve(
        app,
        config.bind_addr(),
        shutdown.clone(),
        fatal_tx,
    ));

    let outcome = tokio::select! {
        () = shutdown::signal() => Ok(()),
        Some(err) = fatal_rx.recv() => {
            tracing::error!(error = %format!("{err:#}"), "fatal error, shutting down");
            Err(err)
        }
    };

    shutdown.cancel();
    pipeline.stop();
    let tasks = async {
        join("bus driver", driver_task).await;
        join("http server", http_task).await;
        pipeline.join().await;
        scheduler.join_all().await;
        history_shutdown.cancel();
        join("history writer", history_task).await;
    };
    if tokio::time::timeout(config.grace_period(), tasks).await.is_err() {
        tracing::warn!(
            grace_secs = config.grace_period().as_secs(),
            "grace period elapsed before every task finished"
        );
        history_shutdown.cancel();
    }
    db.close().await;
    tracing::info!("greenhubd stopped");

    outcome
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(
    app: axum::Router,
    bind_addr: String,
    shutdown: CancellationToken,
    fatal: mpsc::Sender<anyhow::Error>,
) {
    let result = async {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        tracing::info!(%bind_addr, "greenhubd listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("http server failed")
    }
    .await;
    if let Err(err) = result {
        report_fatal(&fatal, err).await;
    }
}

async fn report_fatal(fatal: &mpsc::Sender<anyhow::Error>, err: anyhow::Error) {
    if let Err(mpsc::error::SendError(err)) = fatal.send(err).await {
        tracing::error!(error = %format!("{err:#}"), "fatal error after shutdown");
    }
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(err) = task.await {
        tracing::warn!(task = name, error = %err, "task ended abnormally");
    }
}

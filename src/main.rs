//! Risk Score Service - Main Entry Point
//!
//! Loads the scaler and classifier once, then serves scoring requests over
//! NATS request/reply with bounded parallelism.

use anyhow::{Context, Result};
use futures::StreamExt;
use risk_score_service::{
    config::{AppConfig, LoggingConfig},
    consumer::{RequestConsumer, RequestKind},
    metrics::{MetricsReporter, ScoringMetrics},
    models::loader::ModelLoader,
    producer::ReplyPublisher,
    service::ScoringService,
    RiskScorer,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting Risk Score Service");
    info!(
        floor = config.scoring.floor,
        ceiling = config.scoring.ceiling,
        variance_threshold = config.scoring.variance_threshold,
        variance_bound = config.scoring.variance_bound,
        "Scoring policy loaded"
    );

    // Artifacts load before any subscription; failure here keeps the service off the bus
    let loader = ModelLoader::with_threads(config.models.onnx_threads);
    let models = loader
        .load(&config.models)
        .context("Model artifacts unavailable")?;
    let scorer = RiskScorer::new(models.scaler, models.classifier, config.scoring.clone())
        .context("Invalid scoring policy")?;

    let metrics = Arc::new(ScoringMetrics::new());
    let service = Arc::new(ScoringService::new(scorer, metrics.clone()));
    info!(
        classifier = %service.scorer().classifier_name(),
        "Scoring pipeline ready"
    );

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats);
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers;
    let semaphore = Arc::new(Semaphore::new(num_workers));
    info!(
        workers = num_workers,
        subject = %consumer.score_subject(),
        "Serving scoring requests"
    );

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut requests = consumer.subscribe().await?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (kind, message) = tokio::select! {
            next = requests.next() => match next {
                Some(request) => request,
                None => {
                    warn!("Request subscriptions closed");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        };

        let Some(inbox) = message.reply.clone() else {
            warn!(subject = %message.subject, "Request without reply inbox dropped");
            continue;
        };

        // Acquire permit (limits concurrent tasks)
        let permit = semaphore.clone().acquire_owned().await?;
        let service = service.clone();
        let publisher = publisher.clone();

        tokio::spawn(async move {
            let reply = match kind {
                RequestKind::Score => service.handle_score(&message.payload),
                RequestKind::Predict => service.handle_predict(&message.payload),
                RequestKind::Health => service.health(),
            };

            if let Err(e) = publisher.publish(inbox, reply).await {
                error!(subject = %message.subject, error = %e, "Failed to publish reply");
            }

            drop(permit);
        });
    }

    info!("Risk Score Service shutting down...");

    wait_for_in_flight(&semaphore, num_workers).await?;

    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS connection");
    }
    metrics.print_summary();

    Ok(())
}

/// Wait until every worker permit is back, i.e. every in-flight reply is sent
async fn wait_for_in_flight(semaphore: &Semaphore, workers: usize) -> Result<()> {
    let _permits = semaphore.acquire_many(workers as u32).await?;
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("risk_score_service={}", logging.level).parse()?),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }

    Ok(())
}

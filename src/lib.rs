//! burstwatch -- burst alerting over classified security logs.
//!
//! This crate provides the detection engine, the alert lifecycle store,
//! the auto-refresh scheduler and the log store / classifier clients that
//! feed them, plus a small JSON API over the resulting state.

pub mod alerts;
pub mod api;
pub mod config;
pub mod detect;
pub mod logs;
pub mod pipeline;
pub mod scheduler;
pub mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::alerts::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::alerts::AlertStore;
use crate::config::{Config, NotificationConfig, NotifierKind};
use crate::detect::DetectionEngine;
use crate::pipeline::{CycleReport, LogRefresh};
use crate::source::classifier::HttpClassifier;
use crate::source::graylog::GraylogFeed;

/// Build the notification side-channel selected in `[notifications]`.
pub fn build_notifier(config: &NotificationConfig) -> Result<Option<Arc<dyn Notifier>>> {
    let notifier: Option<Arc<dyn Notifier>> = match config.kind {
        NotifierKind::None => None,
        NotifierKind::Log => Some(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .context("webhook notifications need a webhook_url")?;
            let timeout = std::time::Duration::from_secs(config.timeout_secs);
            Some(Arc::new(WebhookNotifier::new(url, timeout)?))
        }
    };
    Ok(notifier)
}

/// Wire the HTTP feed, the classifier and a fresh alert store into a
/// refresh action.
pub fn build_refresh(config: &Config) -> Result<LogRefresh> {
    let engine = DetectionEngine::new(config.rules.clone()).context("invalid rule table")?;
    let mut store = AlertStore::new(engine);
    if let Some(notifier) = build_notifier(&config.notifications)? {
        store = store.with_notifier(notifier);
    }

    let feed = GraylogFeed::new(&config.feed.search_url, config.feed.timeout())
        .context("failed to build log feed client")?;
    let classifier = HttpClassifier::new(&config.classifier.predict_url, config.classifier.timeout())
        .context("failed to build classifier client")?;

    Ok(LogRefresh::new(
        Arc::new(feed),
        Arc::new(classifier),
        store.into_shared(),
        config.feed.log_limit,
        config.classifier.concurrency,
    ))
}

/// Run a single refresh cycle without the scheduler.
pub async fn run_once(config: &Config) -> Result<CycleReport> {
    let refresh = build_refresh(config)?;
    refresh.run_cycle().await
}

/// Start the burstwatch daemon: scheduler plus API server.
pub async fn serve(config: Config) -> Result<()> {
    config.validate()?;

    // 1. Refresh pipeline
    let refresh = build_refresh(&config)?;
    let alerts = refresh.alerts();
    let batch = refresh.batch();

    // 2. Scheduler (background task)
    let (scheduler, scheduler_task) = scheduler::spawn(&config.scheduler, Arc::new(refresh));

    // 3. API server
    let state = api::state::AppState {
        alerts,
        scheduler,
        batch,
        rules: Arc::new(config.rules.clone()),
    };
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        %addr,
        interval_secs = config.scheduler.interval_secs,
        auto_refresh = config.scheduler.enabled,
        rules = config.rules.len(),
        "burstwatch listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_task.abort();
    tracing::info!("burstwatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use gatehouse::admin::AdminConsole;
use gatehouse::config::BotConfig;
use gatehouse::dispatcher::Dispatcher;
use gatehouse::graph::{GraphCatalog, QuestionGraph, RegexPattern, Validator};
use gatehouse::interview::{InMemorySessionStore, Interviewer};
use gatehouse::platform::{ConsoleSource, EventSource, MemoryPlatform};
use gatehouse::routes::{StatusRouteState, status_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🚪 Gatehouse v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Tenant: {}", config.tenant.tenant_id);
    eprintln!("   Question graph: {}", config.graph_path.display());
    eprintln!("   Command channel: {}", config.tenant.command_channel);
    eprintln!("   Grace window: {}s", config.grace.as_secs());

    // ── Question graph ───────────────────────────────────────────────────
    let catalog = GraphCatalog::new();
    match QuestionGraph::load(&config.graph_path).await {
        Ok(graph) => {
            eprintln!("   Graph version: {} ({} questions)", graph.version, graph.questions.len());
            catalog.install(&config.tenant.tenant_id, graph).await;
        }
        Err(e) => {
            // Keep running: joins report the missing configuration until an
            // administrator fixes the document and restarts.
            tracing::error!(path = %config.graph_path.display(), error = %e, "Failed to load question graph");
            eprintln!("   Graph: not loaded ({e})");
        }
    }

    // ── Engine ───────────────────────────────────────────────────────────
    let platform = Arc::new(MemoryPlatform::new().with_echo());
    let mut interviewer = Interviewer::new(
        config.tenant.clone(),
        catalog,
        platform.clone(),
        Arc::new(InMemorySessionStore::new()),
        config.grace,
    );
    if config.enforce_patterns {
        eprintln!("   Answer patterns: enforced");
        interviewer = interviewer.with_validator(Validator::new(Arc::new(RegexPattern)));
    }
    let interviewer = Arc::new(interviewer);
    let admin = Arc::new(AdminConsole::new(Arc::clone(&interviewer), config.pacing));

    // ── Status API ───────────────────────────────────────────────────────
    if let Some(port) = config.status_port {
        let app = status_routes(StatusRouteState {
            interviewer: Arc::clone(&interviewer),
        });
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("Failed to bind status port {port}"))?;
        eprintln!("   Status API: http://0.0.0.0:{port}/api/interviews/status");
        tokio::spawn(async move {
            tracing::info!(port, "Status server started");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Status server stopped");
            }
        });
    }

    // ── Events ───────────────────────────────────────────────────────────
    let source = ConsoleSource::new(platform, config.tenant.command_channel.clone());
    eprintln!("   Events: {}", source.name());
    eprintln!("   Type `join <id>`, `say <id> <text>` or `!help`. Ctrl+C to exit.\n");
    let events = source.start().await?;

    Dispatcher::new(interviewer, admin).run(events).await;
    Ok(())
}

/// Console logging, plus a daily-rolling file under `log_dir` when set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gatehouse.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

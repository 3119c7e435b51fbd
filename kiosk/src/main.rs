//! Queue kiosk operator console.
//!
//! Reads commands from stdin, one per line, and drives the queue store. A
//! background observer logs every event the store broadcasts, standing in for
//! the public display.

use anyhow::Context;
use kiosk::console::{Console, Reply, HELP};
use kiosk::metrics::register_business_metrics;
use kiosk::{build_store, KioskConfig, LogNotifier, QueueAction, QueueEnvironment};
use kiosk_core::environment::SystemClock;
use kiosk_runtime::metrics::PrometheusMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiosk=info,kiosk_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = KioskConfig::from_env().context("failed to load kiosk configuration")?;
    info!(
        services = config.services.len(),
        windows = config.windows.len(),
        print_on_issue = config.print_on_issue,
        "Configuration loaded"
    );

    let mut metrics = PrometheusMetrics::new();
    metrics.install().context("failed to install metrics recorder")?;
    register_business_metrics();

    let env = QueueEnvironment::new(Arc::new(SystemClock), LogNotifier::shared());
    let store = Arc::new(build_store(config, env));

    let observer = tokio::spawn(observe(store.subscribe_actions()));
    let console = Console::new(Arc::clone(&store), metrics);

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match console.handle_line(&line).await {
            Reply::Continue(text) if text.is_empty() => {},
            Reply::Continue(text) => println!("{text}"),
            Reply::Quit => break,
        }
    }

    info!("Shutting down");
    if let Err(error) = store.shutdown(SHUTDOWN_TIMEOUT).await {
        warn!(%error, "Pending notifications did not finish");
    }
    observer.abort();

    Ok(())
}

/// Log every event the store broadcasts
async fn observe(mut rx: broadcast::Receiver<QueueAction>) {
    loop {
        match rx.recv().await {
            Ok(QueueAction::TicketIssued { ticket }) => {
                info!(code = %ticket.display_code, service = %ticket.service_id, "Ticket issued");
            },
            Ok(QueueAction::TicketCalled { ticket, window_id }) => {
                info!(code = %ticket.display_code, window = %window_id, "Ticket called");
            },
            Ok(QueueAction::CallRepeated { ticket, window_id }) => {
                info!(code = %ticket.display_code, window = %window_id, "Call repeated");
            },
            Ok(QueueAction::TicketCompleted { ticket, window_id }) => {
                info!(code = %ticket.display_code, window = %window_id, "Ticket completed");
            },
            Ok(QueueAction::Rejected { error, .. }) => {
                info!(reason = error.reason(), %error, "Command rejected");
            },
            Ok(_) => {},
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Display observer lagged");
            },
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

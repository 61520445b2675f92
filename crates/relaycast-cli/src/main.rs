//! relaycast: send a queue of text messages to contacts or groups, forever.
//!
//! Run with: cargo run -p relaycast-cli
//!
//! Settings come from `relaycast.toml` and `RELAYCAST_*` variables; `RUST_LOG`
//! controls log verbosity.

mod prompt;
mod settings;

use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context as _;
use relaycast_core::SessionContext;
use relaycast_session::{Supervisor, storage::FileProgressStore};
use relaycast_transport::GatewayClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{prompt::TerminalOperator, settings::Settings};

/// How long to wait for an in-flight prompt after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    install_panic_hook();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run());
    // A blocking prompt may still be waiting on stdin.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "Exiting");
    }
    ExitCode::from(exit_status(&result))
}

/// 0 on a clean stop, 1 on any fatal error.
fn exit_status(result: &anyhow::Result<()>) -> u8 {
    u8::from(result.is_err())
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    tracing::debug!(?settings, "Settings loaded");

    let shutdown = CancellationToken::new();
    spawn_interrupt_handler(shutdown.clone());

    let supervisor = Supervisor::new(
        GatewayClient::new(settings.gateway_config()),
        Arc::new(FileProgressStore::new(&settings.progress_file)),
        Arc::new(TerminalOperator),
        settings.network_monitor(),
        Arc::new(SessionContext::new()),
        settings.supervisor_config(),
    );

    supervisor.run(shutdown).await?;
    Ok(())
}

fn spawn_interrupt_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

/// Route panics from any thread through the log.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |l| format!("{}:{}", l.file(), l.line()));

        tracing::error!(%location, "Panic: {message}");
    }));
}

//! lottery-client — submit one agency's bets and fetch its winners.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lottery_client::{CsvSource, Driver, RunOutcome, TcpDialer};
use lottery_core::ClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ClientConfig::load().context("failed to load client config")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let dialer = TcpDialer::from_config(&config);
    tracing::info!(
        client_id = %config.id,
        agency = config.agency,
        server = %dialer.address(),
        batch_max_amount = config.batch_max_amount,
        loop_period_ms = config.loop_period_ms,
        "client starting"
    );

    let mut source = CsvSource::open(&config.data_path)
        .await
        .with_context(|| format!("failed to open bets file {}", config.data_path.display()))?;

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            cancel.cancel();
        });
    }

    let driver = Driver::new(dialer, &config);
    match driver.run(&mut source, cancel).await {
        Ok(RunOutcome::Completed(report)) => {
            tracing::info!(
                action = "winners_query",
                result = "success",
                winners = report.winners.len(),
                "agency winners"
            );
            Ok(())
        }
        Ok(RunOutcome::Cancelled) => Ok(()),
        Err(e) => Err(e).context("client run failed"),
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

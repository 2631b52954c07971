use eyre::{Result, WrapErr};
use tokio::{
    select,
    signal::unix::{signal, SignalKind},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod budget;
pub mod bucket;
pub mod config;
pub mod confirmation;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod feed;
pub mod filters;
mod metrics;
pub mod mempool;
pub mod order;
pub mod pipeline;
pub mod price;
pub mod profitability;
pub mod registry;
pub mod service;
pub mod signer;
pub mod swap;
pub mod unlocker;

#[cfg(test)]
pub mod tests_support;

pub use service::serve_healthcheck;

/// Periodically publish process uptime and per-chain budget usage gauges until cancelled. Driven
/// externally rather than from within [`Pipeline`] since budget usage is a registry-wide view,
/// not a single take-chain's concern.
///
/// [`Pipeline`]: pipeline::Pipeline
pub async fn run_metrics_reporter(
    registry: std::sync::Arc<registry::ChainRegistry>,
    batch_unlockers: Vec<std::sync::Arc<unlocker::BatchUnlocker>>,
    tick: std::time::Duration,
    cancellation: CancellationToken,
) {
    std::sync::LazyLock::force(&metrics::DESCRIPTIONS);

    let started_at = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(tick);
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => break,
            _ = interval.tick() => {
                metrics::record_uptime(started_at.elapsed());
                for chain_id in registry.chain_ids() {
                    let Ok(chain) = registry.get(chain_id) else { continue };
                    let tvl_usd: f64 =
                        chain.tvl_budget.current_usage().to_string().parse().unwrap_or(0.0);
                    let non_finalized_usd: f64 = chain
                        .non_finalized_budget
                        .current_usage()
                        .to_string()
                        .parse()
                        .unwrap_or(0.0);
                    metrics::record_tvl_budget_usage(chain_id, tvl_usd);
                    metrics::record_non_finalized_budget_usage(chain_id, non_finalized_usd);
                }
                for batch_unlocker in &batch_unlockers {
                    for (key, age_secs) in batch_unlocker.open_batch_ages().await {
                        metrics::record_partial_batch_age(key.give_chain, age_secs);
                    }
                }
            }
        }
    }
}

/// Register SIGINT/SIGTERM handlers that cancel a shared token, initiating graceful shutdown.
pub fn handle_signals() -> Result<CancellationToken> {
    let cancellation_token = CancellationToken::new();

    let mut sigint =
        signal(SignalKind::interrupt()).wrap_err("failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("failed to register SIGTERM handler")?;

    tokio::spawn({
        let cancel_token = cancellation_token.clone();
        async move {
            select! {
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                }
            }
            cancel_token.cancel();
        }
    });

    debug!("ready to handle SIGINT or SIGTERM");
    Ok(cancellation_token)
}

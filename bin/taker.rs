use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crosschain_taker::config::{self, ChainIntegration};
use crosschain_taker::dispatcher;
use crosschain_taker::executor::{evm::EvmChainClient, solana::SolanaChainClient, ChainClient, FulfillParams};
use crosschain_taker::mempool::MempoolScheduler;
use crosschain_taker::pipeline::{GiveChainOrderState, OrderStateClient, Pipeline, PipelineContext, TokenDecimalsResolver};
use crosschain_taker::price::CoingeckoPriceService;
use crosschain_taker::registry::ChainEngine;
use crosschain_taker::signer::{AccountId, SignedPayload, TokenId, TxHash};
use crosschain_taker::swap::DefaultSwapConnector;
use crosschain_taker::unlocker::{BatchKey, BatchUnlocker, UnlockTxBuilder};
use tracing::info;

fn should_print_help() -> bool {
    std::env::args().any(|arg| {
        let lowercase_arg = arg.to_ascii_lowercase();
        lowercase_arg == "-h" || lowercase_arg == "--help"
    })
}

fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    let env_vars = config::env_var_info();
    println!(
        r#"Cross-chain taker bot v{version}

Run with no args. The process will run until it receives a SIGTERM or SIGINT signal.

Configuration is via the following environment variables:
{env_vars}
"#
    )
}

/// Placeholder for the order-book-specific on-chain reads. Every method fails so a misconfigured
/// deployment surfaces immediately instead of silently skipping orders.
#[derive(Debug)]
struct UnintegratedOrderState;

#[async_trait]
impl OrderStateClient for UnintegratedOrderState {
    async fn is_fulfilled_on_take_chain(
        &self,
        _order_id: crosschain_taker::order::OrderId,
    ) -> Result<bool, eyre::Error> {
        Err(eyre::eyre!(
            "no OrderStateClient integration configured; supply a deployment-specific implementation"
        ))
    }

    async fn give_chain_state(
        &self,
        _order_id: crosschain_taker::order::OrderId,
    ) -> Result<GiveChainOrderState, eyre::Error> {
        Err(eyre::eyre!(
            "no OrderStateClient integration configured; supply a deployment-specific implementation"
        ))
    }
}

/// Placeholder [`TokenDecimalsResolver`].
#[derive(Debug)]
struct UnintegratedDecimals;

#[async_trait]
impl TokenDecimalsResolver for UnintegratedDecimals {
    async fn decimals(&self, _chain_id: u64, _token: TokenId) -> Result<u32, eyre::Error> {
        Err(eyre::eyre!(
            "no TokenDecimalsResolver integration configured; supply a deployment-specific implementation"
        ))
    }
}

/// Placeholder [`EvmChainClient`] standing in for the wrappers that format/issue the actual
/// fulfill transactions.
#[derive(Debug)]
struct UnintegratedEvmClient;

#[async_trait]
impl EvmChainClient for UnintegratedEvmClient {
    async fn estimate_gas(&self, _params: &FulfillParams) -> Result<u64, eyre::Error> {
        Err(eyre::eyre!("no EvmChainClient integration configured"))
    }
    async fn gas_price(&self) -> Result<u128, eyre::Error> {
        Err(eyre::eyre!("no EvmChainClient integration configured"))
    }
    async fn build_payload(
        &self,
        _fulfill_signer: AccountId,
        _params: &FulfillParams,
        _gas_limit: u64,
        _gas_price: u128,
    ) -> Result<SignedPayload, eyre::Error> {
        Err(eyre::eyre!("no EvmChainClient integration configured"))
    }
    async fn wait_for_confirmation(
        &self,
        _tx_hash: TxHash,
        _timeout: Duration,
    ) -> Result<bool, eyre::Error> {
        Err(eyre::eyre!("no EvmChainClient integration configured"))
    }
}

/// Placeholder [`SolanaChainClient`].
#[derive(Debug)]
struct UnintegratedSolanaClient;

#[async_trait]
impl SolanaChainClient for UnintegratedSolanaClient {
    async fn build_payload(
        &self,
        _fulfill_signer: AccountId,
        _params: &FulfillParams,
    ) -> Result<SignedPayload, eyre::Error> {
        Err(eyre::eyre!("no SolanaChainClient integration configured"))
    }
    async fn wait_for_confirmation(
        &self,
        _tx_hash: TxHash,
        _timeout: Duration,
    ) -> Result<bool, eyre::Error> {
        Err(eyre::eyre!("no SolanaChainClient integration configured"))
    }
}

/// Placeholder [`UnlockTxBuilder`].
#[derive(Debug)]
struct UnintegratedUnlockBuilder;

#[async_trait]
impl UnlockTxBuilder for UnintegratedUnlockBuilder {
    async fn build(
        &self,
        _key: BatchKey,
        _orders: &[crosschain_taker::order::OrderId],
    ) -> Result<SignedPayload, crosschain_taker::signer::SignerError> {
        Err(crosschain_taker::signer::SignerError::Rejected(
            "no UnlockTxBuilder integration configured".into(),
        ))
    }
}

fn placeholder_integration(engine: ChainEngine) -> ChainIntegration {
    let chain_client = match engine {
        ChainEngine::Evm => ChainClient::Evm(Arc::new(UnintegratedEvmClient)),
        ChainEngine::Solana => ChainClient::Solana(Arc::new(UnintegratedSolanaClient)),
    };
    ChainIntegration {
        order_state: Arc::new(UnintegratedOrderState),
        decimals: Arc::new(UnintegratedDecimals),
        chain_client,
        unlock_tx_builder: Arc::new(UnintegratedUnlockBuilder),
        dst_filters: Vec::new(),
        src_filters: Vec::new(),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> eyre::Result<()> {
    if should_print_help() {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .map_err(|error| eyre::eyre!("failed to install metrics exporter: {error}"))?;

    let env = config::config_from_env()?;
    let document = std::fs::read_to_string(&env.config_path)
        .map_err(|error| eyre::eyre!("failed to read {}: {error}", env.config_path))?;

    let cancellation_token = crosschain_taker::handle_signals()?;

    // A production deployment replaces `placeholder_integration` with its own order-book client
    // wired to the real on-chain reads and the wrappers that format/issue transactions.
    let chain_ids = {
        #[derive(serde::Deserialize)]
        struct Peek {
            chain: u64,
        }
        #[derive(serde::Deserialize)]
        struct PeekDoc {
            chains: Vec<Peek>,
        }
        let peek: PeekDoc = toml::from_str(&document)?;
        peek.chains.into_iter().map(|c| c.chain).collect::<Vec<_>>()
    };
    let mut integrations = HashMap::new();
    for &chain_id in &chain_ids {
        let engine = if chain_id == 101 { ChainEngine::Solana } else { ChainEngine::Evm };
        integrations.insert(chain_id, placeholder_integration(engine));
    }

    let (registry, buckets, chain_clients, unlock_builders) =
        config::build_registry(&document, &env, integrations, &[])?;
    let registry = Arc::new(registry);

    let price_service: Arc<dyn crosschain_taker::price::TokenPriceService> =
        Arc::new(CoingeckoPriceService::new(HashMap::new()));

    let mut pipeline_senders = HashMap::new();
    let mut join_handles = Vec::new();
    let mut batch_unlockers = Vec::new();

    for chain_id in registry.chain_ids() {
        let chain = registry.get(chain_id)?;
        let swap: Arc<dyn crosschain_taker::swap::SwapQuoteProvider> =
            Arc::new(DefaultSwapConnector::new(chain.engine));
        let unlock_tx_builder = unlock_builders
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| eyre::eyre!("missing unlock builder for chain {chain_id}"))?;
        let batch_unlocker = Arc::new(BatchUnlocker::new(unlock_tx_builder));
        batch_unlockers.push(batch_unlocker.clone());
        let chain_client = chain_clients
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| eyre::eyre!("missing chain client for chain {chain_id}"))?;

        let pctx = PipelineContext {
            buckets: buckets.clone(),
            price_service: price_service.clone(),
            swap,
            order_state: Arc::new(UnintegratedOrderState),
            decimals: Arc::new(UnintegratedDecimals),
            chain_client,
            batch_unlocker,
            min_profitability_bps: env.min_profitability_bps,
            unlock_cost_usd: env.unlock_cost_usd,
            confirmation_timeout: config::confirmation_timeout(&env),
        };

        let (event_tx, event_rx) = tokio::sync::mpsc::channel(256);
        let (reentry_tx, reentry_rx) = tokio::sync::mpsc::channel(256);
        let mempool = Arc::new(MempoolScheduler::new(
            config::mempool_initial_interval(&env),
            config::mempool_max_delay_step(&env),
            reentry_tx,
        ));

        let pipeline = Pipeline::new(pctx, mempool.clone());
        pipeline_senders.insert(chain_id, event_tx);

        let token = cancellation_token.clone();
        join_handles.push(tokio::spawn(pipeline.run(event_rx, reentry_rx, token.clone())));
        join_handles.push(tokio::spawn({
            let mempool = mempool.clone();
            let tick = config::mempool_tick_resolution(&env);
            async move { mempool.run(tick, token).await }
        }));
    }

    // No feed transport is wired up here; without one, the dispatcher simply has nothing to
    // forward and this process serves only the healthcheck and metrics reporter until signalled.
    let (order_tx, order_rx) = tokio::sync::mpsc::channel(256);
    drop(order_tx);
    join_handles.push(tokio::spawn(dispatcher::run(registry.clone(), order_rx, pipeline_senders)));
    join_handles.push(tokio::spawn(crosschain_taker::run_metrics_reporter(
        registry.clone(),
        batch_unlockers,
        Duration::from_secs(15),
        cancellation_token.clone(),
    )));

    info!(chains = chain_ids.len(), "taker started");
    let healthcheck_result =
        crosschain_taker::serve_healthcheck(env.healthcheck_port, cancellation_token.clone()).await;

    cancellation_token.cancel();
    for handle in join_handles {
        let _ = handle.await;
    }
    healthcheck_result
}

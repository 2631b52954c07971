//! Configuration loading: env-var scalars via `envy`, in the style of `init4_bin_base::FromEnv`
//! (not a fetchable dependency here, so reimplemented directly) plus a structured TOML document
//! for the chain/bucket/filter shapes that don't fit a flat env-var schema.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::budget::{NonFinalizedOrdersBudgetController, TvlBudgetController};
use crate::bucket::{Bucket, TokensBucketSet};
use crate::executor::ChainClient;
use crate::filters::{disabled_chain_filter, Filter};
use crate::pipeline::{OrderStateClient, TokenDecimalsResolver};
use crate::registry::{
    ChainEngine, ChainEntry, ChainRegistry, ConfigError, DstConstraintRange, SrcConstraintRange,
    SwapChangeRecipient,
};
use crate::signer::{AccountId, AlloyEvmSigner, ChainSigner, JsonRpcSolanaSigner};
use crate::unlocker::UnlockTxBuilder;

/// Scalar settings with sane defaults, loaded from the process environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    #[serde(default = "default_healthcheck_port")]
    pub healthcheck_port: u16,
    #[serde(default = "default_mempool_tick_resolution_secs")]
    pub mempool_tick_resolution_secs: u64,
    #[serde(default = "default_mempool_initial_interval_secs")]
    pub mempool_initial_interval_secs: u64,
    #[serde(default = "default_mempool_max_delay_step_secs")]
    pub mempool_max_delay_step_secs: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    #[serde(default = "default_min_profitability_bps")]
    pub min_profitability_bps: u32,
    #[serde(default = "default_batch_unlock_size")]
    pub default_batch_unlock_size: u8,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_unlock_cost_usd")]
    pub unlock_cost_usd: Decimal,
    /// Path to the structured chains/buckets/filters document.
    pub config_path: String,
}

fn default_healthcheck_port() -> u16 {
    8080
}
fn default_mempool_tick_resolution_secs() -> u64 {
    1
}
fn default_mempool_initial_interval_secs() -> u64 {
    10
}
fn default_mempool_max_delay_step_secs() -> u64 {
    5
}
fn default_rpc_timeout_secs() -> u64 {
    10
}
fn default_min_profitability_bps() -> u32 {
    0
}
fn default_batch_unlock_size() -> u8 {
    5
}
fn default_confirmation_timeout_secs() -> u64 {
    120
}
fn default_unlock_cost_usd() -> Decimal {
    Decimal::ZERO
}

/// Human-readable description of every env var this process reads, printed by `--help`, mirroring
/// `signet_filler::env_var_info`.
pub fn env_var_info() -> String {
    "CONFIG_PATH (required)            path to the chains/buckets/filters TOML document\n\
     HEALTHCHECK_PORT (default 8080)\n\
     MEMPOOL_TICK_RESOLUTION_SECS (default 1)\n\
     MEMPOOL_INITIAL_INTERVAL_SECS (default 10)\n\
     MEMPOOL_MAX_DELAY_STEP_SECS (default 5)\n\
     RPC_TIMEOUT_SECS (default 10)\n\
     MIN_PROFITABILITY_BPS (default 0)\n\
     DEFAULT_BATCH_UNLOCK_SIZE (default 5)\n\
     CONFIRMATION_TIMEOUT_SECS (default 120)\n\
     UNLOCK_COST_USD (default 0)\n"
        .to_string()
}

pub fn config_from_env() -> Result<EnvConfig, envy::Error> {
    envy::from_env::<EnvConfig>()
}

/// One token-equivalence bucket as it appears in the structured document. A bucket's member list
/// for a chain may be a single token or several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TokenList {
    One(Address),
    Many(Vec<Address>),
}

impl TokenList {
    fn into_vec(self) -> Vec<Address> {
        match self {
            TokenList::One(addr) => vec![addr],
            TokenList::Many(addrs) => addrs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConstraintRange {
    threshold_amount_in_usd: Decimal,
    #[serde(default)]
    min_block_confirmations: Option<u64>,
    #[serde(default)]
    fulfillment_delay: Option<u64>,
    #[serde(default)]
    pre_fulfill_swap_change_recipient: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChainConfig {
    chain: u64,
    chain_rpc: String,
    taker_private_key: String,
    unlock_authority_private_key: String,
    beneficiary: String,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    batch_unlock_size: Option<u8>,
    #[serde(default)]
    src_constraints: Vec<RawConstraintRange>,
    #[serde(default)]
    dst_constraints: Vec<RawConstraintRange>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDocument {
    chains: Vec<RawChainConfig>,
    #[serde(default)]
    buckets: Vec<HashMap<u64, TokenList>>,
}

/// The externally-injected collaborators the core does not implement itself: the order feed
/// transport and the wrappers that format/issue the actual fulfill and unlock transactions. An
/// operator integrating a specific order-book deployment supplies one of these per chain.
pub struct ChainIntegration {
    pub order_state: Arc<dyn OrderStateClient>,
    pub decimals: Arc<dyn TokenDecimalsResolver>,
    pub chain_client: ChainClient,
    pub unlock_tx_builder: Arc<dyn UnlockTxBuilder>,
    /// Extra filters beyond the global set, e.g. a per-chain allowlist.
    pub dst_filters: Vec<Arc<dyn Filter>>,
    pub src_filters: Vec<Arc<dyn Filter>>,
}

fn engine_for_chain(chain_id: u64) -> ChainEngine {
    match chain_id {
        101 => ChainEngine::Solana,
        _ => ChainEngine::Evm,
    }
}

/// Parse a private key in either encoding — hex (`0x...`) or base58 (Solana), selected by `0x`
/// prefix — into a [`ChainSigner`].
fn signer_from_key(
    engine: ChainEngine,
    chain_rpc: &str,
    private_key: &str,
) -> Result<Arc<dyn ChainSigner>, eyre::Error> {
    match engine {
        ChainEngine::Evm => {
            let signer = AlloyEvmSigner::new(chain_rpc, private_key)
                .map_err(|e| eyre::eyre!("invalid EVM signer config: {e}"))?;
            Ok(Arc::new(signer))
        }
        ChainEngine::Solana => {
            let bytes = bs58::decode(private_key)
                .into_vec()
                .map_err(|e| eyre::eyre!("invalid base58 Solana private key: {e}"))?;
            let keypair = solana_sdk::signature::Keypair::try_from(bytes.as_slice())
                .map_err(|e| eyre::eyre!("invalid Solana keypair bytes: {e}"))?;
            Ok(Arc::new(JsonRpcSolanaSigner::new(chain_rpc, &keypair)))
        }
    }
}

fn beneficiary_for(engine: ChainEngine, raw: &str) -> Result<AccountId, eyre::Error> {
    match engine {
        ChainEngine::Evm => {
            let addr: Address =
                raw.parse().map_err(|e| eyre::eyre!("invalid EVM beneficiary address: {e}"))?;
            Ok(AccountId::Evm(addr))
        }
        ChainEngine::Solana => {
            let pubkey: solana_sdk::pubkey::Pubkey =
                raw.parse().map_err(|e| eyre::eyre!("invalid Solana beneficiary pubkey: {e}"))?;
            Ok(AccountId::Solana(pubkey))
        }
    }
}

fn parse_recipient(raw: Option<&str>) -> SwapChangeRecipient {
    match raw {
        Some("maker") => SwapChangeRecipient::Maker,
        _ => SwapChangeRecipient::Taker,
    }
}

/// Result of [`build_registry`]: the validated registry, the parsed bucket set (needed again by
/// every pipeline's profitability evaluator), plus the per-chain client and unlock builder pulled
/// out of the consumed [`ChainIntegration`]s for the caller to wire into pipelines.
pub type BuiltRegistry = (
    ChainRegistry,
    Arc<TokensBucketSet>,
    HashMap<u64, ChainClient>,
    HashMap<u64, Arc<dyn UnlockTxBuilder>>,
);

/// Build every [`ChainEntry`] described in `document` and assemble the validated [`ChainRegistry`].
/// `integrations` supplies the per-chain out-of-scope collaborators; a chain missing an entry
/// there is rejected with an error.
pub fn build_registry(
    document_toml: &str,
    env: &EnvConfig,
    mut integrations: HashMap<u64, ChainIntegration>,
    intended_pairs: &[(u64, u64)],
) -> Result<BuiltRegistry, eyre::Error> {
    let document: RawDocument =
        toml::from_str(document_toml).map_err(|e| eyre::eyre!("invalid config document: {e}"))?;

    let mut buckets = Vec::with_capacity(document.buckets.len());
    for raw_bucket in document.buckets {
        let members = raw_bucket
            .into_iter()
            .map(|(chain_id, tokens)| (chain_id, tokens.into_vec()))
            .collect::<HashMap<_, _>>();
        buckets.push(Bucket::new(members));
    }
    let bucket_set = TokensBucketSet::new(buckets);

    let mut entries = Vec::with_capacity(document.chains.len());
    let mut chain_clients = HashMap::new();
    let mut unlock_builders = HashMap::new();

    for raw_chain in document.chains {
        let engine = engine_for_chain(raw_chain.chain);
        let integration = integrations.remove(&raw_chain.chain).ok_or_else(|| {
            eyre::eyre!("chain {} has no configured integration collaborators", raw_chain.chain)
        })?;

        let fulfill_signer =
            signer_from_key(engine, &raw_chain.chain_rpc, &raw_chain.taker_private_key)?;
        let unlock_signer =
            signer_from_key(engine, &raw_chain.chain_rpc, &raw_chain.unlock_authority_private_key)?;
        let beneficiary = beneficiary_for(engine, &raw_chain.beneficiary)?;

        let src_constraints = raw_chain
            .src_constraints
            .iter()
            .map(|r| SrcConstraintRange {
                usd_upper_threshold: r.threshold_amount_in_usd,
                min_block_confirmations: r.min_block_confirmations.unwrap_or(0),
                fulfillment_delay_sec: r.fulfillment_delay.unwrap_or(0),
            })
            .collect();
        let dst_constraints = raw_chain
            .dst_constraints
            .iter()
            .map(|r| DstConstraintRange {
                usd_upper_threshold: r.threshold_amount_in_usd,
                fulfillment_delay_sec: r.fulfillment_delay.unwrap_or(0),
                pre_fulfill_swap_change_recipient: parse_recipient(
                    r.pre_fulfill_swap_change_recipient.as_deref(),
                ),
            })
            .collect();

        let mut global_filters: Vec<Arc<dyn Filter>> = Vec::new();
        if raw_chain.disabled {
            global_filters.push(disabled_chain_filter());
        }

        let chain_id = raw_chain.chain;
        entries.push(ChainEntry {
            chain_id,
            engine,
            rpc: raw_chain.chain_rpc,
            unlock_signer,
            fulfill_signer,
            beneficiary,
            src_constraints,
            dst_constraints,
            global_filters,
            dst_filters: integration.dst_filters,
            src_filters: integration.src_filters,
            batch_unlock_size: raw_chain.batch_unlock_size.unwrap_or(env.default_batch_unlock_size),
            tvl_budget: TvlBudgetController::new(Decimal::from(1_000_000_000u64)),
            non_finalized_budget: NonFinalizedOrdersBudgetController::new(Decimal::from(
                1_000_000_000u64,
            )),
        });
        chain_clients.insert(chain_id, integration.chain_client);
        unlock_builders.insert(chain_id, integration.unlock_tx_builder);
    }

    let registry = ChainRegistry::new(entries, &bucket_set, intended_pairs)
        .map_err(|e: ConfigError| eyre::eyre!(e))?;
    Ok((registry, Arc::new(bucket_set), chain_clients, unlock_builders))
}

pub fn confirmation_timeout(env: &EnvConfig) -> Duration {
    Duration::from_secs(env.confirmation_timeout_secs)
}

pub fn mempool_tick_resolution(env: &EnvConfig) -> Duration {
    Duration::from_secs(env.mempool_tick_resolution_secs)
}

pub fn mempool_initial_interval(env: &EnvConfig) -> Duration {
    Duration::from_secs(env.mempool_initial_interval_secs)
}

pub fn mempool_max_delay_step(env: &EnvConfig) -> Duration {
    Duration::from_secs(env.mempool_max_delay_step_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recipient_defaults_to_taker() {
        assert_eq!(parse_recipient(None), SwapChangeRecipient::Taker);
        assert_eq!(parse_recipient(Some("maker")), SwapChangeRecipient::Maker);
        assert_eq!(parse_recipient(Some("taker")), SwapChangeRecipient::Taker);
    }

    #[test]
    fn engine_for_chain_routes_solana_pseudo_id() {
        assert_eq!(engine_for_chain(101), ChainEngine::Solana);
        assert_eq!(engine_for_chain(1), ChainEngine::Evm);
    }
}

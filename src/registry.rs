//! Chain Registry: per-chain configured state, validated once at startup and shared read-only for
//! the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::budget::{NonFinalizedOrdersBudgetController, TvlBudgetController};
use crate::bucket::TokensBucketSet;
use crate::filters::Filter;
use crate::signer::ChainSigner;

/// Per-chain-id constant ceiling on block confirmations, used only to validate configuration.
pub fn chain_hard_cap(chain_id: u64) -> Option<u64> {
    match chain_id {
        1 => Some(12),        // Ethereum mainnet
        137 => Some(256),     // Polygon
        101 => Some(32),      // Solana mainnet-beta (pseudo chain id used by this registry)
        _ => None,
    }
}

/// Which execution engine a chain uses, dispatching the fulfillment executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEngine {
    Evm,
    Solana,
}

/// A source-side (give-chain) constraint range, indexed by the order's USD worth.
#[derive(Debug, Clone)]
pub struct SrcConstraintRange {
    pub usd_upper_threshold: Decimal,
    pub min_block_confirmations: u64,
    pub fulfillment_delay_sec: u64,
}

/// Which party absorbs a pre-fulfill swap's price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapChangeRecipient {
    #[default]
    Taker,
    Maker,
}

/// A destination-side (take-chain) constraint range. Same threshold shape as the source side,
/// without a confirmation requirement.
#[derive(Debug, Clone)]
pub struct DstConstraintRange {
    pub usd_upper_threshold: Decimal,
    pub fulfillment_delay_sec: u64,
    pub pre_fulfill_swap_change_recipient: SwapChangeRecipient,
}

/// Find the first range whose upper threshold is the smallest value still `>= usd_worth`, i.e.
/// the first range with `from < usd_worth <= to` given the ranges are sorted ascending and their
/// lower bound is the previous range's upper bound.
pub fn find_range<T>(
    ranges: &[T],
    usd_worth: Decimal,
    threshold: impl Fn(&T) -> Decimal,
) -> Option<&T> {
    ranges.iter().find(|range| usd_worth <= threshold(range))
}

/// Validate that `ranges` is sorted ascending by threshold.
fn is_sorted_ascending<T>(ranges: &[T], threshold: impl Fn(&T) -> Decimal) -> bool {
    ranges.windows(2).all(|pair| threshold(&pair[0]) < threshold(&pair[1]))
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("chain {0} is not configured")]
    UnsupportedChain(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("chain {chain_id}: min_block_confirmations {min} >= hard cap {cap}")]
    ConfirmationsExceedHardCap { chain_id: u64, min: u64, cap: u64 },
    #[error("chain {0}: src_constraints are not sorted ascending by usd_upper_threshold")]
    SrcConstraintsUnsorted(u64),
    #[error("chain {0}: dst_constraints are not sorted ascending by usd_upper_threshold")]
    DstConstraintsUnsorted(u64),
    #[error("chain {0} has no configured hard cap for confirmation validation")]
    UnknownHardCap(u64),
    #[error("batch_unlock_size {0} is out of range [1, 10]")]
    InvalidBatchUnlockSize(u8),
    #[error("no bucket covers give-chain {give_chain_id} -> take-chain {take_chain_id}")]
    UncoveredChainPair { give_chain_id: u64, take_chain_id: u64 },
}

/// Per-chain configured state.
#[derive(Debug)]
pub struct ChainEntry {
    pub chain_id: u64,
    pub engine: ChainEngine,
    pub rpc: String,
    pub unlock_signer: Arc<dyn ChainSigner>,
    pub fulfill_signer: Arc<dyn ChainSigner>,
    pub beneficiary: crate::signer::AccountId,
    /// Sorted ascending by `usd_upper_threshold`.
    pub src_constraints: Vec<SrcConstraintRange>,
    /// Sorted ascending by `usd_upper_threshold`.
    pub dst_constraints: Vec<DstConstraintRange>,
    pub global_filters: Vec<Arc<dyn Filter>>,
    pub dst_filters: Vec<Arc<dyn Filter>>,
    pub src_filters: Vec<Arc<dyn Filter>>,
    pub batch_unlock_size: u8,
    pub tvl_budget: TvlBudgetController,
    pub non_finalized_budget: NonFinalizedOrdersBudgetController,
}

impl ChainEntry {
    /// Look up the source constraint range matching `usd_worth`.
    pub fn src_range_for(&self, usd_worth: Decimal) -> Option<&SrcConstraintRange> {
        find_range(&self.src_constraints, usd_worth, |r| r.usd_upper_threshold)
    }

    /// Look up the destination constraint range matching `usd_worth`.
    pub fn dst_range_for(&self, usd_worth: Decimal) -> Option<&DstConstraintRange> {
        find_range(&self.dst_constraints, usd_worth, |r| r.usd_upper_threshold)
    }
}

/// The full set of configured chains, validated once at startup and shared read-only across every
/// per-chain pipeline task.
#[derive(Debug)]
pub struct ChainRegistry {
    chains: HashMap<u64, Arc<ChainEntry>>,
}

impl ChainRegistry {
    /// Build and validate a registry from its configured chain entries and the bucket set that
    /// must cover every intended (give, take) pair.
    pub fn new(
        chains: Vec<ChainEntry>,
        buckets: &TokensBucketSet,
        intended_pairs: &[(u64, u64)],
    ) -> Result<Self, ConfigError> {
        for chain in &chains {
            if chain.batch_unlock_size == 0 || chain.batch_unlock_size > 10 {
                return Err(ConfigError::InvalidBatchUnlockSize(chain.batch_unlock_size));
            }
            if !is_sorted_ascending(&chain.src_constraints, |r| r.usd_upper_threshold) {
                return Err(ConfigError::SrcConstraintsUnsorted(chain.chain_id));
            }
            if !is_sorted_ascending(&chain.dst_constraints, |r| r.usd_upper_threshold) {
                return Err(ConfigError::DstConstraintsUnsorted(chain.chain_id));
            }
            let hard_cap = chain_hard_cap(chain.chain_id)
                .ok_or(ConfigError::UnknownHardCap(chain.chain_id))?;
            for range in &chain.src_constraints {
                if range.min_block_confirmations >= hard_cap {
                    return Err(ConfigError::ConfirmationsExceedHardCap {
                        chain_id: chain.chain_id,
                        min: range.min_block_confirmations,
                        cap: hard_cap,
                    });
                }
            }
        }

        for &(give_chain_id, take_chain_id) in intended_pairs {
            if !buckets.covers_pair(give_chain_id, take_chain_id) {
                return Err(ConfigError::UncoveredChainPair { give_chain_id, take_chain_id });
            }
        }

        let chains = chains.into_iter().map(|chain| (chain.chain_id, Arc::new(chain))).collect();
        Ok(Self { chains })
    }

    /// Fetch a chain entry, failing with `UnsupportedChain` if absent.
    pub fn get(&self, chain_id: u64) -> Result<Arc<ChainEntry>, RegistryError> {
        self.chains.get(&chain_id).cloned().ok_or(RegistryError::UnsupportedChain(chain_id))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }
}

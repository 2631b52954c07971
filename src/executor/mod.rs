//! Fulfillment Executor: assembles, gas-prices, broadcasts and confirms the destination-chain
//! fulfillment transaction. Dispatch is a tagged enum over the two engines rather than a shared
//! base trait — EVM gas bumping has no Solana analogue and forcing one trait to cover both just
//! grows `unimplemented!` branches.

pub mod evm;
pub mod solana;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::order::OrderId;
use crate::registry::ChainEngine;
use crate::signer::{AccountId, ChainSigner, TokenId, TxHash};

pub use evm::{EvmChainClient, EvmFulfillError, GasCaps};
pub use solana::{SolanaChainClient, SolanaFulfillError};

/// Parameters needed to build and broadcast a fulfillment, independent of engine.
#[derive(Debug, Clone)]
pub struct FulfillParams {
    pub order_id: OrderId,
    pub reserve_token: TokenId,
    pub reserve_amount: Decimal,
    pub slippage_bps: u32,
    pub beneficiary: AccountId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillOutcome {
    Confirmed(TxHash),
    /// Broadcast succeeded but confirmation was not observed within the poll timeout; the
    /// pipeline routes this to the mempool scheduler rather than treating it as failure.
    TimedOut(TxHash),
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillError {
    #[error(transparent)]
    Evm(#[from] EvmFulfillError),
    #[error(transparent)]
    Solana(#[from] SolanaFulfillError),
}

/// Per-chain RPC/client handle, tagged by engine. The EVM path is two-phase — caps are estimated
/// once before the profitability check, then re-validated against the final calldata — so unlike
/// a single `fulfill()` entry point this exposes the phases the pipeline needs rather than
/// collapsing them behind one call.
#[derive(Clone)]
pub enum ChainClient {
    Evm(Arc<dyn EvmChainClient>),
    Solana(Arc<dyn SolanaChainClient>),
}

impl ChainClient {
    pub fn engine(&self) -> ChainEngine {
        match self {
            ChainClient::Evm(_) => ChainEngine::Evm,
            ChainClient::Solana(_) => ChainEngine::Solana,
        }
    }

    /// Solana has no preliminary gas phase; build, broadcast and wait in one call.
    pub async fn fulfill_solana(
        &self,
        fulfill_signer: &Arc<dyn ChainSigner>,
        params: FulfillParams,
        confirmation_timeout: Duration,
    ) -> Result<FulfillOutcome, FulfillError> {
        let ChainClient::Solana(client) = self else {
            panic!("fulfill_solana called on a non-Solana ChainClient");
        };
        Ok(solana::fulfill(client.as_ref(), fulfill_signer, params, confirmation_timeout).await?)
    }
}

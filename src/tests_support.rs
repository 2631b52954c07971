//! Test-only fixtures shared across module unit tests. Never compiled into the release binary.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use tracing::Span;

use crate::budget::{NonFinalizedOrdersBudgetController, TvlBudgetController};
use crate::registry::{ChainEngine, ChainEntry};
use crate::signer::{AccountId, ChainSigner, SignedPayload, SignerError, TokenId, TxHash};

#[derive(Debug)]
pub struct FixedSigner {
    pub address: AccountId,
    pub balance: U256,
}

#[async_trait]
impl ChainSigner for FixedSigner {
    fn address(&self) -> AccountId {
        self.address
    }

    async fn get_balance(&self, _token: TokenId) -> Result<U256, SignerError> {
        Ok(self.balance)
    }

    async fn send_transaction(
        &self,
        _payload: SignedPayload,
        _logger: &Span,
    ) -> Result<TxHash, SignerError> {
        Ok(TxHash([0; 32]))
    }
}

pub fn fixed_signer(byte: u8, balance: u64) -> Arc<dyn ChainSigner> {
    Arc::new(FixedSigner {
        address: AccountId::Evm(Address::repeat_byte(byte)),
        balance: U256::from(balance),
    })
}

/// A minimal but valid `ChainEntry` for unit tests that just need *a* chain entry to exist.
pub fn dummy_chain_entry(chain_id: u64, engine: ChainEngine) -> ChainEntry {
    ChainEntry {
        chain_id,
        engine,
        rpc: format!("https://rpc.example/{chain_id}"),
        unlock_signer: fixed_signer(0xAA, 0),
        fulfill_signer: fixed_signer(0xBB, 0),
        beneficiary: AccountId::Evm(Address::repeat_byte(0xCC)),
        src_constraints: Vec::new(),
        dst_constraints: Vec::new(),
        global_filters: Vec::new(),
        dst_filters: Vec::new(),
        src_filters: Vec::new(),
        batch_unlock_size: 3,
        tvl_budget: TvlBudgetController::new(dec!(1_000_000)),
        non_finalized_budget: NonFinalizedOrdersBudgetController::new(dec!(1_000_000)),
    }
}

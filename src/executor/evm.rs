//! EVM fulfillment path: a preswap-and-fulfill transaction, gas-estimated with a safety multiplier
//! and gas-priced with a bump, both derived from a preliminary quote before the final calldata is
//! assembled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use rust_decimal::Decimal;
use tracing::{instrument, warn};

use crate::signer::{AccountId, ChainSigner, SignedPayload, SignerError, TxHash};

use super::{FulfillOutcome, FulfillParams};

/// Safety multiplier applied to the preliminary gas estimate: the cap the final estimate must not
/// exceed.
pub const GAS_LIMIT_SAFETY_BPS: u64 = 12_500;
/// Bump applied to the fetched gas price before broadcasting.
pub const GAS_PRICE_BUMP_BPS: u64 = 13_000;
/// After this many fast-tracked retries for the same order, a further gas blowout falls back to
/// standard mempool backoff instead of the 5s fast track.
pub const GAS_BLOWOUT_FAST_TRACK_MAX_ATTEMPTS: u32 = 2;
/// Delay used for the gas-blowout fast track.
pub const GAS_BLOWOUT_FAST_TRACK_DELAY_SECS: u64 = 5;

fn apply_bps(value: u64, bps: u64) -> u64 {
    ((value as u128) * (bps as u128) / 10_000) as u64
}

#[derive(Debug, thiserror::Error)]
pub enum EvmFulfillError {
    #[error("gas estimation failed: {0}")]
    Estimation(#[source] eyre::Error),
    #[error("final gas estimate exceeded the pre-estimation cap")]
    GasBlowout,
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("rpc error: {0}")]
    Rpc(#[source] eyre::Error),
}

/// Injected RPC surface for an EVM chain: gas estimation/pricing, calldata assembly and
/// confirmation polling. The core never encodes a concrete router's calldata format — that's left
/// to the wrappers that format/issue the actual fulfill transactions.
#[async_trait]
pub trait EvmChainClient: Send + Sync {
    async fn estimate_gas(&self, params: &FulfillParams) -> Result<u64, eyre::Error>;
    async fn gas_price(&self) -> Result<u128, eyre::Error>;

    /// Assemble the unsigned preswap-and-fulfill calldata with the given gas limit/price, then
    /// have `fulfill_signer` sign it.
    async fn build_payload(
        &self,
        fulfill_signer: AccountId,
        params: &FulfillParams,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<SignedPayload, eyre::Error>;

    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<bool, eyre::Error>;
}

/// Gas limit/price caps derived from a preliminary estimate, re-validated against the final
/// calldata before broadcast.
#[derive(Debug, Clone, Copy)]
pub struct GasCaps {
    pub gas_limit_cap: u64,
    pub gas_price_cap: u128,
}

/// Preliminary cap estimation: safety-multiplied gas limit and bumped gas price, taken before the
/// profitability check so the evaluator can price gas into its decision.
#[instrument(skip(client), fields(order_id = %params.order_id))]
pub async fn estimate_caps(
    client: &dyn EvmChainClient,
    params: &FulfillParams,
) -> Result<GasCaps, EvmFulfillError> {
    let preliminary_estimate =
        client.estimate_gas(params).await.map_err(EvmFulfillError::Estimation)?;
    let gas_limit_cap = apply_bps(preliminary_estimate, GAS_LIMIT_SAFETY_BPS);

    let gas_price = client.gas_price().await.map_err(EvmFulfillError::Rpc)?;
    let gas_price_cap = gas_price * (GAS_PRICE_BUMP_BPS as u128) / 10_000;

    Ok(GasCaps { gas_limit_cap, gas_price_cap })
}

/// Final build, gas re-check against `caps`, broadcast and wait for confirmation. Returns
/// `GasBlowout` without broadcasting if the final estimate exceeds `caps`.
#[instrument(skip(client, fulfill_signer), fields(order_id = %params.order_id))]
pub async fn fulfill(
    client: &dyn EvmChainClient,
    fulfill_signer: &Arc<dyn ChainSigner>,
    params: FulfillParams,
    caps: GasCaps,
    confirmation_timeout: Duration,
) -> Result<FulfillOutcome, EvmFulfillError> {
    let final_estimate =
        client.estimate_gas(&params).await.map_err(EvmFulfillError::Estimation)?;
    if final_estimate > caps.gas_limit_cap {
        warn!(
            final_estimate,
            gas_limit_cap = caps.gas_limit_cap,
            "final gas estimate exceeded pre-estimation cap"
        );
        return Err(EvmFulfillError::GasBlowout);
    }

    let payload = client
        .build_payload(fulfill_signer.address(), &params, caps.gas_limit_cap, caps.gas_price_cap)
        .await
        .map_err(EvmFulfillError::Rpc)?;

    let span = tracing::Span::current();
    let tx_hash = fulfill_signer.send_transaction(payload, &span).await?;

    match client
        .wait_for_confirmation(tx_hash, confirmation_timeout)
        .await
        .map_err(EvmFulfillError::Rpc)?
    {
        true => Ok(FulfillOutcome::Confirmed(tx_hash)),
        false => Ok(FulfillOutcome::TimedOut(tx_hash)),
    }
}

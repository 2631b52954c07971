//! Solana fulfillment path: builds the preswap-fulfill instruction bundle and submits it. No gas
//! bumping — Solana's fee model has no EVM-style gas auction to hedge against.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use crate::signer::{AccountId, ChainSigner, SignedPayload, SignerError, TxHash};

use super::{FulfillOutcome, FulfillParams};

#[derive(Debug, thiserror::Error)]
pub enum SolanaFulfillError {
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("rpc error: {0}")]
    Rpc(#[source] eyre::Error),
}

/// Injected RPC surface for a Solana chain: instruction bundle assembly and confirmation polling.
#[async_trait]
pub trait SolanaChainClient: Send + Sync {
    async fn build_payload(
        &self,
        fulfill_signer: AccountId,
        params: &FulfillParams,
    ) -> Result<SignedPayload, eyre::Error>;

    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<bool, eyre::Error>;
}

#[instrument(skip(client, fulfill_signer), fields(order_id = %params.order_id))]
pub async fn fulfill(
    client: &dyn SolanaChainClient,
    fulfill_signer: &Arc<dyn ChainSigner>,
    params: FulfillParams,
    confirmation_timeout: Duration,
) -> Result<FulfillOutcome, SolanaFulfillError> {
    let payload = client
        .build_payload(fulfill_signer.address(), &params)
        .await
        .map_err(SolanaFulfillError::Rpc)?;

    let span = tracing::Span::current();
    let tx_hash = fulfill_signer.send_transaction(payload, &span).await?;

    match client
        .wait_for_confirmation(tx_hash, confirmation_timeout)
        .await
        .map_err(SolanaFulfillError::Rpc)?
    {
        true => Ok(FulfillOutcome::Confirmed(tx_hash)),
        false => Ok(FulfillOutcome::TimedOut(tx_hash)),
    }
}

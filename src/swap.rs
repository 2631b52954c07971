//! Swap quote provider: quotes a swap route from a reserve token to the order's take token.
//! Default dispatches to 1inch for EVM chains and Jupiter for Solana; a caller-supplied custom
//! connector is rejected at config time with `ConfigError`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use crate::registry::ChainEngine;
use crate::signer::TokenId;

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("swap quote request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),
    #[error("swap provider rejected the request: {0}")]
    ClientError(String),
    #[error("a custom swap connector was configured; only the built-in 1inch/Jupiter dispatch is supported")]
    CustomConnectorRejected,
}

/// A quoted swap route, the reserve amount required and the take amount it is expected to yield.
#[derive(Debug, Clone, Copy)]
pub struct SwapRoute {
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    /// Basis points of slippage the route was quoted with.
    pub slippage_bps: u32,
}

/// A swap request. `slippage_override` models a process-wide slippage-disable hook as an explicit
/// per-request field instead.
#[derive(Debug, Clone, Copy)]
pub struct SwapRequest {
    pub from: TokenId,
    pub to: TokenId,
    pub amount: Decimal,
    pub slippage_override: Option<u32>,
}

#[async_trait]
pub trait SwapQuoteProvider: Send + Sync {
    async fn quote(&self, request: SwapRequest) -> Result<SwapRoute, SwapError>;
}

#[derive(Debug, Deserialize)]
struct OneInchQuoteResponse {
    #[serde(rename = "toAmount")]
    to_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct JupiterQuoteResponse {
    #[serde(rename = "outAmount")]
    out_amount: Decimal,
}

/// Dispatches to 1inch (EVM) or Jupiter (Solana) depending on the chain's engine. This is the only
/// built-in `SwapQuoteProvider` the core ships; `Config` rejects any other connector selection.
/// Chain disabling belongs in the registry's filter, not in the connector.
#[derive(Debug)]
pub struct DefaultSwapConnector {
    client: reqwest::Client,
    engine: ChainEngine,
    one_inch_base_url: String,
    jupiter_base_url: String,
}

impl DefaultSwapConnector {
    pub fn new(engine: ChainEngine) -> Self {
        Self {
            client: reqwest::Client::new(),
            engine,
            one_inch_base_url: "https://api.1inch.dev/swap/v6.0".to_string(),
            jupiter_base_url: "https://quote-api.jup.ag/v6".to_string(),
        }
    }

    async fn quote_one_inch(&self, request: SwapRequest) -> Result<SwapRoute, SwapError> {
        let response = self
            .client
            .get(format!("{}/quote", self.one_inch_base_url))
            .query(&[
                ("src", format!("{:?}", request.from)),
                ("dst", format!("{:?}", request.to)),
                ("amount", request.amount.to_string()),
            ])
            .send()
            .await
            .map_err(SwapError::RequestFailed)?
            .error_for_status()
            .map_err(SwapError::RequestFailed)?;
        let body: OneInchQuoteResponse =
            response.json().await.map_err(SwapError::RequestFailed)?;
        Ok(SwapRoute {
            amount_in: request.amount,
            amount_out: body.to_amount,
            slippage_bps: request.slippage_override.unwrap_or(0),
        })
    }

    async fn quote_jupiter(&self, request: SwapRequest) -> Result<SwapRoute, SwapError> {
        let response = self
            .client
            .get(format!("{}/quote", self.jupiter_base_url))
            .query(&[
                ("inputMint", format!("{:?}", request.from)),
                ("outputMint", format!("{:?}", request.to)),
                ("amount", request.amount.to_string()),
            ])
            .send()
            .await
            .map_err(SwapError::RequestFailed)?
            .error_for_status()
            .map_err(SwapError::RequestFailed)?;
        let body: JupiterQuoteResponse =
            response.json().await.map_err(SwapError::RequestFailed)?;
        Ok(SwapRoute {
            amount_in: request.amount,
            amount_out: body.out_amount,
            slippage_bps: request.slippage_override.unwrap_or(0),
        })
    }
}

#[async_trait]
impl SwapQuoteProvider for DefaultSwapConnector {
    #[instrument(skip(self))]
    async fn quote(&self, request: SwapRequest) -> Result<SwapRoute, SwapError> {
        match self.engine {
            ChainEngine::Evm => self.quote_one_inch(request).await,
            ChainEngine::Solana => self.quote_jupiter(request).await,
        }
    }
}

//! Token price service: resolves a USD price for a (chain, token) pair. Injected — the core only
//! depends on the trait; the default implementation queries Coingecko.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::{instrument, trace};

use crate::signer::TokenId;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("no price mapping configured for token on chain {chain_id}")]
    UnknownToken { chain_id: u64 },
    #[error("price service request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),
    #[error("malformed price service response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TokenPriceService: Send + Sync {
    async fn price_usd(&self, chain_id: u64, token: TokenId) -> Result<Decimal, PriceError>;
}

/// Coingecko-backed price service. Tokens are resolved to Coingecko's internal
/// id space via a configured lookup table — the API has no generic (chain, address) price
/// endpoint for every chain this core might be configured with, so that mapping is supplied by
/// configuration rather than derived.
#[derive(Debug)]
pub struct CoingeckoPriceService {
    client: reqwest::Client,
    base_url: String,
    coingecko_ids: std::collections::HashMap<(u64, TokenId), String>,
    cache: Mutex<LruCache<(u64, TokenId), Decimal>>,
}

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: Decimal,
}

impl CoingeckoPriceService {
    pub fn new(coingecko_ids: std::collections::HashMap<(u64, TokenId), String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client builds"),
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            coingecko_ids,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(512).unwrap())),
        }
    }
}

#[async_trait]
impl TokenPriceService for CoingeckoPriceService {
    #[instrument(skip(self))]
    async fn price_usd(&self, chain_id: u64, token: TokenId) -> Result<Decimal, PriceError> {
        let key = (chain_id, token);
        if let Some(cached) = self.cache.lock().expect("price cache poisoned").get(&key) {
            trace!(%cached, "price cache hit");
            return Ok(*cached);
        }

        let coingecko_id =
            self.coingecko_ids.get(&key).ok_or(PriceError::UnknownToken { chain_id })?;

        let url = format!("{}/simple/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", coingecko_id.as_str()), ("vs_currencies", "usd")])
            .send()
            .await
            .map_err(PriceError::RequestFailed)?
            .error_for_status()
            .map_err(PriceError::RequestFailed)?;

        let body: std::collections::HashMap<String, SimplePriceEntry> =
            response.json().await.map_err(PriceError::RequestFailed)?;
        let price = body
            .get(coingecko_id)
            .map(|entry| entry.usd)
            .ok_or_else(|| PriceError::InvalidResponse(format!("missing id {coingecko_id}")))?;

        self.cache.lock().expect("price cache poisoned").put(key, price);
        Ok(price)
    }
}

/// Resolve the USD worth of a raw token amount: `price * amount / 10^decimals`.
pub async fn usd_worth(
    price_service: &Arc<dyn TokenPriceService>,
    chain_id: u64,
    token: TokenId,
    amount: Decimal,
    decimals: u32,
) -> Result<Decimal, PriceError> {
    let price = price_service.price_usd(chain_id, token).await?;
    let scale = Decimal::from(10u64.pow(decimals));
    Ok(price * amount / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPriceService(Decimal);

    #[async_trait]
    impl TokenPriceService for FixedPriceService {
        async fn price_usd(&self, _chain_id: u64, _token: TokenId) -> Result<Decimal, PriceError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn usd_worth_scales_by_decimals() {
        let service: Arc<dyn TokenPriceService> =
            Arc::new(FixedPriceService(rust_decimal_macros::dec!(2000)));
        let worth = usd_worth(
            &service,
            1,
            TokenId::Evm(alloy::primitives::Address::ZERO),
            rust_decimal_macros::dec!(1_500_000), // 1.5 tokens at 6 decimals
            6,
        )
        .await
        .unwrap();
        assert_eq!(worth, rust_decimal_macros::dec!(3000));
    }
}

//! Profitability Evaluator: computes the reserve token and amount required to fill an order, the
//! slippage budget for the fulfill swap, and a profitability verdict.
//!
//! The two-round quoting technique (probe, then re-quote at the extrapolated amount) mirrors
//! `init4tech-signet-filler`'s `pricing/radius_client.rs`, which solves the same
//! "how much input do I need for this much output" problem for Permit2 fills.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::bucket::TokensBucketSet;
use crate::order::Order;
use crate::price::{self, PriceError, TokenPriceService};
use crate::signer::TokenId;
use crate::swap::{SwapError, SwapQuoteProvider, SwapRequest, SwapRoute};

#[derive(Debug, thiserror::Error)]
pub enum ProfitabilityError {
    #[error("no bucket covers give-token on take-chain {take_chain_id}")]
    NoBucket { take_chain_id: u64 },
    #[error(transparent)]
    Swap(#[from] SwapError),
    #[error(transparent)]
    Price(#[from] PriceError),
}

/// Result of a profitability evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ProfitabilityResult {
    pub reserve_dst_token: TokenId,
    pub required_reserve_dst_amount: Decimal,
    pub reserve_to_take_slippage_bps: u32,
    pub is_profitable: bool,
}

/// Unlock-cost amortization: `None` for un-batched chains (Solana), `Some(n)` otherwise.
pub fn amortized_unlock_cost_usd(unlock_cost_usd: Decimal, batch_unlock_size: Option<u8>) -> Decimal {
    match batch_unlock_size {
        Some(size) if size > 0 => unlock_cost_usd / Decimal::from(size),
        _ => unlock_cost_usd,
    }
}

/// Two-round quote: probe assuming a 1:1 rate, then re-quote at the extrapolated input amount
/// that the probe's realized rate implies is needed to hit `target_output`.
pub(crate) async fn quote_required_input(
    swap: &Arc<dyn SwapQuoteProvider>,
    reserve_token: TokenId,
    take_token: TokenId,
    target_output: Decimal,
    slippage_override: Option<u32>,
) -> Result<SwapRoute, SwapError> {
    let probe = swap
        .quote(SwapRequest {
            from: reserve_token,
            to: take_token,
            amount: target_output,
            slippage_override,
        })
        .await?;

    if probe.amount_out >= target_output || probe.amount_out.is_zero() {
        return Ok(probe);
    }

    let scale = target_output / probe.amount_out;
    let refined_amount_in = probe.amount_in * scale;

    swap.quote(SwapRequest {
        from: reserve_token,
        to: take_token,
        amount: refined_amount_in,
        slippage_override,
    })
    .await
}

/// Run the full evaluation: pick a reserve, quote the required input, and weigh it against gas,
/// unlock amortization and the operator's margin.
///
/// `prefer_estimation` keeps a previously fetched swap route consistent with the live fulfillment
/// by skipping the quote round entirely and reusing it.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate(
    buckets: &TokensBucketSet,
    price_service: &Arc<dyn TokenPriceService>,
    swap: &Arc<dyn SwapQuoteProvider>,
    order: &Order,
    take_decimals: u32,
    give_decimals: u32,
    gas_cost_usd: Decimal,
    unlock_cost_usd: Decimal,
    batch_unlock_size: Option<u8>,
    min_profitability_bps: u32,
    prefer_estimation: Option<SwapRoute>,
) -> Result<ProfitabilityResult, ProfitabilityError> {
    let bucket = buckets
        .pick_for_give(order.give_chain_id(), order.give.token, order.take_chain_id())
        .ok_or(ProfitabilityError::NoBucket { take_chain_id: order.take_chain_id() })?;
    let reserve_token_addr = bucket
        .tokens_on(order.take_chain_id())
        .first()
        .copied()
        .ok_or(ProfitabilityError::NoBucket { take_chain_id: order.take_chain_id() })?;
    let reserve_dst_token = TokenId::Evm(reserve_token_addr);
    let take_token = TokenId::Evm(order.take.token);

    let amortized_unlock = amortized_unlock_cost_usd(unlock_cost_usd, batch_unlock_size);

    let take_amount_decimal =
        Decimal::from_str_exact(&order.take.amount.to_string()).unwrap_or_default()
            / Decimal::from(10u64.pow(take_decimals));

    let route = if let Some(route) = prefer_estimation {
        route
    } else {
        quote_required_input(swap, reserve_dst_token, take_token, take_amount_decimal, None).await?
    };

    // Slippage budget: how much room the realized quote has over the required output, net of the
    // operator's required margin.
    let surplus_bps = if take_amount_decimal.is_zero() {
        0
    } else {
        let surplus_ratio = (route.amount_out - take_amount_decimal) / take_amount_decimal;
        (surplus_ratio * Decimal::from(10_000))
            .round()
            .to_string()
            .parse::<i64>()
            .unwrap_or(0)
            .max(0) as u32
    };
    let reserve_to_take_slippage_bps = surplus_bps.saturating_sub(min_profitability_bps);

    let give_amount_decimal =
        Decimal::from_str_exact(&order.give.amount.to_string()).unwrap_or_default()
            / Decimal::from(10u64.pow(give_decimals));
    let market_equivalent =
        price::usd_worth(price_service, order.give_chain_id(), TokenId::Evm(order.give.token), give_amount_decimal, 0)
            .await?;
    let reserve_price =
        price_service.price_usd(order.take_chain_id(), reserve_dst_token).await?;
    let required_reserve_usd = route.amount_in * reserve_price;
    let margin = market_equivalent * Decimal::from(min_profitability_bps) / Decimal::from(10_000);

    let is_profitable = required_reserve_usd + gas_cost_usd + amortized_unlock + margin
        <= market_equivalent;

    Ok(ProfitabilityResult {
        reserve_dst_token,
        required_reserve_dst_amount: route.amount_in,
        reserve_to_take_slippage_bps,
        is_profitable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Bucket, TokensBucketSet};
    use crate::order::{AssetAmount, OrderId, OrderStatus};
    use crate::price::PriceError;
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedPrice(Decimal);
    #[async_trait]
    impl TokenPriceService for FixedPrice {
        async fn price_usd(&self, _chain_id: u64, _token: TokenId) -> Result<Decimal, PriceError> {
            Ok(self.0)
        }
    }

    struct FixedSwap {
        rate: Decimal,
    }
    #[async_trait]
    impl SwapQuoteProvider for FixedSwap {
        async fn quote(&self, request: SwapRequest) -> Result<SwapRoute, SwapError> {
            Ok(SwapRoute {
                amount_in: request.amount / self.rate,
                amount_out: request.amount,
                slippage_bps: 0,
            })
        }
    }

    fn order_fixture() -> Order {
        let mut members = HashMap::new();
        members.insert(1u64, vec![Address::repeat_byte(1)]);
        members.insert(2u64, vec![Address::repeat_byte(2)]);
        let _ = TokensBucketSet::new(vec![Bucket::new(members)]);

        Order {
            order_id: OrderId([0; 32]),
            give: AssetAmount {
                chain_id: 1,
                token: Address::repeat_byte(1),
                amount: U256::from(1_000_000u64),
            },
            take: AssetAmount {
                chain_id: 2,
                token: Address::repeat_byte(9),
                amount: U256::from(1_000_000u64),
            },
            receiver: Address::ZERO,
            maker: Address::ZERO,
            status: OrderStatus::Created,
            finalization_info: None,
        }
    }

    fn bucket_set() -> TokensBucketSet {
        let mut members = HashMap::new();
        members.insert(1u64, vec![Address::repeat_byte(1)]);
        members.insert(2u64, vec![Address::repeat_byte(2)]);
        TokensBucketSet::new(vec![Bucket::new(members)])
    }

    #[tokio::test]
    async fn profitable_when_reserve_cost_and_fees_undercut_give_value() {
        let buckets = bucket_set();
        let price: Arc<dyn TokenPriceService> = Arc::new(FixedPrice(dec!(1)));
        let swap: Arc<dyn SwapQuoteProvider> = Arc::new(FixedSwap { rate: dec!(1) });
        let order = order_fixture();

        let result = evaluate(
            &buckets,
            &price,
            &swap,
            &order,
            6,
            6,
            dec!(0),
            dec!(0),
            Some(5),
            0,
            None,
        )
        .await
        .unwrap();

        assert!(result.is_profitable);
    }

    #[tokio::test]
    async fn unprofitable_when_gas_and_margin_exceed_give_value() {
        let buckets = bucket_set();
        let price: Arc<dyn TokenPriceService> = Arc::new(FixedPrice(dec!(1)));
        let swap: Arc<dyn SwapQuoteProvider> = Arc::new(FixedSwap { rate: dec!(1) });
        let order = order_fixture();

        let result = evaluate(
            &buckets,
            &price,
            &swap,
            &order,
            6,
            6,
            dec!(10), // gas cost alone exceeds the $1 give-value
            dec!(0),
            Some(5),
            0,
            None,
        )
        .await
        .unwrap();

        assert!(!result.is_profitable);
    }

    #[tokio::test]
    async fn solana_side_uses_unbatched_unlock_cost() {
        assert_eq!(amortized_unlock_cost_usd(dec!(10), None), dec!(10));
        assert_eq!(amortized_unlock_cost_usd(dec!(10), Some(5)), dec!(2));
    }

    #[tokio::test]
    async fn missing_bucket_is_an_error() {
        let buckets = TokensBucketSet::new(vec![]);
        let price: Arc<dyn TokenPriceService> = Arc::new(FixedPrice(dec!(1)));
        let swap: Arc<dyn SwapQuoteProvider> = Arc::new(FixedSwap { rate: dec!(1) });
        let order = order_fixture();

        let result =
            evaluate(&buckets, &price, &swap, &order, 6, 6, dec!(0), dec!(0), Some(5), 0, None)
                .await;
        assert!(matches!(result, Err(ProfitabilityError::NoBucket { .. })));
    }
}

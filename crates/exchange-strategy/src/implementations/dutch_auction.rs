//! Descending price auction.
//!
//! The asking price falls linearly from `startPrice` at `startTime` to
//! `endPrice` at the ask's deadline. Any bid at or above the current price
//! settles at once at the bid's price.

use alloy_primitives::U256;

use crate::params::{decode, DutchAuctionParams};
use crate::{BidContext, ClaimContext, StrategyInterface, StrategyKind};

pub struct DutchAuction;

/// Price of the auction at `now`, or `None` if the parameters are unusable.
///
/// Clamped to `startPrice` before `startTime` and to `endPrice` from the
/// deadline on. The decay term is truncated, so the price rounds up. A price
/// range too wide to scale by the elapsed time is unusable.
pub fn current_price(params: &DutchAuctionParams, deadline: u64, now: u64) -> Option<U256> {
	if params.startPrice < params.endPrice {
		return None;
	}

	let now = U256::from(now);
	let deadline = U256::from(deadline);
	if now <= params.startTime {
		return Some(params.startPrice);
	}
	if now >= deadline || deadline <= params.startTime {
		return Some(params.endPrice);
	}

	let elapsed = now - params.startTime;
	let duration = deadline - params.startTime;
	let drop = (params.startPrice - params.endPrice).checked_mul(elapsed)? / duration;
	Some(params.startPrice - drop)
}

impl StrategyInterface for DutchAuction {
	fn kind(&self) -> StrategyKind {
		StrategyKind::DutchAuction
	}

	fn settles_immediately(&self) -> bool {
		true
	}

	fn can_bid(&self, ctx: &BidContext<'_>) -> bool {
		if ctx.now > ctx.deadline {
			return false;
		}
		decode::<DutchAuctionParams>(ctx.params)
			.and_then(|params| current_price(&params, ctx.deadline, ctx.now))
			.is_some_and(|price| ctx.price >= price)
	}

	fn can_claim(&self, _ctx: &ClaimContext<'_>) -> bool {
		false
	}
}

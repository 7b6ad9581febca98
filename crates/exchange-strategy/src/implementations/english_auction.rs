//! Ascending auction.
//!
//! Bids at or above the floor are recorded as the best bid as long as each
//! one strictly beats the previous best. After the deadline the best bid can
//! be claimed by anyone.

use crate::params::{decode, EnglishAuctionParams};
use crate::{BidContext, ClaimContext, StrategyInterface, StrategyKind};

pub struct EnglishAuction;

impl StrategyInterface for EnglishAuction {
	fn kind(&self) -> StrategyKind {
		StrategyKind::EnglishAuction
	}

	fn settles_immediately(&self) -> bool {
		false
	}

	fn can_bid(&self, ctx: &BidContext<'_>) -> bool {
		if ctx.now > ctx.deadline {
			return false;
		}
		let Some(params) = decode::<EnglishAuctionParams>(ctx.params) else {
			return false;
		};
		if ctx.price < params.floorPrice {
			return false;
		}
		match ctx.best_bid {
			Some(best) => ctx.price > best.price,
			None => true,
		}
	}

	fn can_claim(&self, ctx: &ClaimContext<'_>) -> bool {
		ctx.now > ctx.deadline && ctx.best_bid.is_some()
	}
}

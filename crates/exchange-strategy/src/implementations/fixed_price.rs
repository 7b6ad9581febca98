//! Fixed price sale: any bid at exactly the asking price settles at once.

use crate::params::{decode, FixedPriceParams};
use crate::{BidContext, ClaimContext, StrategyInterface, StrategyKind};

pub struct FixedPrice;

impl StrategyInterface for FixedPrice {
	fn kind(&self) -> StrategyKind {
		StrategyKind::FixedPrice
	}

	fn settles_immediately(&self) -> bool {
		true
	}

	fn can_bid(&self, ctx: &BidContext<'_>) -> bool {
		if ctx.now > ctx.deadline {
			return false;
		}
		decode::<FixedPriceParams>(ctx.params).is_some_and(|params| params.price == ctx.price)
	}

	/// Nothing is ever left to finalise.
	fn can_claim(&self, _ctx: &ClaimContext<'_>) -> bool {
		false
	}
}

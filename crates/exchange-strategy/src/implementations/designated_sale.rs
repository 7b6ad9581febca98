//! Sale reserved for a single known buyer.
//!
//! Only a bid paid by, or delivering to, the buyer named in the parameters
//! is acceptable, and only at the agreed price. Usually executed through a
//! delegated bid prepared by the ask's delegate.

use crate::params::{decode, DesignatedSaleParams};
use crate::{BidContext, ClaimContext, StrategyInterface, StrategyKind};

pub struct DesignatedSale;

impl StrategyInterface for DesignatedSale {
	fn kind(&self) -> StrategyKind {
		StrategyKind::DesignatedSale
	}

	fn settles_immediately(&self) -> bool {
		true
	}

	fn can_bid(&self, ctx: &BidContext<'_>) -> bool {
		if ctx.now > ctx.deadline {
			return false;
		}
		decode::<DesignatedSaleParams>(ctx.params).is_some_and(|params| {
			(ctx.bidder == params.buyer || ctx.recipient == params.buyer)
				&& ctx.price == params.price
		})
	}

	fn can_claim(&self, ctx: &ClaimContext<'_>) -> bool {
		let (Some(best), Some(params)) = (
			ctx.best_bid,
			decode::<DesignatedSaleParams>(ctx.params),
		) else {
			return false;
		};
		best.bidder == params.buyer || best.recipient == params.buyer
	}
}

//! Fee waterfall: splitting a gross price between protocol, operator,
//! royalty beneficiary and seller.
//!
//! All rates are parts per thousand and every division truncates. The
//! protocol and operator cuts always come off the gross price; the royalty
//! either does too ([`RoyaltyBasis::Gross`]) or comes off what the first two
//! cuts leave ([`RoyaltyBasis::NetOfFees`]). The royalty is capped so the
//! four parts always sum to the gross price. A price too large to scale by a
//! rate yields `None` rather than a wrapped result.

use alloy_primitives::U256;
use exchange_types::{FeeSplit, RoyaltyBasis, FEE_DENOMINATOR};

/// `amount * rate / 1000`, with the rate clamped to 1000. `None` if the
/// product overflows.
pub fn per_mille(amount: U256, rate_per_mille: u16) -> Option<U256> {
	let rate = u64::from(rate_per_mille).min(FEE_DENOMINATOR);
	amount
		.checked_mul(U256::from(rate))
		.map(|scaled| scaled / U256::from(FEE_DENOMINATOR))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeWaterfall {
	basis: RoyaltyBasis,
}

impl FeeWaterfall {
	pub fn new(basis: RoyaltyBasis) -> Self {
		Self { basis }
	}

	pub fn basis(&self) -> RoyaltyBasis {
		self.basis
	}

	/// Protocol and operator cuts of `gross`. Their sum never exceeds `gross`.
	pub fn platform_cuts(
		&self,
		gross: U256,
		protocol_rate: u16,
		operator_rate: u16,
	) -> Option<(U256, U256)> {
		let protocol_cut = per_mille(gross, protocol_rate)?;
		let operator_cut = per_mille(gross, operator_rate)?.min(gross - protocol_cut);
		Some((protocol_cut, operator_cut))
	}

	/// Amount the royalty is computed on.
	pub fn royalty_base(&self, gross: U256, protocol_cut: U256, operator_cut: U256) -> U256 {
		match self.basis {
			RoyaltyBasis::Gross => gross,
			RoyaltyBasis::NetOfFees => gross.saturating_sub(protocol_cut + operator_cut),
		}
	}

	/// Completes a split from already computed cuts, capping the royalty at
	/// what is left after the platform cuts.
	pub fn finish(
		&self,
		gross: U256,
		protocol_cut: U256,
		operator_cut: U256,
		royalty_cut: U256,
	) -> FeeSplit {
		let after_platform = gross.saturating_sub(protocol_cut + operator_cut);
		let royalty_cut = royalty_cut.min(after_platform);
		FeeSplit {
			protocol_cut,
			operator_cut,
			royalty_cut,
			seller_net: after_platform - royalty_cut,
		}
	}

	/// Splits `gross` given all three rates.
	pub fn split(
		&self,
		gross: U256,
		protocol_rate: u16,
		operator_rate: u16,
		royalty_rate: u16,
	) -> Option<FeeSplit> {
		let (protocol_cut, operator_cut) =
			self.platform_cuts(gross, protocol_rate, operator_rate)?;
		let base = self.royalty_base(gross, protocol_cut, operator_cut);
		let royalty_cut = per_mille(base, royalty_rate)?;
		Some(self.finish(gross, protocol_cut, operator_cut, royalty_cut))
	}
}

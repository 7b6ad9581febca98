//! ABI layouts of the strategy parameters carried in `AskOrder::params`.

use alloy_primitives::Bytes;
use alloy_sol_types::{sol, SolValue};

sol! {
	/// Sale at exactly `price`.
	struct FixedPriceParams {
		uint256 price;
	}

	/// Ascending auction with a reserve.
	struct EnglishAuctionParams {
		uint256 floorPrice;
	}

	/// Price falls linearly from `startPrice` at `startTime` to `endPrice`
	/// at the ask deadline.
	struct DutchAuctionParams {
		uint256 startPrice;
		uint256 endPrice;
		uint256 startTime;
	}

	/// Sale reserved for one buyer at `price`.
	struct DesignatedSaleParams {
		address buyer;
		uint256 price;
	}
}

/// ABI-encodes strategy parameters for an ask.
pub fn encode<T: SolValue>(params: &T) -> Bytes {
	Bytes::from(params.abi_encode())
}

/// Decodes strategy parameters. Anything malformed yields `None`.
pub fn decode<T>(params: &[u8]) -> Option<T>
where
	T: SolValue + From<<T::SolType as alloy_sol_types::SolType>::RustType>,
{
	T::abi_decode(params, true).ok()
}

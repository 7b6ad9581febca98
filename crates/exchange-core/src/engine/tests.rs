use super::*;
use crate::ExchangeBuilder;
use async_trait::async_trait;
use exchange_config::{ConfigLoader, ExchangeConfig};
use exchange_settlement::implementations::memory::{InMemoryAssets, InMemoryLedger, StaticFeeConfig};
use exchange_signature::implementations::local::LocalWallet;
use exchange_signature::SignerService;
use exchange_storage::implementations::memory::MemoryStorage;
use exchange_storage::{StorageError, StorageInterface};
use exchange_strategy::params::{
	encode, DesignatedSaleParams, DutchAuctionParams, EnglishAuctionParams, FixedPriceParams,
};
use exchange_types::{
	AssetId, Bytes, ExchangeDomain, FeeConfig, FeeRate, ManualClock, OrderStatus,
};

const FIXED: Address = Address::repeat_byte(0x11);
const ENGLISH: Address = Address::repeat_byte(0x22);
const DUTCH: Address = Address::repeat_byte(0x33);
const DESIGNATED: Address = Address::repeat_byte(0x44);
const CURRENCY: Address = Address::repeat_byte(0xc0);
const COLLECTION: Address = Address::repeat_byte(0xaa);
const MANAGED: Address = Address::repeat_byte(0x99);
const PROTOCOL: Address = Address::repeat_byte(0x0a);
const OPERATOR: Address = Address::repeat_byte(0x0b);
const ARTIST: Address = Address::repeat_byte(0x0c);

const START: u64 = 1_000;
const DEADLINE: u64 = 2_000;

fn u(value: u64) -> U256 {
	U256::from(value)
}

fn asset() -> AssetId {
	AssetId::new(COLLECTION, u(1))
}

fn domain() -> ExchangeDomain {
	ExchangeDomain::new("Exchange", "1", 31337, Address::repeat_byte(0xee))
}

fn config(variant: &str) -> ExchangeConfig {
	ConfigLoader::from_toml(&format!(
		r#"
[exchange]
name = "Exchange"
version = "1"
chain_id = 31337
verifying_contract = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"
variant = "{variant}"
managed_assets = ["0x9999999999999999999999999999999999999999"]

[fees.protocol]
recipient = "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"
rate_per_mille = 25

[fees.operator]
recipient = "0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b"
rate_per_mille = 5

[strategies.fixed]
kind = "fixed_price"
address = "0x1111111111111111111111111111111111111111"

[strategies.english]
kind = "english_auction"
address = "0x2222222222222222222222222222222222222222"

[strategies.dutch]
kind = "dutch_auction"
address = "0x3333333333333333333333333333333333333333"

[strategies.designated]
kind = "designated_sale"
address = "0x4444444444444444444444444444444444444444"
"#
	))
	.unwrap()
}

fn fixed(price: u64) -> Bytes {
	encode(&FixedPriceParams { price: u(price) })
}

fn english(floor: u64) -> Bytes {
	encode(&EnglishAuctionParams {
		floorPrice: u(floor),
	})
}

struct Party {
	address: Address,
	signer: SignerService,
}

impl Party {
	fn new() -> Self {
		let wallet = LocalWallet::random();
		let address = wallet.address_sync();
		Self {
			address,
			signer: SignerService::new(Box::new(wallet), domain()),
		}
	}

	async fn sign_bid(&self, ask_hash: OrderHash, amount: u64, price: u64) -> BidOrder {
		self.signer
			.sign_bid(BidOrder {
				ask_hash,
				signer: self.address,
				amount: u(amount),
				price: u(price),
				recipient: None,
				referrer: None,
				signature: Bytes::new(),
			})
			.await
			.unwrap()
	}
}

struct Harness {
	engine: MatchingEngine,
	clock: Arc<ManualClock>,
	assets: Arc<InMemoryAssets>,
	ledger: Arc<InMemoryLedger>,
	fees: Arc<StaticFeeConfig>,
	seller: Party,
}

impl Harness {
	async fn new(variant: &str) -> Self {
		Self::with_storage(variant, Box::new(MemoryStorage::new())).await
	}

	async fn with_storage(variant: &str, storage: Box<dyn StorageInterface>) -> Self {
		let config = config(variant);
		let clock = Arc::new(ManualClock::new(START));
		let assets = Arc::new(InMemoryAssets::new());
		let ledger = Arc::new(InMemoryLedger::new());
		let fees = Arc::new(StaticFeeConfig::new(config.fees));

		let engine = ExchangeBuilder::new(config)
			.with_assets(assets.clone())
			.with_ledger(ledger.clone())
			.with_fees(fees.clone())
			.with_clock(clock.clone())
			.with_storage(storage)
			.build()
			.unwrap();

		let seller = Party::new();
		assets.mint(asset(), seller.address, u(100)).await;
		assets
			.mint(AssetId::new(MANAGED, u(1)), seller.address, u(100))
			.await;

		Self {
			engine,
			clock,
			assets,
			ledger,
			fees,
			seller,
		}
	}

	async fn buyer(&self, funds: u64) -> Party {
		let party = Party::new();
		self.ledger.mint(CURRENCY, party.address, u(funds)).await;
		party
	}

	fn unsigned_ask(&self, strategy: Address, amount: u64, params: Bytes) -> AskOrder {
		AskOrder {
			signer: self.seller.address,
			delegate: None,
			asset: asset(),
			amount: u(amount),
			strategy,
			currency: CURRENCY,
			fee_recipient: None,
			deadline: DEADLINE,
			params,
			signature: Bytes::new(),
		}
	}

	async fn sign(&self, ask: AskOrder) -> AskOrder {
		self.seller.signer.sign_ask(ask).await.unwrap()
	}

	async fn ask(&self, strategy: Address, amount: u64, params: Bytes) -> AskOrder {
		self.sign(self.unsigned_ask(strategy, amount, params)).await
	}

	async fn balance(&self, holder: Address) -> U256 {
		self.ledger.balance_of(CURRENCY, holder).await
	}

	async fn units(&self, holder: Address) -> U256 {
		self.assets.balance_of(&asset(), holder).await
	}
}

#[tokio::test]
async fn test_single_unit_fixed_price_settles_once() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;
	let other = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;
	let ask_hash = h.engine.ask_hash(&ask);

	h.engine
		.bid(buyer.address, &ask, u(1), u(1_000), None, None)
		.await
		.unwrap();

	assert_eq!(h.balance(buyer.address).await, u(9_000));
	assert_eq!(h.balance(PROTOCOL).await, u(25));
	assert_eq!(h.balance(OPERATOR).await, u(5));
	assert_eq!(h.balance(h.seller.address).await, u(970));
	assert_eq!(h.units(buyer.address).await, u(1));
	assert!(h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());

	assert_eq!(
		h.engine
			.bid(other.address, &ask, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::SoldOut)
	);
	assert_eq!(
		h.engine.claim(other.address, &ask).await,
		Err(ExchangeError::SoldOut)
	);
	assert_eq!(
		h.engine.cancel(h.seller.address, &ask).await,
		Err(ExchangeError::SoldOut)
	);
	assert_eq!(h.balance(other.address).await, u(10_000));
}

#[tokio::test]
async fn test_fixed_price_rejects_other_prices() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;

	for price in [999, 1_001] {
		assert!(matches!(
			h.engine
				.bid(buyer.address, &ask, u(1), u(price), None, None)
				.await,
			Err(ExchangeError::Failure(_))
		));
	}
	assert_eq!(h.balance(buyer.address).await, u(10_000));
	assert_eq!(h.units(buyer.address).await, U256::ZERO);
}

#[tokio::test]
async fn test_multi_unit_partial_fills_and_fee_example() {
	let h = Harness::new("multi_unit").await;
	let first = h.buyer(10_000).await;
	let second = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 20, fixed(50)).await;
	let ask_hash = h.engine.ask_hash(&ask);

	h.engine
		.bid(first.address, &ask, u(11), u(50), None, None)
		.await
		.unwrap();
	assert_eq!(h.balance(first.address).await, u(10_000 - 550));
	assert_eq!(h.balance(h.seller.address).await, u(535));
	assert_eq!(h.balance(PROTOCOL).await, u(13));
	assert_eq!(h.balance(OPERATOR).await, u(2));
	assert_eq!(h.units(first.address).await, u(11));
	assert_eq!(h.engine.amount_filled(&ask_hash).await.unwrap(), u(11));
	assert_eq!(
		h.engine.fill_state(&ask_hash).await.unwrap().status,
		OrderStatus::PartiallyFilled
	);

	assert_eq!(
		h.engine
			.bid(second.address, &ask, u(10), u(50), None, None)
			.await,
		Err(ExchangeError::SoldOut)
	);
	h.engine
		.bid(second.address, &ask, u(9), u(50), None, None)
		.await
		.unwrap();
	assert_eq!(h.engine.amount_filled(&ask_hash).await.unwrap(), u(20));
	assert!(h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());
	// 450 gross: 11 protocol, 2 operator
	assert_eq!(h.balance(h.seller.address).await, u(535 + 437));

	assert_eq!(
		h.engine
			.bid(second.address, &ask, u(1), u(50), None, None)
			.await,
		Err(ExchangeError::SoldOut)
	);
	assert_eq!(h.units(second.address).await, u(9));
}

#[tokio::test]
async fn test_multi_unit_zero_amount_bid_fails() {
	let h = Harness::new("multi_unit").await;
	let buyer = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 5, fixed(50)).await;

	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, U256::ZERO, u(50), None, None)
			.await,
		Err(ExchangeError::Failure(_))
	));
}

#[tokio::test]
async fn test_cancel_permissions_and_pending_bids() {
	let h = Harness::new("single_unit").await;
	let bidder = h.buyer(10_000).await;
	let stranger = Party::new();

	let auction = h.ask(ENGLISH, 1, english(100)).await;
	assert!(matches!(
		h.engine.cancel(stranger.address, &auction).await,
		Err(ExchangeError::Forbidden(_))
	));
	h.engine
		.bid(bidder.address, &auction, u(1), u(150), None, None)
		.await
		.unwrap();
	assert_eq!(
		h.engine.cancel(h.seller.address, &auction).await,
		Err(ExchangeError::BidExists)
	);

	let sale = h.ask(FIXED, 1, fixed(500)).await;
	let sale_hash = h.engine.ask_hash(&sale);
	let mut events = h.engine.event_bus().subscribe();
	h.engine.cancel(h.seller.address, &sale).await.unwrap();

	assert_eq!(
		events.recv().await.unwrap(),
		ExchangeEvent::Cancel {
			ask_hash: sale_hash,
			signer: h.seller.address,
		}
	);
	assert_eq!(
		h.engine.fill_state(&sale_hash).await.unwrap().status,
		OrderStatus::Cancelled
	);
	assert_eq!(
		h.engine
			.bid(bidder.address, &sale, u(1), u(500), None, None)
			.await,
		Err(ExchangeError::SoldOut)
	);
}

#[tokio::test]
async fn test_english_auction_lifecycle() {
	let h = Harness::new("single_unit").await;
	let first = h.buyer(10_000).await;
	let second = h.buyer(10_000).await;
	let ask = h.ask(ENGLISH, 1, english(100)).await;
	let ask_hash = h.engine.ask_hash(&ask);
	let mut events = h.engine.event_bus().subscribe();

	assert!(matches!(
		h.engine
			.bid(first.address, &ask, u(1), u(99), None, None)
			.await,
		Err(ExchangeError::Failure(_))
	));

	h.engine
		.bid(first.address, &ask, u(1), u(100), None, None)
		.await
		.unwrap();
	let best = h.engine.best_bid(&ask_hash).await.unwrap().unwrap();
	assert_eq!(best.bidder, first.address);
	assert_eq!(best.price, u(100));
	assert_eq!(best.recorded_at_block, h.clock.block_number());
	assert!(matches!(
		events.recv().await.unwrap(),
		ExchangeEvent::Bid { price, .. } if price == u(100)
	));
	// Recording a bid moves no money.
	assert_eq!(h.balance(first.address).await, u(10_000));

	for price in [100, 99] {
		assert!(matches!(
			h.engine
				.bid(second.address, &ask, u(1), u(price), None, None)
				.await,
			Err(ExchangeError::Failure(_))
		));
	}
	h.engine
		.bid(second.address, &ask, u(1), u(150), None, None)
		.await
		.unwrap();
	assert_eq!(
		h.engine.best_bid(&ask_hash).await.unwrap().unwrap().bidder,
		second.address
	);

	h.clock.set(1_500);
	assert!(matches!(
		h.engine.claim(first.address, &ask).await,
		Err(ExchangeError::Failure(_))
	));

	h.clock.set(DEADLINE);
	assert!(matches!(
		h.engine.claim(first.address, &ask).await,
		Err(ExchangeError::Failure(_))
	));
	h.engine
		.bid(first.address, &ask, u(1), u(160), None, None)
		.await
		.unwrap();

	h.clock.set(DEADLINE + 1);
	assert_eq!(
		h.engine
			.bid(second.address, &ask, u(1), u(500), None, None)
			.await,
		Err(ExchangeError::Expired {
			expired_at: DEADLINE
		})
	);

	let anyone = Party::new();
	h.engine.claim(anyone.address, &ask).await.unwrap();
	assert_eq!(h.units(first.address).await, u(1));
	assert_eq!(h.balance(first.address).await, u(10_000 - 160));
	assert_eq!(h.balance(h.seller.address).await, u(156));
	assert_eq!(h.balance(second.address).await, u(10_000));
	assert!(h.engine.best_bid(&ask_hash).await.unwrap().is_none());
	assert_eq!(
		h.engine.claim(anyone.address, &ask).await,
		Err(ExchangeError::SoldOut)
	);
}

#[tokio::test]
async fn test_claim_without_best_bid_fails() {
	let h = Harness::new("single_unit").await;
	let ask = h.ask(ENGLISH, 1, english(100)).await;
	h.clock.set(DEADLINE + 1);

	assert!(matches!(
		h.engine.claim(h.seller.address, &ask).await,
		Err(ExchangeError::Failure(_))
	));

	let fixed_ask = h.ask(FIXED, 1, fixed(10)).await;
	assert!(matches!(
		h.engine.claim(h.seller.address, &fixed_ask).await,
		Err(ExchangeError::Failure(_))
	));
}

#[tokio::test]
async fn test_multi_unit_auction_claim_fills_bid_amount() {
	let h = Harness::new("multi_unit").await;
	let bidder = h.buyer(10_000).await;
	let ask = h.ask(ENGLISH, 10, english(10)).await;
	let ask_hash = h.engine.ask_hash(&ask);

	assert_eq!(
		h.engine
			.bid(bidder.address, &ask, u(11), u(20), None, None)
			.await,
		Err(ExchangeError::SoldOut)
	);
	h.engine
		.bid(bidder.address, &ask, u(4), u(20), None, None)
		.await
		.unwrap();

	h.clock.set(DEADLINE + 1);
	h.engine.claim(bidder.address, &ask).await.unwrap();

	assert_eq!(h.units(bidder.address).await, u(4));
	assert_eq!(h.balance(bidder.address).await, u(10_000 - 80));
	assert_eq!(h.engine.amount_filled(&ask_hash).await.unwrap(), u(4));
	assert!(!h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());
}

#[tokio::test]
async fn test_dutch_auction_accepts_current_price_or_more() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;
	let params = encode(&DutchAuctionParams {
		startPrice: u(1_000),
		endPrice: u(100),
		startTime: u(START),
	});
	let ask = h.ask(DUTCH, 1, params).await;

	h.clock.set(1_500);
	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, u(1), u(549), None, None)
			.await,
		Err(ExchangeError::Failure(_))
	));
	h.engine
		.bid(buyer.address, &ask, u(1), u(550), None, None)
		.await
		.unwrap();

	assert_eq!(h.balance(buyer.address).await, u(10_000 - 550));
	assert_eq!(h.units(buyer.address).await, u(1));
}

#[tokio::test]
async fn test_delegated_bid_settles_once_and_clears_approval() {
	let h = Harness::new("single_unit").await;
	let delegate = Party::new();
	let relayer = Party::new();
	let buyer = h.buyer(10_000).await;

	let mut ask = h.unsigned_ask(
		DESIGNATED,
		1,
		encode(&DesignatedSaleParams {
			buyer: buyer.address,
			price: u(500),
		}),
	);
	ask.delegate = Some(delegate.address);
	let ask = h.sign(ask).await;
	let ask_hash = h.engine.ask_hash(&ask);

	let bid = buyer.sign_bid(ask_hash, 1, 500).await;
	let bid_hash = h.engine.bid_hash(&bid);
	assert!(!h.engine.is_bid_consumed(&bid_hash).await.unwrap());

	let mut events = h.engine.event_bus().subscribe();
	h.engine
		.update_approved_bid_hash(delegate.address, &ask, buyer.address, bid_hash)
		.await
		.unwrap();
	assert_eq!(
		h.engine
			.approved_bid_hash(delegate.address, ask_hash, buyer.address)
			.await
			.unwrap(),
		Some(bid_hash)
	);
	assert!(matches!(
		events.recv().await.unwrap(),
		ExchangeEvent::UpdateApprovedBidHash { bid_hash: hash, .. } if hash == bid_hash
	));

	h.engine
		.bid_with_order(relayer.address, &ask, &bid)
		.await
		.unwrap();
	assert_eq!(h.units(buyer.address).await, u(1));
	assert_eq!(h.balance(buyer.address).await, u(9_500));
	assert_eq!(h.balance(relayer.address).await, U256::ZERO);
	assert!(h.engine.is_bid_consumed(&bid_hash).await.unwrap());
	assert!(h
		.engine
		.approved_bid_hash(delegate.address, ask_hash, buyer.address)
		.await
		.unwrap()
		.is_none());
	assert!(matches!(
		events.recv().await.unwrap(),
		ExchangeEvent::Claim { bidder, .. } if bidder == buyer.address
	));

	assert_eq!(
		h.engine.bid_with_order(relayer.address, &ask, &bid).await,
		Err(ExchangeError::SoldOut)
	);
	assert_eq!(
		h.engine.bid_with_order(delegate.address, &ask, &bid).await,
		Err(ExchangeError::SoldOut)
	);
}

#[tokio::test]
async fn test_delegated_bid_must_match_approval() {
	let h = Harness::new("single_unit").await;
	let delegate = Party::new();
	let relayer = Party::new();
	let buyer = h.buyer(10_000).await;

	let mut ask = h.unsigned_ask(
		DESIGNATED,
		1,
		encode(&DesignatedSaleParams {
			buyer: buyer.address,
			price: u(500),
		}),
	);
	ask.delegate = Some(delegate.address);
	let ask = h.sign(ask).await;
	let ask_hash = h.engine.ask_hash(&ask);

	let approved = buyer.sign_bid(ask_hash, 1, 500).await;
	h.engine
		.update_approved_bid_hash(
			delegate.address,
			&ask,
			buyer.address,
			h.engine.bid_hash(&approved),
		)
		.await
		.unwrap();

	let cheaper = buyer.sign_bid(ask_hash, 1, 400).await;
	assert!(matches!(
		h.engine.bid_with_order(relayer.address, &ask, &cheaper).await,
		Err(ExchangeError::Forbidden(_))
	));
	assert!(!h
		.engine
		.is_bid_consumed(&h.engine.bid_hash(&cheaper))
		.await
		.unwrap());
	assert_eq!(h.balance(buyer.address).await, u(10_000));

	assert!(matches!(
		h.engine
			.update_approved_bid_hash(relayer.address, &ask, buyer.address, B256::ZERO)
			.await,
		Err(ExchangeError::Unauthorized(_))
	));

	// Approval bookkeeping outlives the ask's deadline.
	h.clock.set(DEADLINE + 100);
	h.engine
		.update_approved_bid_hash(
			delegate.address,
			&ask,
			buyer.address,
			h.engine.bid_hash(&cheaper),
		)
		.await
		.unwrap();
	assert_eq!(
		h.engine
			.approved_bid_hash(delegate.address, ask_hash, buyer.address)
			.await
			.unwrap(),
		Some(h.engine.bid_hash(&cheaper))
	);
}

#[tokio::test]
async fn test_delegate_submits_bid_order_directly() {
	let h = Harness::new("multi_unit").await;
	let delegate = Party::new();
	let buyer = h.buyer(10_000).await;

	let mut ask = h.unsigned_ask(FIXED, 10, fixed(50));
	ask.delegate = Some(delegate.address);
	let ask = h.sign(ask).await;
	let ask_hash = h.engine.ask_hash(&ask);

	let bid = buyer.sign_bid(ask_hash, 2, 50).await;
	h.engine
		.bid_with_order(delegate.address, &ask, &bid)
		.await
		.unwrap();
	assert_eq!(h.units(buyer.address).await, u(2));
	assert_eq!(h.engine.amount_filled(&ask_hash).await.unwrap(), u(2));

	let other_ask = h.ask(FIXED, 10, fixed(50)).await;
	let misdirected = buyer.sign_bid(ask_hash, 1, 50).await;
	assert!(matches!(
		h.engine
			.bid_with_order(delegate.address, &other_ask, &misdirected)
			.await,
		Err(ExchangeError::Unauthorized(_))
	));

	let undelegated_hash = h.engine.ask_hash(&other_ask);
	let bid = buyer.sign_bid(undelegated_hash, 1, 50).await;
	assert!(matches!(
		h.engine
			.bid_with_order(delegate.address, &other_ask, &bid)
			.await,
		Err(ExchangeError::Forbidden(_))
	));
}

#[tokio::test]
async fn test_delegated_bid_on_auction_is_recorded_then_claimed() {
	let h = Harness::new("single_unit").await;
	let delegate = Party::new();
	let relayer = Party::new();
	let buyer = h.buyer(10_000).await;

	let mut ask = h.unsigned_ask(ENGLISH, 1, english(100));
	ask.delegate = Some(delegate.address);
	let ask = h.sign(ask).await;
	let ask_hash = h.engine.ask_hash(&ask);

	let bid = buyer.sign_bid(ask_hash, 1, 200).await;
	let bid_hash = h.engine.bid_hash(&bid);
	h.engine
		.update_approved_bid_hash(delegate.address, &ask, buyer.address, bid_hash)
		.await
		.unwrap();

	let mut events = h.engine.event_bus().subscribe();
	h.engine
		.bid_with_order(relayer.address, &ask, &bid)
		.await
		.unwrap();

	let best = h.engine.best_bid(&ask_hash).await.unwrap().unwrap();
	assert_eq!(best.bidder, buyer.address);
	assert_eq!(best.price, u(200));
	assert!(h
		.engine
		.approved_bid_hash(delegate.address, ask_hash, buyer.address)
		.await
		.unwrap()
		.is_none());
	assert!(h.engine.is_bid_consumed(&bid_hash).await.unwrap());
	assert!(matches!(
		events.recv().await.unwrap(),
		ExchangeEvent::Bid { bidder, .. } if bidder == buyer.address
	));
	// Recorded only; nothing moves before the claim.
	assert_eq!(h.balance(buyer.address).await, u(10_000));
	assert_eq!(h.balance(relayer.address).await, U256::ZERO);

	assert_eq!(
		h.engine.bid_with_order(relayer.address, &ask, &bid).await,
		Err(ExchangeError::SoldOut)
	);

	h.clock.set(DEADLINE + 1);
	h.engine.claim(relayer.address, &ask).await.unwrap();
	assert_eq!(h.balance(buyer.address).await, u(9_800));
	assert_eq!(h.units(buyer.address).await, u(1));
	assert_eq!(h.balance(relayer.address).await, U256::ZERO);
	assert!(h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());
}

#[tokio::test]
async fn test_managed_assets_cannot_trade() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;

	assert!(h.engine.can_trade(COLLECTION).await);
	assert!(!h.engine.can_trade(MANAGED).await);

	let mut ask = h.unsigned_ask(FIXED, 1, fixed(100));
	ask.asset = AssetId::new(MANAGED, u(1));
	let ask = h.sign(ask).await;

	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, u(1), u(100), None, None)
			.await,
		Err(ExchangeError::InvalidExchange(_))
	));
}

#[tokio::test]
async fn test_ask_validity_checks() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;

	let mut tampered = h.ask(FIXED, 1, fixed(1_000)).await;
	tampered.params = fixed(1);
	assert!(matches!(
		h.engine
			.bid(buyer.address, &tampered, u(1), u(1), None, None)
			.await,
		Err(ExchangeError::Unauthorized(_))
	));

	let empty = h.ask(FIXED, 0, fixed(1_000)).await;
	assert!(matches!(
		h.engine
			.bid(buyer.address, &empty, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::InvalidOrder(_))
	));

	let unknown = h.ask(Address::repeat_byte(0x55), 1, fixed(1_000)).await;
	assert!(matches!(
		h.engine
			.bid(buyer.address, &unknown, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::InvalidOrder(_))
	));

	let ask = h.ask(FIXED, 1, fixed(1_000)).await;
	h.clock.set(DEADLINE + 1);
	assert_eq!(
		h.engine
			.bid(buyer.address, &ask, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::Expired {
			expired_at: DEADLINE
		})
	);
	assert_eq!(h.balance(buyer.address).await, u(10_000));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(999).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;
	let ask_hash = h.engine.ask_hash(&ask);

	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::FailedToTransferFunds(_))
	));

	assert_eq!(h.balance(buyer.address).await, u(999));
	assert_eq!(h.balance(PROTOCOL).await, U256::ZERO);
	assert_eq!(h.balance(h.seller.address).await, U256::ZERO);
	assert_eq!(h.units(h.seller.address).await, u(100));
	assert!(!h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());

	h.ledger.mint(CURRENCY, buyer.address, u(1)).await;
	h.engine
		.bid(buyer.address, &ask, u(1), u(1_000), None, None)
		.await
		.unwrap();
}

#[tokio::test]
async fn test_price_too_large_to_split_fails_cleanly() {
	let h = Harness::new("single_unit").await;
	let price = U256::MAX / u(2);
	let buyer = Party::new();
	h.ledger.mint(CURRENCY, buyer.address, price).await;
	let ask = h
		.ask(FIXED, 1, encode(&FixedPriceParams { price }))
		.await;
	let ask_hash = h.engine.ask_hash(&ask);

	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, u(1), price, None, None)
			.await,
		Err(ExchangeError::Failure(_))
	));

	assert_eq!(h.balance(buyer.address).await, price);
	assert_eq!(h.balance(PROTOCOL).await, U256::ZERO);
	assert_eq!(h.balance(h.seller.address).await, U256::ZERO);
	assert_eq!(h.units(h.seller.address).await, u(100));
	assert_eq!(h.engine.amount_filled(&ask_hash).await.unwrap(), U256::ZERO);
	assert!(!h.engine.is_cancelled_or_claimed(&ask_hash).await.unwrap());
}

#[tokio::test]
async fn test_fee_rates_are_read_at_settlement() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;

	h.fees
		.update(FeeConfig {
			protocol: FeeRate::new(PROTOCOL, 50),
			operator: FeeRate::new(OPERATOR, 0),
		})
		.await;
	h.engine
		.bid(buyer.address, &ask, u(1), u(1_000), None, None)
		.await
		.unwrap();

	assert_eq!(h.balance(PROTOCOL).await, u(50));
	assert_eq!(h.balance(OPERATOR).await, U256::ZERO);
	assert_eq!(h.balance(h.seller.address).await, u(950));
}

#[tokio::test]
async fn test_royalty_basis_differs_between_variants() {
	for (variant, royalty, seller) in [("single_unit", 97, 873), ("multi_unit", 100, 870)] {
		let h = Harness::new(variant).await;
		h.assets
			.set_royalty(COLLECTION, FeeRate::new(ARTIST, 100))
			.await;
		let buyer = h.buyer(10_000).await;
		let ask = h.ask(FIXED, 1, fixed(1_000)).await;

		h.engine
			.bid(buyer.address, &ask, u(1), u(1_000), None, None)
			.await
			.unwrap();

		assert_eq!(h.balance(ARTIST).await, u(royalty), "{}", variant);
		assert_eq!(h.balance(h.seller.address).await, u(seller), "{}", variant);
	}
}

#[tokio::test]
async fn test_proceeds_go_to_fee_recipient_override() {
	let h = Harness::new("single_unit").await;
	let buyer = h.buyer(10_000).await;
	let treasury = Address::repeat_byte(0x7e);

	let mut ask = h.unsigned_ask(FIXED, 1, fixed(1_000));
	ask.fee_recipient = Some(treasury);
	let ask = h.sign(ask).await;

	h.engine
		.bid(buyer.address, &ask, u(1), u(1_000), Some(treasury), None)
		.await
		.unwrap();

	assert_eq!(h.balance(treasury).await, u(970));
	assert_eq!(h.balance(h.seller.address).await, U256::ZERO);
	assert_eq!(h.units(treasury).await, u(1));
	assert_eq!(h.units(buyer.address).await, U256::ZERO);
}

#[tokio::test]
async fn test_concurrent_bids_settle_once() {
	let h = Harness::new("single_unit").await;
	let first = h.buyer(10_000).await;
	let second = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;

	let (a, b) = tokio::join!(
		h.engine
			.bid(first.address, &ask, u(1), u(1_000), None, None),
		h.engine
			.bid(second.address, &ask, u(1), u(1_000), None, None),
	);

	assert!(a.is_ok() != b.is_ok());
	assert!(a == Err(ExchangeError::SoldOut) || b == Err(ExchangeError::SoldOut));
	assert_eq!(h.balance(PROTOCOL).await, u(25));
}

/// Memory backend whose fill records cannot be written.
struct FillWritesFail(MemoryStorage);

#[async_trait]
impl StorageInterface for FillWritesFail {
	async fn get_bytes(&self, key: &str) -> std::result::Result<Vec<u8>, StorageError> {
		self.0.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), StorageError> {
		if key.starts_with("fill:") {
			return Err(StorageError::Backend("read-only".to_string()));
		}
		self.0.set_bytes(key, value).await
	}

	async fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
		self.0.delete(key).await
	}

	async fn exists(&self, key: &str) -> std::result::Result<bool, StorageError> {
		self.0.exists(key).await
	}
}

#[tokio::test]
async fn test_failed_commit_unwinds_settlement() {
	let storage = Box::new(FillWritesFail(MemoryStorage::new()));
	let h = Harness::with_storage("single_unit", storage).await;
	let buyer = h.buyer(10_000).await;
	let ask = h.ask(FIXED, 1, fixed(1_000)).await;
	let mut events = h.engine.event_bus().subscribe();

	assert!(matches!(
		h.engine
			.bid(buyer.address, &ask, u(1), u(1_000), None, None)
			.await,
		Err(ExchangeError::Storage(_))
	));

	assert_eq!(h.balance(buyer.address).await, u(10_000));
	assert_eq!(h.balance(h.seller.address).await, U256::ZERO);
	assert_eq!(h.balance(PROTOCOL).await, U256::ZERO);
	assert_eq!(h.units(h.seller.address).await, u(100));
	assert_eq!(h.units(buyer.address).await, U256::ZERO);
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_file_backed_state_survives_rebuild() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = config("multi_unit");
	config.storage = toml::Value::Table(
		[
			("backend".to_string(), toml::Value::String("file".to_string())),
			(
				"path".to_string(),
				toml::Value::String(dir.path().to_string_lossy().to_string()),
			),
		]
		.into_iter()
		.collect(),
	);

	let assets = Arc::new(InMemoryAssets::new());
	let ledger = Arc::new(InMemoryLedger::new());
	let build = |config: ExchangeConfig| {
		ExchangeBuilder::new(config)
			.with_assets(assets.clone())
			.with_ledger(ledger.clone())
			.with_clock(Arc::new(ManualClock::new(START)))
			.build()
			.unwrap()
	};

	let seller = Party::new();
	let buyer = Party::new();
	assets.mint(asset(), seller.address, u(10)).await;
	ledger.mint(CURRENCY, buyer.address, u(1_000)).await;

	let engine = build(config.clone());
	let ask = seller
		.signer
		.sign_ask(AskOrder {
			signer: seller.address,
			delegate: None,
			asset: asset(),
			amount: u(10),
			strategy: FIXED,
			currency: CURRENCY,
			fee_recipient: None,
			deadline: DEADLINE,
			params: fixed(5),
			signature: Bytes::new(),
		})
		.await
		.unwrap();
	engine
		.bid(buyer.address, &ask, u(3), u(5), None, None)
		.await
		.unwrap();
	drop(engine);

	let rebuilt = build(config);
	assert_eq!(
		rebuilt.amount_filled(&rebuilt.ask_hash(&ask)).await.unwrap(),
		u(3)
	);
}

#[test]
fn test_builder_requires_collaborators() {
	assert!(matches!(
		ExchangeBuilder::new(config("single_unit")).build(),
		Err(crate::BuilderError::MissingCollaborator(_))
	));
}

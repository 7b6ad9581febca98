//! The matching engine.
//!
//! Verifies signed asks and bids, consults the ask's sale strategy, settles
//! matches through the settlement service and records per-ask state in the
//! order store. Every public operation runs under a single engine-wide lock
//! and either applies all of its effects or none of them: order store
//! changes are staged, transfers are unwound if the store commit fails, and
//! events are published only after the commit succeeds.

use exchange_settlement::{AssetRegistry, SettlementReceipt, SettlementRequest, SettlementService};
use exchange_signature::StructuredSignature;
use exchange_storage::{OrderStore, OrderStoreTransaction};
use exchange_strategy::{BidContext, ClaimContext, StrategyInterface, StrategyService};
use exchange_types::{
	Address, ApprovalKey, AskOrder, BestBid, BidOrder, Clock, EventBus, ExchangeError,
	ExchangeEvent, ExchangeVariant, FillState, OrderHash, Result, B256, U256,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
mod tests;

/// A bid whose paying principal has been established.
#[derive(Debug, Clone, Copy)]
struct Offer {
	bidder: Address,
	amount: U256,
	price: U256,
	recipient: Address,
	referrer: Option<Address>,
}

/// What an accepted offer did before the store commit.
enum Outcome {
	/// Recorded as the new best bid.
	Recorded { units: U256 },
	/// Settled at once.
	Settled(SettlementReceipt),
}

/// Order matching and settlement for one exchange instance.
pub struct MatchingEngine {
	pub(crate) variant: ExchangeVariant,
	pub(crate) signatures: StructuredSignature,
	pub(crate) strategies: StrategyService,
	pub(crate) store: OrderStore,
	pub(crate) settlement: SettlementService,
	pub(crate) registry: Arc<dyn AssetRegistry>,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) event_bus: EventBus,
	/// Serializes every state-changing operation.
	pub(crate) op_lock: Mutex<()>,
}

impl MatchingEngine {
	pub fn variant(&self) -> ExchangeVariant {
		self.variant
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Canonical identity of an ask.
	pub fn ask_hash(&self, ask: &AskOrder) -> OrderHash {
		self.signatures.ask_hash(ask)
	}

	/// Canonical identity of a bid order.
	pub fn bid_hash(&self, bid: &BidOrder) -> B256 {
		self.signatures.bid_hash(bid)
	}

	/// Whether assets of `contract` may settle through this engine. Assets
	/// the protocol manages itself settle elsewhere.
	pub async fn can_trade(&self, contract: Address) -> bool {
		!self.registry.is_managed_asset(contract).await
	}

	/// Withdraws an ask. Only its signer may cancel, and only while no best
	/// bid is recorded.
	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn cancel(&self, caller: Address, ask: &AskOrder) -> Result<()> {
		let _guard = self.op_lock.lock().await;

		let ask_hash = self.ask_hash(ask);
		if caller != ask.signer {
			return Err(ExchangeError::Forbidden(format!(
				"only the signer {} may cancel",
				ask.signer
			)));
		}

		let mut tx = self.store.transaction();
		tx.cancel(&ask_hash).await?;
		tx.commit().await?;

		info!(ask_hash = %ask_hash, "Ask cancelled");
		self.event_bus
			.publish(ExchangeEvent::Cancel {
				ask_hash,
				signer: ask.signer,
			})
			.ok();
		Ok(())
	}

	/// Bids on `ask` directly, paying from `caller`.
	///
	/// On the multi-unit exchange `price` is per unit and `amount` units are
	/// bought; on the single-unit exchange the whole ask settles at `price`.
	/// The asset goes to `recipient`, or to the caller when absent.
	#[instrument(skip_all, fields(caller = %caller, price = %price, amount = %amount))]
	pub async fn bid(
		&self,
		caller: Address,
		ask: &AskOrder,
		amount: U256,
		price: U256,
		recipient: Option<Address>,
		referrer: Option<Address>,
	) -> Result<()> {
		let _guard = self.op_lock.lock().await;

		let (ask_hash, strategy) = self.authenticate_ask(ask)?;
		let now = self.clock.timestamp();
		self.ensure_fresh(ask, now)?;
		self.ensure_tradeable(ask).await?;

		let offer = Offer {
			bidder: caller,
			amount,
			price,
			recipient: recipient.unwrap_or(caller),
			referrer,
		};

		let mut tx = self.store.transaction();
		let outcome = self
			.execute_offer(&mut tx, ask, ask_hash, strategy, &offer, now)
			.await?;
		self.finish(tx, ask_hash, &offer, outcome).await
	}

	/// Executes a bid order signed by the buyer and submitted on its behalf.
	///
	/// The caller must be the ask's delegate, or the delegate must have
	/// approved exactly this bid order with
	/// [`update_approved_bid_hash`](Self::update_approved_bid_hash). A bid
	/// order settles at most once.
	#[instrument(skip_all, fields(caller = %caller, bidder = %bid.signer))]
	pub async fn bid_with_order(
		&self,
		caller: Address,
		ask: &AskOrder,
		bid: &BidOrder,
	) -> Result<()> {
		let _guard = self.op_lock.lock().await;

		let (ask_hash, strategy) = self.authenticate_ask(ask)?;
		if bid.ask_hash != ask_hash {
			return Err(ExchangeError::Unauthorized(format!(
				"bid order is for ask {}, not {}",
				bid.ask_hash, ask_hash
			)));
		}
		let bid_hash = self.signatures.verify_bid(bid)?;

		let mut tx = self.store.transaction();
		tx.consume_bid(&bid_hash).await?;

		let delegate = ask
			.delegate
			.ok_or_else(|| ExchangeError::Forbidden("ask has no delegate".to_string()))?;
		let approval = ApprovalKey::new(delegate, ask_hash, bid.signer);
		let approved = tx.get_approved_bid_hash(&approval).await?;
		if approved == Some(bid_hash) {
			tx.clear_approved_bid_hash(&approval)?;
		} else if caller != delegate {
			return Err(ExchangeError::Forbidden(format!(
				"{} is neither the delegate nor approved for this bid order",
				caller
			)));
		}

		let now = self.clock.timestamp();
		self.ensure_fresh(ask, now)?;
		self.ensure_tradeable(ask).await?;

		let offer = Offer {
			bidder: bid.signer,
			amount: bid.amount,
			price: bid.price,
			recipient: bid.asset_recipient(),
			referrer: bid.referrer,
		};
		let outcome = self
			.execute_offer(&mut tx, ask, ask_hash, strategy, &offer, now)
			.await?;
		self.finish(tx, ask_hash, &offer, outcome).await
	}

	/// Settles the recorded best bid once the strategy allows it. Anyone may
	/// call this.
	#[instrument(skip_all, fields(caller = %caller))]
	pub async fn claim(&self, caller: Address, ask: &AskOrder) -> Result<()> {
		let _guard = self.op_lock.lock().await;

		let (ask_hash, strategy) = self.authenticate_ask(ask)?;
		let now = self.clock.timestamp();

		let mut tx = self.store.transaction();
		if tx.get_fill(&ask_hash).await?.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}

		let best_bid = tx.get_best_bid(&ask_hash).await?;
		let ctx = ClaimContext {
			now,
			delegate: ask.delegate,
			deadline: ask.deadline,
			params: &ask.params,
			currency: ask.currency,
			best_bid: best_bid.as_ref(),
		};
		let best = match best_bid.as_ref() {
			Some(best) if strategy.can_claim(&ctx) => best.clone(),
			_ => {
				return Err(ExchangeError::Failure(format!(
					"{} strategy does not allow a claim",
					strategy.kind()
				)))
			}
		};

		let offer = Offer {
			bidder: best.bidder,
			amount: best.amount,
			price: best.price,
			recipient: best.recipient,
			referrer: best.referrer,
		};
		let (units, gross) = self.units_and_gross(ask, offer.amount, offer.price)?;
		self.stage_fill(&mut tx, ask, ask_hash, units).await?;
		tx.clear_best_bid(&ask_hash)?;

		let receipt = self
			.settlement
			.settle(self.settlement_request(ask, ask_hash, &offer, units, gross))
			.await?;
		self.finish(tx, ask_hash, &offer, Outcome::Settled(receipt))
			.await
	}

	/// Pins the bid order a third party may execute for `bidder` on `ask`.
	///
	/// Only the ask's delegate may call this. It stays allowed after the ask's
	/// deadline and overwrites any earlier approval.
	#[instrument(skip_all, fields(caller = %caller, bidder = %bidder))]
	pub async fn update_approved_bid_hash(
		&self,
		caller: Address,
		ask: &AskOrder,
		bidder: Address,
		bid_hash: B256,
	) -> Result<()> {
		let _guard = self.op_lock.lock().await;

		let ask_hash = self.signatures.verify_ask(ask)?;
		if !ask.is_delegate(caller) {
			return Err(ExchangeError::Unauthorized(format!(
				"{} is not the delegate of ask {}",
				caller, ask_hash
			)));
		}

		let mut tx = self.store.transaction();
		tx.set_approved_bid_hash(&ApprovalKey::new(caller, ask_hash, bidder), bid_hash)?;
		tx.commit().await?;

		debug!(ask_hash = %ask_hash, bid_hash = %bid_hash, "Approved bid hash updated");
		self.event_bus
			.publish(ExchangeEvent::UpdateApprovedBidHash {
				delegate: caller,
				ask_hash,
				bidder,
				bid_hash,
			})
			.ok();
		Ok(())
	}

	pub async fn best_bid(&self, ask_hash: &OrderHash) -> Result<Option<BestBid>> {
		Ok(self.store.get_best_bid(ask_hash).await?)
	}

	pub async fn fill_state(&self, ask_hash: &OrderHash) -> Result<FillState> {
		Ok(self.store.get_fill(ask_hash).await?)
	}

	/// Cumulative units settled for an ask.
	pub async fn amount_filled(&self, ask_hash: &OrderHash) -> Result<U256> {
		Ok(self.fill_state(ask_hash).await?.amount_filled)
	}

	pub async fn is_cancelled_or_claimed(&self, ask_hash: &OrderHash) -> Result<bool> {
		Ok(self.fill_state(ask_hash).await?.is_cancelled_or_claimed())
	}

	/// Whether the signed bid order with this hash has been used up, either by
	/// settling or by being recorded as an auction's best bid.
	pub async fn is_bid_consumed(&self, bid_hash: &B256) -> Result<bool> {
		Ok(self.store.is_bid_consumed(bid_hash).await?)
	}

	pub async fn approved_bid_hash(
		&self,
		delegate: Address,
		ask_hash: OrderHash,
		bidder: Address,
	) -> Result<Option<B256>> {
		Ok(self
			.store
			.get_approved_bid_hash(&ApprovalKey::new(delegate, ask_hash, bidder))
			.await?)
	}

	/// Checks the ask's signature and shape and resolves its strategy.
	fn authenticate_ask(&self, ask: &AskOrder) -> Result<(OrderHash, &dyn StrategyInterface)> {
		let ask_hash = self.signatures.verify_ask(ask)?;
		if ask.amount.is_zero() {
			return Err(ExchangeError::InvalidOrder(
				"ask amount must be positive".to_string(),
			));
		}
		let strategy = self.strategies.resolve(&ask.strategy).ok_or_else(|| {
			ExchangeError::InvalidOrder(format!("unknown strategy {}", ask.strategy))
		})?;
		Ok((ask_hash, strategy))
	}

	fn ensure_fresh(&self, ask: &AskOrder, now: u64) -> Result<()> {
		if now > ask.deadline {
			return Err(ExchangeError::Expired {
				expired_at: ask.deadline,
			});
		}
		Ok(())
	}

	async fn ensure_tradeable(&self, ask: &AskOrder) -> Result<()> {
		if !self.can_trade(ask.asset.contract).await {
			return Err(ExchangeError::InvalidExchange(ask.asset.contract.to_string()));
		}
		Ok(())
	}

	/// Units that change hands and the total the buyer pays.
	fn units_and_gross(&self, ask: &AskOrder, amount: U256, price: U256) -> Result<(U256, U256)> {
		match self.variant {
			ExchangeVariant::SingleUnit => Ok((ask.amount, price)),
			ExchangeVariant::MultiUnit => {
				if amount.is_zero() {
					return Err(ExchangeError::Failure(
						"bid amount must be positive".to_string(),
					));
				}
				let gross = price.checked_mul(amount).ok_or_else(|| {
					ExchangeError::Failure("price times amount overflows".to_string())
				})?;
				Ok((amount, gross))
			}
		}
	}

	async fn stage_fill(
		&self,
		tx: &mut OrderStoreTransaction<'_>,
		ask: &AskOrder,
		ask_hash: OrderHash,
		units: U256,
	) -> Result<FillState> {
		match self.variant {
			ExchangeVariant::SingleUnit => tx.mark_claimed(&ask_hash, ask.amount).await,
			ExchangeVariant::MultiUnit => tx.add_fill(&ask_hash, ask.amount, units).await,
		}
	}

	fn settlement_request(
		&self,
		ask: &AskOrder,
		ask_hash: OrderHash,
		offer: &Offer,
		units: U256,
		gross: U256,
	) -> SettlementRequest {
		SettlementRequest {
			ask_hash,
			asset: ask.asset,
			currency: ask.currency,
			seller: ask.signer,
			proceeds_recipient: ask.proceeds_recipient(),
			buyer: offer.bidder,
			recipient: offer.recipient,
			units,
			gross,
		}
	}

	/// Runs the strategy and either records the offer as best bid or
	/// settles it. Store changes are staged in `tx`.
	async fn execute_offer(
		&self,
		tx: &mut OrderStoreTransaction<'_>,
		ask: &AskOrder,
		ask_hash: OrderHash,
		strategy: &dyn StrategyInterface,
		offer: &Offer,
		now: u64,
	) -> Result<Outcome> {
		let fill = tx.get_fill(&ask_hash).await?;
		if fill.is_cancelled_or_claimed() {
			return Err(ExchangeError::SoldOut);
		}

		let (units, gross) = self.units_and_gross(ask, offer.amount, offer.price)?;
		if units > fill.remaining(ask.amount) {
			return Err(ExchangeError::SoldOut);
		}

		let best_bid = tx.get_best_bid(&ask_hash).await?;
		let ctx = BidContext {
			now,
			delegate: ask.delegate,
			deadline: ask.deadline,
			params: &ask.params,
			currency: ask.currency,
			price: offer.price,
			bidder: offer.bidder,
			amount: units,
			recipient: offer.recipient,
			best_bid: best_bid.as_ref(),
		};
		if !strategy.can_bid(&ctx) {
			return Err(ExchangeError::Failure(format!(
				"{} strategy rejected the bid",
				strategy.kind()
			)));
		}

		if !strategy.settles_immediately() {
			tx.set_best_bid(
				&ask_hash,
				BestBid {
					bidder: offer.bidder,
					amount: units,
					price: offer.price,
					recipient: offer.recipient,
					referrer: offer.referrer,
					recorded_at_block: self.clock.block_number(),
				},
			)
			.await?;
			return Ok(Outcome::Recorded { units });
		}

		self.stage_fill(tx, ask, ask_hash, units).await?;
		let receipt = self
			.settlement
			.settle(self.settlement_request(ask, ask_hash, offer, units, gross))
			.await?;
		Ok(Outcome::Settled(receipt))
	}

	/// Commits staged store changes and publishes the resulting event. A
	/// settlement is unwound if the commit fails.
	async fn finish(
		&self,
		tx: OrderStoreTransaction<'_>,
		ask_hash: OrderHash,
		offer: &Offer,
		outcome: Outcome,
	) -> Result<()> {
		if let Err(e) = tx.commit().await {
			error!(ask_hash = %ask_hash, error = %e, "Failed to commit order state");
			if let Outcome::Settled(receipt) = &outcome {
				warn!(ask_hash = %ask_hash, "Unwinding settlement");
				self.settlement.unwind(receipt).await;
			}
			return Err(e.into());
		}

		let event = match outcome {
			Outcome::Recorded { units } => {
				info!(
					ask_hash = %ask_hash,
					bidder = %offer.bidder,
					price = %offer.price,
					amount = %units,
					"Best bid recorded"
				);
				ExchangeEvent::Bid {
					ask_hash,
					bidder: offer.bidder,
					amount: units,
					price: offer.price,
					recipient: offer.recipient,
					referrer: offer.referrer,
				}
			}
			Outcome::Settled(receipt) => {
				info!(
					ask_hash = %ask_hash,
					bidder = %offer.bidder,
					price = %offer.price,
					amount = %receipt.request.units,
					"Match settled"
				);
				ExchangeEvent::Claim {
					ask_hash,
					bidder: offer.bidder,
					amount: receipt.request.units,
					price: offer.price,
					recipient: offer.recipient,
					referrer: offer.referrer,
				}
			}
		};
		self.event_bus.publish(event).ok();
		Ok(())
	}
}

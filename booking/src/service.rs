//! Checkout orchestration over the three aggregate stores.
//!
//! The service owns the booking, schedule, and wallet stores plus the
//! gateway adapters, and sequences the multi-aggregate flows: placing an
//! order, routing a payment, reconciling callbacks, and the wallet
//! debit-settle-refund path. Reducers stay pure; every cross-aggregate
//! decision lives here, and no store lock is ever held across a call into
//! another store.
//!
//! Because `Store::send` runs the reducer synchronously under the write
//! lock, the service can read the resulting state right after `send`
//! returns. That is the request/response pattern used throughout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cinebook_core::environment::Clock;
use cinebook_runtime::Store;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregates::{
    BookingAction, BookingEnvironment, BookingReducer, ScheduleAction, ScheduleEnvironment,
    ScheduleReducer, WalletAction, WalletEnvironment, WalletReducer,
};
use crate::config::Config;
use crate::error::BookingError;
use crate::gateway::{
    AppAck, BankAck, BankAdapter, GatewayKind, MobiPayAdapter, OrderRef, SettlementEvent,
    SettlementOutcome, ZenPayAdapter,
};
use crate::types::{
    BookingReject, BookingState, Catalog, CustomerId, Money, Order, OrderId, OrderStatus,
    ScheduleState, SeatId, SettlementDisposition, SettlementFailure, ShowtimeId, WalletId,
    WalletState,
};

/// Store for the Booking aggregate
pub type BookingStore = Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>;
/// Store for the Schedule aggregate
pub type ScheduleStore = Store<ScheduleState, ScheduleAction, ScheduleEnvironment, ScheduleReducer>;
/// Store for the Wallet aggregate
pub type WalletStore = Store<WalletState, WalletAction, WalletEnvironment, WalletReducer>;

/// Checkout service: the public surface of the booking engine
#[derive(Clone)]
pub struct CheckoutService {
    booking: BookingStore,
    schedule: ScheduleStore,
    wallet: WalletStore,
    bank: BankAdapter,
    mobipay: MobiPayAdapter,
    zenpay: ZenPayAdapter,
    clock: Arc<dyn Clock>,
}

impl CheckoutService {
    /// Builds the service and its three stores from configuration
    #[must_use]
    pub fn new(config: &Config, catalog: Arc<Catalog>, clock: Arc<dyn Clock>) -> Self {
        let booking_env =
            BookingEnvironment::new(Arc::clone(&clock), Arc::clone(&catalog), config.hold_ttl);
        let schedule_env = ScheduleEnvironment::new();
        let wallet_env = WalletEnvironment::new(Arc::clone(&clock), config.pin_salt.clone());

        // The schedule aggregate starts from the catalog's calendar so that
        // ticket-driven freezes land on real showtimes.
        let schedule_state = ScheduleState {
            showtimes: catalog.showtimes.clone(),
            ..ScheduleState::new()
        };

        Self {
            booking: Store::new(BookingState::new(), BookingReducer::new(), booking_env),
            schedule: Store::new(schedule_state, ScheduleReducer::new(), schedule_env),
            wallet: Store::new(WalletState::new(), WalletReducer::new(), wallet_env),
            bank: BankAdapter::new(config.bank_secret.clone()),
            mobipay: MobiPayAdapter::new(config.mobipay_key.clone()),
            zenpay: ZenPayAdapter::new(config.zenpay_key.clone()),
            clock,
        }
    }

    /// The booking store, for tests and background tasks
    #[must_use]
    pub const fn booking_store(&self) -> &BookingStore {
        &self.booking
    }

    /// The schedule store
    #[must_use]
    pub const fn schedule_store(&self) -> &ScheduleStore {
        &self.schedule
    }

    /// The wallet store
    #[must_use]
    pub const fn wallet_store(&self) -> &WalletStore {
        &self.wallet
    }

    /// Places an order: prices the seats, claims them, starts the hold
    /// timer.
    ///
    /// # Errors
    ///
    /// [`BookingError::SeatsTaken`] when another order holds any requested
    /// seat, [`BookingError::Rejected`] for the other validation failures.
    pub async fn place_order(
        &self,
        customer_id: CustomerId,
        showtime_id: ShowtimeId,
        seat_ids: Vec<SeatId>,
        voucher_code: Option<String>,
    ) -> Result<Order, BookingError> {
        let order_id = OrderId::new();
        self.booking
            .send(BookingAction::PlaceOrder {
                order_id,
                customer_id,
                showtime_id,
                seat_ids,
                voucher_code,
            })
            .await?;

        self.booking
            .state(|state| match state.get(&order_id) {
                Some(order) => Ok(order.clone()),
                None => match state.rejections.get(&order_id) {
                    Some(BookingReject::SeatsTaken { seats }) => Err(BookingError::SeatsTaken {
                        showtime_id,
                        seats: seats.clone(),
                    }),
                    Some(reject) => Err(BookingError::Rejected {
                        order_id,
                        reject: reject.clone(),
                    }),
                    None => Err(BookingError::OrderNotFound(order_id)),
                },
            })
            .await
    }

    /// Starts payment on an external gateway, returning the order and the
    /// correlation id the redirect must carry (app-trans-id gateways only).
    ///
    /// # Errors
    ///
    /// [`BookingError::Rejected`] when the order is not payable or not
    /// owned by the caller.
    pub async fn start_gateway_payment(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        gateway: GatewayKind,
    ) -> Result<(Order, Option<String>), BookingError> {
        let app_trans_id = gateway
            .uses_app_trans_id()
            .then(|| self.new_app_trans_id());
        self.booking
            .send(BookingAction::StartGatewayPayment {
                order_id,
                customer_id,
                gateway,
                app_trans_id: app_trans_id.clone(),
            })
            .await?;

        self.booking
            .state(|state| {
                let Some(order) = state.get(&order_id) else {
                    return Err(BookingError::OrderNotFound(order_id));
                };
                if order.status == OrderStatus::AwaitingPayment && order.gateway == Some(gateway) {
                    Ok((order.clone(), app_trans_id.clone()))
                } else if let Some(reject) = state.rejections.get(&order_id) {
                    Err(BookingError::Rejected {
                        order_id,
                        reject: reject.clone(),
                    })
                } else {
                    Err(BookingError::InvalidOrderState {
                        order_id,
                        status: order.status.to_string(),
                        operation: "start payment",
                    })
                }
            })
            .await
    }

    /// Handles a bank gateway callback and always produces an ack.
    ///
    /// Verification failures never touch booking state; everything else is
    /// routed through the settlement log, so a retried callback gets the
    /// identical ack.
    pub async fn handle_bank_callback(&self, params: &HashMap<String, String>) -> BankAck {
        let settlement = match self.bank.verify_callback(params) {
            Ok(settlement) => settlement,
            Err(BookingError::InvalidSignature { .. }) => {
                warn!("bank callback failed signature verification");
                return BankAck::invalid_signature();
            },
            Err(err) => {
                warn!(error = %err, "bank callback malformed");
                return BankAck::order_not_found();
            },
        };

        match self.apply_settlement(settlement).await {
            Some(SettlementDisposition::Confirmed { .. }) => BankAck::recorded(),
            Some(SettlementDisposition::Failed { cause, .. }) => match cause {
                SettlementFailure::AmountMismatch { .. } => BankAck::invalid_amount(),
                // A verified failure callback is still a recorded fact.
                SettlementFailure::GatewayDeclined => BankAck::recorded(),
            },
            Some(SettlementDisposition::AlreadySettled { .. }) => BankAck::already_settled(),
            Some(SettlementDisposition::Ignored) | None => BankAck::order_not_found(),
        }
    }

    /// Handles a MobiPay callback and always produces an ack
    pub async fn handle_mobipay_callback(&self, body: &str) -> AppAck {
        match self.mobipay.verify_callback(body) {
            Ok(settlement) => self.app_ack(settlement).await,
            Err(BookingError::InvalidSignature { .. }) => AppAck::invalid_mac(),
            Err(_) => AppAck::unknown_transaction(),
        }
    }

    /// Handles a ZenPay callback and always produces an ack
    pub async fn handle_zenpay_callback(&self, body: &str) -> AppAck {
        match self.zenpay.verify_callback(body) {
            Ok(settlement) => self.app_ack(settlement).await,
            Err(BookingError::InvalidSignature { .. }) => AppAck::invalid_mac(),
            Err(_) => AppAck::unknown_transaction(),
        }
    }

    /// Pays an order from the customer's wallet.
    ///
    /// Debits first, then applies the settlement to the order. If the order
    /// cannot confirm after the money moved (it expired or was cancelled in
    /// between), the debit is reversed with an offsetting credit.
    ///
    /// # Errors
    ///
    /// [`BookingError::Wallet`] when the debit is rejected (wrong PIN,
    /// insufficient funds, duplicate reference), plus the usual order-state
    /// errors.
    pub async fn pay_with_wallet(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        wallet_id: WalletId,
        pin: String,
    ) -> Result<Order, BookingError> {
        let (order, _) = self
            .start_gateway_payment(order_id, customer_id, GatewayKind::Wallet)
            .await?;
        let amount = order.total_amount;

        let reference = format!("order:{order_id}");
        self.wallet
            .send(WalletAction::Debit {
                wallet_id,
                amount,
                pin,
                reference_code: reference.clone(),
            })
            .await?;

        let debit_reject = self
            .wallet
            .state(|state| state.rejections.get(&reference).cloned())
            .await;
        if let Some(reject) = debit_reject {
            return Err(BookingError::Wallet(reject));
        }

        let settlement = SettlementEvent {
            gateway: GatewayKind::Wallet,
            order_ref: OrderRef::Direct(order_id),
            outcome: SettlementOutcome::Success,
            amount,
            gateway_txn_id: reference.clone(),
        };
        let disposition = self.apply_settlement(settlement).await;

        if matches!(disposition, Some(SettlementDisposition::Confirmed { .. })) {
            return self
                .booking
                .state(|state| {
                    state
                        .get(&order_id)
                        .cloned()
                        .ok_or(BookingError::OrderNotFound(order_id))
                })
                .await;
        }

        // Money moved but the order did not confirm: reverse the debit.
        warn!(order_id = %order_id, "wallet debit reversed, order did not confirm");
        self.wallet
            .send(WalletAction::Credit {
                wallet_id,
                amount,
                reference_code: format!("refund:{reference}"),
            })
            .await?;
        let status = self
            .booking
            .state(|state| state.get(&order_id).map(|o| o.status.to_string()))
            .await
            .unwrap_or_else(|| "unknown".into());
        Err(BookingError::InvalidOrderState {
            order_id,
            status,
            operation: "settle wallet payment",
        })
    }

    /// Cancels a held or awaiting-payment order.
    ///
    /// # Errors
    ///
    /// [`BookingError::Rejected`] when the order is terminal or owned by
    /// someone else.
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<(), BookingError> {
        self.booking
            .send(BookingAction::CancelOrder {
                order_id,
                customer_id,
            })
            .await?;
        self.booking
            .state(|state| match state.get(&order_id).map(|o| &o.status) {
                Some(OrderStatus::Failed { .. }) => Ok(()),
                _ => match state.rejections.get(&order_id) {
                    Some(reject) => Err(BookingError::Rejected {
                        order_id,
                        reject: reject.clone(),
                    }),
                    None => Err(BookingError::OrderNotFound(order_id)),
                },
            })
            .await
    }

    /// Current snapshot of an order, if it exists
    pub async fn order_status(&self, order_id: OrderId) -> Option<Order> {
        self.booking
            .state(|state| state.get(&order_id).cloned())
            .await
    }

    /// Tickets issued for an order
    pub async fn tickets(&self, order_id: OrderId) -> Vec<crate::types::Ticket> {
        self.booking
            .state(|state| {
                state
                    .tickets_for(&order_id)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Gracefully shuts down all three stores.
    ///
    /// # Errors
    ///
    /// Propagates the first [`cinebook_runtime::StoreError`] from a store
    /// whose effects do not drain in time.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), BookingError> {
        self.booking.shutdown(timeout).await?;
        self.schedule.shutdown(timeout).await?;
        self.wallet.shutdown(timeout).await?;
        Ok(())
    }

    /// Sends a settlement into the booking store and reads back the
    /// disposition recorded for its correlation key.
    async fn apply_settlement(
        &self,
        settlement: SettlementEvent,
    ) -> Option<SettlementDisposition> {
        let key = settlement.correlation_key();
        let amount: Money = settlement.amount;
        info!(key = %key, amount = %amount, "applying settlement");
        if self
            .booking
            .send(BookingAction::ApplySettlement { settlement })
            .await
            .is_err()
        {
            return None;
        }

        let disposition = self
            .booking
            .state(|state| state.settlement_log.get(&key).cloned())
            .await;

        // Freezing the showtime is cross-aggregate and happens after the
        // booking transition is durable.
        if let Some(SettlementDisposition::Confirmed { order_id }) = &disposition {
            let showtime_id = self
                .booking
                .state(|state| state.get(order_id).map(|o| o.showtime_id))
                .await;
            if let Some(showtime_id) = showtime_id {
                let _ = self
                    .schedule
                    .send(ScheduleAction::MarkTicketed { showtime_id })
                    .await;
            }
        }
        disposition
    }

    async fn app_ack(&self, settlement: SettlementEvent) -> AppAck {
        match self.apply_settlement(settlement).await {
            Some(SettlementDisposition::Confirmed { .. }) => AppAck::recorded(),
            Some(SettlementDisposition::Failed { cause, .. }) => match cause {
                SettlementFailure::AmountMismatch { .. } => AppAck::invalid_amount(),
                SettlementFailure::GatewayDeclined => AppAck::recorded(),
            },
            Some(SettlementDisposition::AlreadySettled { .. }) => AppAck::already_settled(),
            Some(SettlementDisposition::Ignored) | None => AppAck::unknown_transaction(),
        }
    }

    /// Fresh correlation id for app-trans-id gateways: date prefix plus a
    /// random suffix, matching the `yymmdd_xxxx` shape those gateways
    /// require.
    fn new_app_trans_id(&self) -> String {
        let date = self.clock.now().format("%y%m%d");
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{date}_{}", &suffix[..12])
    }
}

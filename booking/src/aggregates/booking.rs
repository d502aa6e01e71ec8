//! Booking aggregate: the pending-order saga.
//!
//! Owns orders, seat claims, tickets, and the settlement log. The lifecycle
//! is `Draft → SeatsHeld → AwaitingPayment → Confirmed | Failed | Expired`;
//! the three right-hand states are terminal and nothing moves an order out
//! of them. Settlements apply compare-and-set style: the status is checked
//! inside the reducer, under the store's write lock, so a late callback and
//! an expiry sweep can never both win.
//!
//! Seat exclusivity rests on the `claims` map. The claim check and insert
//! happen in the same `reduce` call, which the store serializes, so exactly
//! one of two racing orders for a seat gets it.

use cinebook_core::environment::Clock;
use cinebook_core::reducer::{Effects, Reducer};
use cinebook_core::{Effect, smallvec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::gateway::{GatewayKind, OrderRef, SettlementEvent, SettlementOutcome};
use crate::pricing::{self, VoucherUsage};
use crate::types::{
    BookingReject, BookingState, Catalog, CustomerId, Order, OrderId, OrderStatus, PendingOrder,
    Seat, SeatId, SettlementDisposition, SettlementFailure, ShowtimeId, Ticket, TicketId,
};

/// Actions for the Booking aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BookingAction {
    // Commands
    /// Place an order: price the seats and claim them atomically
    PlaceOrder {
        /// Pre-allocated order id
        order_id: OrderId,
        /// The purchasing customer
        customer_id: CustomerId,
        /// Showtime the seats are for
        showtime_id: ShowtimeId,
        /// Requested seats
        seat_ids: Vec<SeatId>,
        /// Optional voucher code; inapplicable codes do not block the order
        voucher_code: Option<String>,
    },
    /// Move a held order to `AwaitingPayment` on the chosen gateway
    StartGatewayPayment {
        /// The order
        order_id: OrderId,
        /// Caller identity, checked against the order
        customer_id: CustomerId,
        /// Payment channel
        gateway: GatewayKind,
        /// Correlation id for app-trans-id gateways
        app_trans_id: Option<String>,
    },
    /// Apply a verified settlement to whatever order it resolves to
    ApplySettlement {
        /// The signature-verified settlement
        settlement: SettlementEvent,
    },
    /// Customer-initiated cancellation of a non-terminal order
    CancelOrder {
        /// The order
        order_id: OrderId,
        /// Caller identity, checked against the order
        customer_id: CustomerId,
    },
    /// Expire one order whose hold has lapsed (fired by the hold timer)
    ExpireOrder {
        /// The order
        order_id: OrderId,
    },
    /// Expire every order whose hold has lapsed (periodic sweep)
    SweepExpired,

    // Events
    /// An order was created in `Draft`
    OrderPlaced {
        /// The full order
        order: Box<Order>,
    },
    /// Seats were claimed; the order moved to `SeatsHeld`
    SeatsClaimed {
        /// The order
        order_id: OrderId,
        /// The showtime
        showtime_id: ShowtimeId,
        /// Claimed seats
        seat_ids: Vec<SeatId>,
    },
    /// A booking command was rejected
    OrderRejected {
        /// The order the rejection belongs to
        order_id: OrderId,
        /// Why
        reject: BookingReject,
    },
    /// Payment started; order moved to `AwaitingPayment`
    PaymentStarted {
        /// The order
        order_id: OrderId,
        /// Chosen gateway
        gateway: GatewayKind,
        /// Staging record for app-trans-id gateways
        pending: Option<PendingOrder>,
    },
    /// Settlement verified and matched; order confirmed, tickets issued
    OrderConfirmed {
        /// The order
        order_id: OrderId,
        /// Issued tickets
        tickets: Vec<Ticket>,
        /// When the settlement was applied
        settled_at: DateTime<Utc>,
    },
    /// Order terminated; seats released
    OrderFailed {
        /// The order
        order_id: OrderId,
        /// Why
        reason: String,
    },
    /// Hold lapsed; seats released
    OrderExpired {
        /// The order
        order_id: OrderId,
    },
    /// A settlement disposition was recorded for a correlation key
    SettlementRecorded {
        /// Correlation key of the callback
        key: String,
        /// The recorded disposition
        disposition: SettlementDisposition,
    },
}

/// Environment for the Booking aggregate
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for hold expiry and settlement timestamps
    pub clock: Arc<dyn Clock>,
    /// Read-only catalog snapshot
    pub catalog: Arc<Catalog>,
    /// How long seats stay held before expiring
    pub hold_ttl: Duration,
}

impl BookingEnvironment {
    /// Creates an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, catalog: Arc<Catalog>, hold_ttl: Duration) -> Self {
        Self {
            clock,
            catalog,
            hold_ttl,
        }
    }
}

/// Reducer for the Booking aggregate
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut BookingState,
        order_id: OrderId,
        reject: BookingReject,
    ) -> Effects<BookingAction> {
        warn!(order_id = %order_id, reject = ?reject, "booking command rejected");
        state.last_error = Some(format!("{reject:?}"));
        apply_event(state, &BookingAction::OrderRejected { order_id, reject });
        smallvec![Effect::None]
    }

    fn place_order(
        state: &mut BookingState,
        env: &BookingEnvironment,
        order_id: OrderId,
        customer_id: CustomerId,
        showtime_id: ShowtimeId,
        seat_ids: Vec<SeatId>,
        voucher_code: Option<&str>,
    ) -> Effects<BookingAction> {
        if state.orders.contains_key(&order_id) {
            return Self::reject(
                state,
                order_id,
                BookingReject::InvalidState {
                    detail: format!("order {order_id} already exists"),
                },
            );
        }
        if seat_ids.is_empty() {
            return Self::reject(state, order_id, BookingReject::EmptySeatSelection);
        }
        let Some(showtime) = env.catalog.showtimes.get(&showtime_id) else {
            return Self::reject(state, order_id, BookingReject::UnknownShowtime);
        };

        let mut seats: Vec<&Seat> = Vec::with_capacity(seat_ids.len());
        for seat_id in &seat_ids {
            match env.catalog.seats.get(seat_id) {
                Some(seat) if seat.room_id == showtime.room_id => seats.push(seat),
                _ => {
                    return Self::reject(
                        state,
                        order_id,
                        BookingReject::InvalidSeat { seat_id: *seat_id },
                    );
                },
            }
        }

        // The exclusivity check: runs under the store's write lock together
        // with the claim insert below.
        let taken: Vec<SeatId> = seat_ids
            .iter()
            .copied()
            .filter(|seat_id| state.is_claimed(showtime_id, *seat_id))
            .collect();
        if !taken.is_empty() {
            return Self::reject(state, order_id, BookingReject::SeatsTaken { seats: taken });
        }

        let breakdown = match pricing::price_order(
            &env.catalog,
            showtime,
            &seats,
            customer_id,
            voucher_code,
            |voucher| VoucherUsage {
                redemptions: state
                    .voucher_redemptions
                    .get(&voucher.id)
                    .copied()
                    .unwrap_or(0),
                used_by_customer: state.consumed_vouchers.contains(&(voucher.id, customer_id)),
            },
        ) {
            Ok(breakdown) => breakdown,
            Err(pricing::PricingError::MissingPriceRow {
                seat_kind,
                room_kind,
            }) => {
                return Self::reject(
                    state,
                    order_id,
                    BookingReject::PricingNotConfigured {
                        seat_kind,
                        room_kind,
                    },
                );
            },
            Err(err) => {
                return Self::reject(
                    state,
                    order_id,
                    BookingReject::InvalidState {
                        detail: err.to_string(),
                    },
                );
            },
        };

        let now = env.clock.now();
        let expires_at = now
            + chrono::Duration::from_std(env.hold_ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        let order = Order {
            id: order_id,
            customer_id,
            showtime_id,
            seats: seat_ids.clone(),
            voucher: breakdown.voucher.applied_voucher(),
            total_amount: breakdown.total,
            pricing: breakdown,
            status: OrderStatus::Draft,
            gateway: None,
            correlation: None,
            expires_at,
            created_at: now,
        };

        state.last_error = None;
        info!(order_id = %order_id, total = %order.total_amount, "order placed");
        apply_event(state, &BookingAction::OrderPlaced {
            order: Box::new(order),
        });
        apply_event(state, &BookingAction::SeatsClaimed {
            order_id,
            showtime_id,
            seat_ids,
        });

        // Hold timer: fires once, and the expiry handler no-ops on any
        // order that already reached a terminal state.
        smallvec![Effect::Delay {
            duration: env.hold_ttl,
            action: Box::new(BookingAction::ExpireOrder { order_id }),
        }]
    }

    fn start_payment(
        state: &mut BookingState,
        order_id: OrderId,
        customer_id: CustomerId,
        gateway: GatewayKind,
        app_trans_id: Option<String>,
    ) -> Effects<BookingAction> {
        let Some(order) = state.orders.get(&order_id) else {
            return Self::reject(
                state,
                order_id,
                BookingReject::InvalidState {
                    detail: format!("order {order_id} not found"),
                },
            );
        };
        if order.customer_id != customer_id {
            return Self::reject(state, order_id, BookingReject::NotOwner);
        }
        // Re-entry from AwaitingPayment lets the customer switch gateways
        // before any settlement lands.
        if !matches!(order.status, OrderStatus::SeatsHeld | OrderStatus::AwaitingPayment) {
            return Self::reject(
                state,
                order_id,
                BookingReject::InvalidState {
                    detail: format!("order is {}, cannot start payment", order.status),
                },
            );
        }

        let pending = if gateway.uses_app_trans_id() {
            let Some(app_trans_id) = app_trans_id else {
                return Self::reject(
                    state,
                    order_id,
                    BookingReject::InvalidState {
                        detail: format!("{gateway} requires an app transaction id"),
                    },
                );
            };
            Some(PendingOrder {
                app_trans_id,
                order_id,
                amount: order.total_amount,
                expires_at: order.expires_at,
            })
        } else {
            None
        };

        state.last_error = None;
        info!(order_id = %order_id, gateway = %gateway, "payment started");
        apply_event(state, &BookingAction::PaymentStarted {
            order_id,
            gateway,
            pending,
        });
        smallvec![Effect::None]
    }

    #[allow(clippy::too_many_lines)]
    fn apply_settlement(
        state: &mut BookingState,
        env: &BookingEnvironment,
        settlement: &SettlementEvent,
    ) -> Effects<BookingAction> {
        let key = settlement.correlation_key();

        // Gateways retry until acknowledged; the first disposition stands
        // and duplicates change nothing.
        if state.settlement_log.contains_key(&key) {
            info!(key = %key, "duplicate settlement callback, replaying disposition");
            return smallvec![Effect::None];
        }

        let order_id = match &settlement.order_ref {
            OrderRef::Direct(order_id) => {
                if state.orders.contains_key(order_id) {
                    Some(*order_id)
                } else {
                    None
                }
            },
            OrderRef::AppTransId(app_trans_id) => {
                state.pending.get(app_trans_id).map(|p| p.order_id)
            },
        };
        let Some(order_id) = order_id else {
            warn!(key = %key, "settlement for unknown order reference");
            apply_event(state, &BookingAction::SettlementRecorded {
                key,
                disposition: SettlementDisposition::Ignored,
            });
            return smallvec![Effect::None];
        };
        let Some(order) = state.orders.get(&order_id) else {
            apply_event(state, &BookingAction::SettlementRecorded {
                key,
                disposition: SettlementDisposition::Ignored,
            });
            return smallvec![Effect::None];
        };

        // Compare-and-set: a terminal order absorbs late callbacks.
        if order.status.is_terminal() {
            info!(order_id = %order_id, status = %order.status, "settlement after terminal state");
            apply_event(state, &BookingAction::SettlementRecorded {
                key,
                disposition: SettlementDisposition::AlreadySettled { order_id },
            });
            return smallvec![Effect::None];
        }
        if !order.status.is_payable() {
            // Callback before payment started; nothing to settle against.
            apply_event(state, &BookingAction::SettlementRecorded {
                key,
                disposition: SettlementDisposition::Ignored,
            });
            return smallvec![Effect::None];
        }

        if settlement.amount != order.total_amount {
            let cause = SettlementFailure::AmountMismatch {
                expected: order.total_amount,
                actual: settlement.amount,
            };
            warn!(order_id = %order_id, cause = %cause, "settlement rejected");
            apply_event(state, &BookingAction::OrderFailed {
                order_id,
                reason: cause.to_string(),
            });
            apply_event(state, &BookingAction::SettlementRecorded {
                key,
                disposition: SettlementDisposition::Failed { order_id, cause },
            });
            return smallvec![Effect::None];
        }

        match settlement.outcome {
            SettlementOutcome::Failure => {
                apply_event(state, &BookingAction::OrderFailed {
                    order_id,
                    reason: format!("{} reported payment failure", settlement.gateway),
                });
                apply_event(state, &BookingAction::SettlementRecorded {
                    key,
                    disposition: SettlementDisposition::Failed {
                        order_id,
                        cause: SettlementFailure::GatewayDeclined,
                    },
                });
            },
            SettlementOutcome::Success => {
                let tickets: Vec<Ticket> = order
                    .seats
                    .iter()
                    .map(|seat_id| Ticket {
                        id: TicketId::new(),
                        showtime_id: order.showtime_id,
                        seat_id: *seat_id,
                        order_id,
                    })
                    .collect();
                info!(order_id = %order_id, tickets = tickets.len(), "order confirmed");
                apply_event(state, &BookingAction::OrderConfirmed {
                    order_id,
                    tickets,
                    settled_at: env.clock.now(),
                });
                apply_event(state, &BookingAction::SettlementRecorded {
                    key,
                    disposition: SettlementDisposition::Confirmed { order_id },
                });
            },
        }
        smallvec![Effect::None]
    }

    fn cancel_order(
        state: &mut BookingState,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Effects<BookingAction> {
        let Some(order) = state.orders.get(&order_id) else {
            return Self::reject(
                state,
                order_id,
                BookingReject::InvalidState {
                    detail: format!("order {order_id} not found"),
                },
            );
        };
        if order.customer_id != customer_id {
            return Self::reject(state, order_id, BookingReject::NotOwner);
        }
        if !order.status.is_cancellable() {
            return Self::reject(
                state,
                order_id,
                BookingReject::InvalidState {
                    detail: format!("order is {}, cannot cancel", order.status),
                },
            );
        }

        state.last_error = None;
        info!(order_id = %order_id, "order cancelled");
        apply_event(state, &BookingAction::OrderFailed {
            order_id,
            reason: "cancelled by customer".into(),
        });
        smallvec![Effect::None]
    }

    fn expire_order(
        state: &mut BookingState,
        env: &BookingEnvironment,
        order_id: OrderId,
    ) -> Effects<BookingAction> {
        let Some(order) = state.orders.get(&order_id) else {
            return smallvec![Effect::None];
        };
        // Terminal orders absorb the timer firing after settlement.
        if order.status.is_terminal() {
            return smallvec![Effect::None];
        }
        if env.clock.now() < order.expires_at {
            return smallvec![Effect::None];
        }
        info!(order_id = %order_id, "order expired");
        apply_event(state, &BookingAction::OrderExpired { order_id });
        smallvec![Effect::None]
    }

    fn sweep_expired(state: &mut BookingState, env: &BookingEnvironment) -> Effects<BookingAction> {
        let now = env.clock.now();
        let lapsed: Vec<OrderId> = state
            .orders
            .values()
            .filter(|o| !o.status.is_terminal() && o.expires_at <= now)
            .map(|o| o.id)
            .collect();
        if !lapsed.is_empty() {
            info!(count = lapsed.len(), "expiry sweep releasing lapsed holds");
        }
        for order_id in lapsed {
            apply_event(state, &BookingAction::OrderExpired { order_id });
        }
        smallvec![Effect::None]
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            BookingAction::PlaceOrder {
                order_id,
                customer_id,
                showtime_id,
                seat_ids,
                voucher_code,
            } => Self::place_order(
                state,
                env,
                order_id,
                customer_id,
                showtime_id,
                seat_ids,
                voucher_code.as_deref(),
            ),
            BookingAction::StartGatewayPayment {
                order_id,
                customer_id,
                gateway,
                app_trans_id,
            } => Self::start_payment(state, order_id, customer_id, gateway, app_trans_id),
            BookingAction::ApplySettlement { settlement } => {
                Self::apply_settlement(state, env, &settlement)
            },
            BookingAction::CancelOrder {
                order_id,
                customer_id,
            } => Self::cancel_order(state, order_id, customer_id),
            BookingAction::ExpireOrder { order_id } => Self::expire_order(state, env, order_id),
            BookingAction::SweepExpired => Self::sweep_expired(state, env),

            event @ (BookingAction::OrderPlaced { .. }
            | BookingAction::SeatsClaimed { .. }
            | BookingAction::OrderRejected { .. }
            | BookingAction::PaymentStarted { .. }
            | BookingAction::OrderConfirmed { .. }
            | BookingAction::OrderFailed { .. }
            | BookingAction::OrderExpired { .. }
            | BookingAction::SettlementRecorded { .. }) => {
                apply_event(state, &event);
                smallvec![Effect::None]
            },
        }
    }
}

/// Releases an order's seat claims and pending staging records
fn release_order(state: &mut BookingState, order_id: OrderId) {
    if let Some(order) = state.orders.get(&order_id) {
        let showtime_id = order.showtime_id;
        let seats = order.seats.clone();
        for seat_id in seats {
            // Only drop claims this order actually owns.
            if state.claims.get(&(showtime_id, seat_id)) == Some(&order_id) {
                state.claims.remove(&(showtime_id, seat_id));
            }
        }
        // Every staging record for the order goes, not just the one the
        // current correlation points at.
        state.pending.retain(|_, p| p.order_id != order_id);
    }
}

/// Folds an event into state. Deterministic, no validation.
#[allow(clippy::too_many_lines)]
fn apply_event(state: &mut BookingState, event: &BookingAction) {
    match event {
        BookingAction::OrderPlaced { order } => {
            state.orders.insert(order.id, (**order).clone());
        },
        BookingAction::SeatsClaimed {
            order_id,
            showtime_id,
            seat_ids,
        } => {
            for seat_id in seat_ids {
                state.claims.insert((*showtime_id, *seat_id), *order_id);
            }
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = OrderStatus::SeatsHeld;
            }
        },
        BookingAction::OrderRejected { order_id, reject } => {
            state.rejections.insert(*order_id, reject.clone());
        },
        BookingAction::PaymentStarted {
            order_id,
            gateway,
            pending,
        } => {
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = OrderStatus::AwaitingPayment;
                order.gateway = Some(*gateway);
                // A gateway switch retires the superseded staging record.
                let previous = order.correlation.take();
                order.correlation = pending.as_ref().map(|p| p.app_trans_id.clone());
                if let Some(stale) = previous {
                    state.pending.remove(&stale);
                }
            }
            if let Some(pending) = pending {
                state.pending.insert(pending.app_trans_id.clone(), pending.clone());
            }
        },
        BookingAction::OrderConfirmed {
            order_id, tickets, ..
        } => {
            let mut voucher = None;
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = OrderStatus::Confirmed;
                voucher = order.voucher.map(|v| (v, order.customer_id));
            }
            state.pending.retain(|_, p| p.order_id != *order_id);
            for ticket in tickets {
                state.tickets.insert(ticket.id, ticket.clone());
            }
            // Voucher consumption counts only confirmed orders.
            if let Some((voucher_id, customer_id)) = voucher {
                state.consumed_vouchers.insert((voucher_id, customer_id));
                *state.voucher_redemptions.entry(voucher_id).or_insert(0) += 1;
            }
        },
        BookingAction::OrderFailed { order_id, reason } => {
            release_order(state, *order_id);
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = OrderStatus::Failed {
                    reason: reason.clone(),
                };
            }
        },
        BookingAction::OrderExpired { order_id } => {
            release_order(state, *order_id);
            if let Some(order) = state.orders.get_mut(order_id) {
                order.status = OrderStatus::Expired;
            }
        },
        BookingAction::SettlementRecorded { key, disposition } => {
            state.settlement_log.insert(key.clone(), disposition.clone());
        },
        // Commands never reach the fold
        _ => {},
    }
}

//! Pure pricing rule evaluator.
//!
//! Given a showtime, a seat selection, and an optional voucher, produce a
//! full [`PriceBreakdown`]. No clocks, no state mutation, no I/O: the same
//! inputs always yield the same breakdown, so every pricing rule is testable
//! as a plain function call.
//!
//! Rounding discipline: line amounts come straight from the price table and
//! are exact. The only division happens in [`Money::percent_half_up`] when a
//! percent discount is applied, so the final total carries at most one
//! rounding step.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{
    Catalog, CustomerId, Discount, Money, RoomKind, Seat, SeatId, SeatKind, Showtime, Voucher,
    VoucherId, VoucherScope,
};

/// Configured base prices per (seat kind, room kind) combination.
///
/// Missing rows are a configuration error surfaced to the caller, never a
/// silent zero price.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PriceTable {
    rows: HashMap<(SeatKind, RoomKind), Money>,
}

impl PriceTable {
    /// Creates an empty price table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price for a seat/room combination
    pub fn set(&mut self, seat: SeatKind, room: RoomKind, price: Money) {
        self.rows.insert((seat, room), price);
    }

    /// Looks up the price for a seat/room combination
    #[must_use]
    pub fn get(&self, seat: SeatKind, room: RoomKind) -> Option<Money> {
        self.rows.get(&(seat, room)).copied()
    }
}

/// One priced seat in a breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    /// The seat being priced
    pub seat_id: SeatId,
    /// Seat label for receipts
    pub label: String,
    /// Seat kind the price row was chosen by
    pub seat_kind: SeatKind,
    /// Base price from the table
    pub amount: Money,
}

/// Why a presented voucher did not reduce the price.
///
/// An inapplicable voucher is an ordinary outcome, not an error: the order
/// proceeds at full price and the caller decides whether to surface it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherSkip {
    /// No voucher with that code exists
    UnknownCode,
    /// Voucher is scoped to a different customer
    WrongCustomer,
    /// Voucher is scoped to a different movie
    WrongMovie,
    /// Voucher already redeemed its maximum number of times
    UsageExhausted,
    /// Voucher already consumed by this customer
    AlreadyUsed,
}

impl VoucherSkip {
    /// Human-readable description for receipts and logs
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::UnknownCode => "voucher code not recognized",
            Self::WrongCustomer => "voucher belongs to another customer",
            Self::WrongMovie => "voucher does not apply to this movie",
            Self::UsageExhausted => "voucher usage limit reached",
            Self::AlreadyUsed => "voucher already used",
        }
    }
}

/// Outcome of voucher evaluation inside a breakdown
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherVerdict {
    /// No voucher code was presented
    NotPresented,
    /// Voucher applied; discount reflected in the total
    Applied {
        /// The applied voucher
        voucher_id: VoucherId,
        /// Amount subtracted from the line total
        discount: Money,
    },
    /// Voucher presented but skipped; full price charged
    Inapplicable {
        /// Why the voucher was skipped
        reason: VoucherSkip,
    },
}

impl VoucherVerdict {
    /// The voucher id, when one was applied
    #[must_use]
    pub const fn applied_voucher(&self) -> Option<VoucherId> {
        match self {
            Self::Applied { voucher_id, .. } => Some(*voucher_id),
            Self::NotPresented | Self::Inapplicable { .. } => None,
        }
    }
}

/// Complete pricing result for an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Per-seat lines
    pub lines: Vec<PriceLine>,
    /// Sum of all lines before discount
    pub subtotal: Money,
    /// What happened to the presented voucher
    pub voucher: VoucherVerdict,
    /// Amount the customer owes
    pub total: Money,
}

impl PriceBreakdown {
    /// An empty breakdown (zero seats, zero total)
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            lines: Vec::new(),
            subtotal: Money::ZERO,
            voucher: VoucherVerdict::NotPresented,
            total: Money::ZERO,
        }
    }
}

/// Errors from pricing evaluation.
///
/// These are configuration or arithmetic faults; an inapplicable voucher is
/// never one of them.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    /// No price row configured for a seat/room combination
    #[error("no price configured for {seat_kind} seat in {room_kind} room")]
    MissingPriceRow {
        /// Seat kind without a row
        seat_kind: SeatKind,
        /// Room kind without a row
        room_kind: RoomKind,
    },
    /// Room referenced by the showtime is not in the catalog
    #[error("room {0} not found in catalog")]
    UnknownRoom(crate::types::RoomId),
    /// Total overflowed the money representation
    #[error("price computation overflowed")]
    Overflow,
}

/// Usage facts the evaluator needs but does not own.
///
/// Redemption counts live in booking state; the caller snapshots them into
/// this view so the evaluator itself stays pure.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoucherUsage {
    /// Total confirmed redemptions of the voucher so far
    pub redemptions: u32,
    /// Whether this customer already consumed the voucher
    pub used_by_customer: bool,
}

/// Prices a seat selection for one showtime.
///
/// `voucher_code` may name a voucher that turns out to be inapplicable; the
/// breakdown then carries the skip reason and the undiscounted total.
///
/// # Errors
///
/// Returns [`PricingError`] when the catalog is missing a price row or the
/// room, or when arithmetic overflows.
pub fn price_order(
    catalog: &Catalog,
    showtime: &Showtime,
    seats: &[&Seat],
    customer_id: CustomerId,
    voucher_code: Option<&str>,
    usage: impl Fn(&Voucher) -> VoucherUsage,
) -> Result<PriceBreakdown, PricingError> {
    let room = catalog
        .rooms
        .get(&showtime.room_id)
        .ok_or(PricingError::UnknownRoom(showtime.room_id))?;

    let mut lines = Vec::with_capacity(seats.len());
    let mut subtotal = Money::ZERO;
    for seat in seats {
        let amount = catalog
            .price_table
            .get(seat.kind, room.kind)
            .ok_or(PricingError::MissingPriceRow {
                seat_kind: seat.kind,
                room_kind: room.kind,
            })?;
        subtotal = subtotal.checked_add(amount).ok_or(PricingError::Overflow)?;
        lines.push(PriceLine {
            seat_id: seat.id,
            label: seat.label.clone(),
            seat_kind: seat.kind,
            amount,
        });
    }

    let verdict = match voucher_code {
        None => VoucherVerdict::NotPresented,
        Some(code) => evaluate_voucher(catalog, code, showtime, customer_id, subtotal, usage)?,
    };

    let total = match &verdict {
        VoucherVerdict::Applied { discount, .. } => subtotal.saturating_sub(*discount),
        VoucherVerdict::NotPresented | VoucherVerdict::Inapplicable { .. } => subtotal,
    };

    Ok(PriceBreakdown {
        lines,
        subtotal,
        voucher: verdict,
        total,
    })
}

fn evaluate_voucher(
    catalog: &Catalog,
    code: &str,
    showtime: &Showtime,
    customer_id: CustomerId,
    subtotal: Money,
    usage: impl Fn(&Voucher) -> VoucherUsage,
) -> Result<VoucherVerdict, PricingError> {
    let Some(voucher) = catalog.vouchers.get(code) else {
        return Ok(VoucherVerdict::Inapplicable {
            reason: VoucherSkip::UnknownCode,
        });
    };

    match voucher.scope {
        VoucherScope::Global => {},
        VoucherScope::Customer(owner) if owner == customer_id => {},
        VoucherScope::Customer(_) => {
            return Ok(VoucherVerdict::Inapplicable {
                reason: VoucherSkip::WrongCustomer,
            });
        },
        VoucherScope::Movie(movie_id) if movie_id == showtime.movie_id => {},
        VoucherScope::Movie(_) => {
            return Ok(VoucherVerdict::Inapplicable {
                reason: VoucherSkip::WrongMovie,
            });
        },
    }

    let facts = usage(voucher);
    if facts.used_by_customer {
        return Ok(VoucherVerdict::Inapplicable {
            reason: VoucherSkip::AlreadyUsed,
        });
    }
    if voucher.usage_limit.is_some_and(|limit| facts.redemptions >= limit) {
        return Ok(VoucherVerdict::Inapplicable {
            reason: VoucherSkip::UsageExhausted,
        });
    }

    let discount = match voucher.discount {
        Discount::Percent(pct) => {
            let kept = subtotal
                .percent_half_up(100 - pct.min(100))
                .ok_or(PricingError::Overflow)?;
            subtotal.saturating_sub(kept)
        },
        Discount::Amount(amount) => amount.min(subtotal),
    };

    Ok(VoucherVerdict::Applied {
        voucher_id: voucher.id,
        discount,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{MovieId, Room, RoomId, ShowtimeId};
    use chrono::{TimeZone, Utc};

    fn fixture() -> (Catalog, Showtime, Vec<Seat>) {
        let mut catalog = Catalog::new();
        let room_id = RoomId::new();
        catalog.add_room(Room {
            id: room_id,
            name: "Room 1".into(),
            kind: RoomKind::Standard,
        });
        catalog
            .price_table
            .set(SeatKind::Standard, RoomKind::Standard, Money::from_minor(90_000));
        catalog
            .price_table
            .set(SeatKind::Vip, RoomKind::Standard, Money::from_minor(120_000));

        let showtime = Showtime {
            id: ShowtimeId::new(),
            movie_id: MovieId::new(),
            room_id,
            start: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        };

        let seats = vec![
            Seat {
                id: SeatId::new(),
                room_id,
                label: "A-01".into(),
                kind: SeatKind::Vip,
            },
            Seat {
                id: SeatId::new(),
                room_id,
                label: "A-02".into(),
                kind: SeatKind::Vip,
            },
        ];
        (catalog, showtime, seats)
    }

    fn no_usage(_: &Voucher) -> VoucherUsage {
        VoucherUsage::default()
    }

    #[test]
    fn two_vip_seats_with_ten_percent_voucher() {
        let (mut catalog, showtime, seats) = fixture();
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "TENOFF".into(),
            scope: VoucherScope::Global,
            discount: Discount::Percent(10),
            usage_limit: None,
        });

        let seat_refs: Vec<&Seat> = seats.iter().collect();
        let breakdown = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("TENOFF"),
            no_usage,
        )
        .unwrap();

        assert_eq!(breakdown.subtotal, Money::from_minor(240_000));
        assert_eq!(breakdown.total, Money::from_minor(216_000));
        assert!(matches!(breakdown.voucher, VoucherVerdict::Applied { .. }));
    }

    #[test]
    fn unknown_voucher_charges_full_price() {
        let (catalog, showtime, seats) = fixture();
        let seat_refs: Vec<&Seat> = seats.iter().collect();
        let breakdown = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("NOPE"),
            no_usage,
        )
        .unwrap();

        assert_eq!(breakdown.total, Money::from_minor(240_000));
        assert_eq!(
            breakdown.voucher,
            VoucherVerdict::Inapplicable {
                reason: VoucherSkip::UnknownCode
            }
        );
    }

    #[test]
    fn customer_scoped_voucher_rejects_other_customers() {
        let (mut catalog, showtime, seats) = fixture();
        let owner = CustomerId::new();
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "MINE".into(),
            scope: VoucherScope::Customer(owner),
            discount: Discount::Percent(50),
            usage_limit: None,
        });
        let seat_refs: Vec<&Seat> = seats.iter().collect();

        let stranger = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("MINE"),
            no_usage,
        )
        .unwrap();
        assert_eq!(
            stranger.voucher,
            VoucherVerdict::Inapplicable {
                reason: VoucherSkip::WrongCustomer
            }
        );

        let owned = price_order(&catalog, &showtime, &seat_refs, owner, Some("MINE"), no_usage)
            .unwrap();
        assert_eq!(owned.total, Money::from_minor(120_000));
    }

    #[test]
    fn movie_scoped_voucher_checks_the_showtime_movie() {
        let (mut catalog, showtime, seats) = fixture();
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "FILM".into(),
            scope: VoucherScope::Movie(showtime.movie_id),
            discount: Discount::Amount(Money::from_minor(30_000)),
            usage_limit: None,
        });
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "OTHER".into(),
            scope: VoucherScope::Movie(MovieId::new()),
            discount: Discount::Amount(Money::from_minor(30_000)),
            usage_limit: None,
        });
        let seat_refs: Vec<&Seat> = seats.iter().collect();

        let hit = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("FILM"),
            no_usage,
        )
        .unwrap();
        assert_eq!(hit.total, Money::from_minor(210_000));

        let miss = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("OTHER"),
            no_usage,
        )
        .unwrap();
        assert_eq!(
            miss.voucher,
            VoucherVerdict::Inapplicable {
                reason: VoucherSkip::WrongMovie
            }
        );
    }

    #[test]
    fn exhausted_voucher_is_skipped_not_failed() {
        let (mut catalog, showtime, seats) = fixture();
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "LIMITED".into(),
            scope: VoucherScope::Global,
            discount: Discount::Percent(10),
            usage_limit: Some(2),
        });
        let seat_refs: Vec<&Seat> = seats.iter().collect();

        let breakdown = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("LIMITED"),
            |_| VoucherUsage {
                redemptions: 2,
                used_by_customer: false,
            },
        )
        .unwrap();

        assert_eq!(breakdown.total, Money::from_minor(240_000));
        assert_eq!(
            breakdown.voucher,
            VoucherVerdict::Inapplicable {
                reason: VoucherSkip::UsageExhausted
            }
        );
    }

    #[test]
    fn flat_discount_clamps_at_subtotal() {
        let (mut catalog, showtime, seats) = fixture();
        catalog.add_voucher(Voucher {
            id: VoucherId::new(),
            code: "HUGE".into(),
            scope: VoucherScope::Global,
            discount: Discount::Amount(Money::from_minor(9_999_999)),
            usage_limit: None,
        });
        let seat_refs: Vec<&Seat> = seats.iter().collect();
        let breakdown = price_order(
            &catalog,
            &showtime,
            &seat_refs,
            CustomerId::new(),
            Some("HUGE"),
            no_usage,
        )
        .unwrap();
        assert_eq!(breakdown.total, Money::ZERO);
    }

    #[test]
    fn missing_price_row_is_a_configuration_error() {
        let (mut catalog, showtime, _) = fixture();
        let seat = Seat {
            id: SeatId::new(),
            room_id: showtime.room_id,
            label: "C-01".into(),
            kind: SeatKind::Couple,
        };
        catalog.add_seat(seat.clone());
        let err = price_order(
            &catalog,
            &showtime,
            &[&seat],
            CustomerId::new(),
            None,
            no_usage,
        )
        .unwrap_err();
        assert!(matches!(err, PricingError::MissingPriceRow { .. }));
    }
}

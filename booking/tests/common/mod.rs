//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cinebook_booking::types::{
    Catalog, Discount, Money, MovieId, Room, RoomId, RoomKind, Seat, SeatId, SeatKind, Showtime,
    ShowtimeId, Voucher, VoucherId, VoucherScope,
};
use cinebook_booking::{CheckoutService, Config};
use cinebook_core::environment::SystemClock;
use chrono::{Duration as ChronoDuration, Utc};

pub struct Fixture {
    pub service: CheckoutService,
    pub config: Config,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatId>,
}

/// Catalog with one standard room, `seat_count` VIP seats at 120000, one
/// showtime three hours out, and a global 10% voucher "TENOFF".
pub fn seeded(seat_count: usize, hold_ttl: Duration) -> Fixture {
    let mut catalog = Catalog::new();

    let room_id = RoomId::new();
    catalog.add_room(Room {
        id: room_id,
        name: "Room 1".into(),
        kind: RoomKind::Standard,
    });
    catalog
        .price_table
        .set(SeatKind::Vip, RoomKind::Standard, Money::from_minor(120_000));
    catalog
        .price_table
        .set(SeatKind::Standard, RoomKind::Standard, Money::from_minor(90_000));

    let mut seats = Vec::with_capacity(seat_count);
    for n in 0..seat_count {
        let seat = Seat {
            id: SeatId::new(),
            room_id,
            label: format!("G-{n:02}"),
            kind: SeatKind::Vip,
        };
        seats.push(seat.id);
        catalog.add_seat(seat);
    }

    let showtime_id = ShowtimeId::new();
    let start = Utc::now() + ChronoDuration::hours(3);
    catalog.add_showtime(Showtime {
        id: showtime_id,
        movie_id: MovieId::new(),
        room_id,
        start,
        end: start + ChronoDuration::hours(2),
    });

    catalog.add_voucher(Voucher {
        id: VoucherId::new(),
        code: "TENOFF".into(),
        scope: VoucherScope::Global,
        discount: Discount::Percent(10),
        usage_limit: None,
    });

    let config = Config {
        hold_ttl,
        ..Config::default()
    };
    let service = CheckoutService::new(&config, Arc::new(catalog), Arc::new(SystemClock));
    Fixture {
        service,
        config,
        showtime_id,
        seats,
    }
}

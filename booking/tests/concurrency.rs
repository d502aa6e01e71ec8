//! Concurrency: racing orders for the same seat get exactly one winner.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::time::Duration;

use cinebook_booking::BookingError;
use cinebook_booking::types::CustomerId;

#[tokio::test]
async fn same_seat_race_has_exactly_one_winner() {
    let f = common::seeded(1, Duration::from_secs(600));
    let seat = f.seats[0];

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = f.service.clone();
        let showtime_id = f.showtime_id;
        handles.push(tokio::spawn(async move {
            service
                .place_order(CustomerId::new(), showtime_id, vec![seat], None)
                .await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(BookingError::SeatsTaken { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error in race: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 31);

    let claimed = f
        .service
        .booking_store()
        .state(|s| s.claims.len())
        .await;
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn overlapping_multi_seat_orders_never_split_a_selection() {
    // Two orders race for {0,1} and {1,2}; whoever loses seat 1 must hold
    // nothing at all.
    let f = common::seeded(3, Duration::from_secs(600));
    let (a, b, c) = (f.seats[0], f.seats[1], f.seats[2]);

    let first = {
        let service = f.service.clone();
        let showtime_id = f.showtime_id;
        tokio::spawn(async move {
            service
                .place_order(CustomerId::new(), showtime_id, vec![a, b], None)
                .await
        })
    };
    let second = {
        let service = f.service.clone();
        let showtime_id = f.showtime_id;
        tokio::spawn(async move {
            service
                .place_order(CustomerId::new(), showtime_id, vec![b, c], None)
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let claims = f
        .service
        .booking_store()
        .state(|s| s.claims.len())
        .await;
    // Only the winning order's two seats are claimed.
    assert_eq!(claims, 2);
}

#[tokio::test]
#[allow(clippy::panic)]
async fn distinct_seats_book_concurrently_without_interference() {
    let f = common::seeded(16, Duration::from_secs(600));

    let mut handles = Vec::new();
    for seat in f.seats.clone() {
        let service = f.service.clone();
        let showtime_id = f.showtime_id;
        handles.push(tokio::spawn(async move {
            service
                .place_order(CustomerId::new(), showtime_id, vec![seat], None)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let claims = f
        .service
        .booking_store()
        .state(|s| s.claims.len())
        .await;
    assert_eq!(claims, 16);
}

//! Hold expiry: the delay timer, the sweep backstop, and terminal-state
//! protection against late callbacks.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::HashMap;
use std::time::Duration;

use cinebook_booking::gateway::{BankAdapter, GatewayKind};
use cinebook_booking::sweep::ExpirySweeper;
use cinebook_booking::types::{CustomerId, OrderStatus};

#[tokio::test]
async fn hold_timer_expires_the_order_and_frees_the_seat() {
    let f = common::seeded(1, Duration::from_millis(100));
    let customer = CustomerId::new();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::SeatsHeld);

    // Wait past the TTL for the delay effect to fire.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let order = f.service.order_status(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Expired);

    // The seat is claimable again by someone else.
    f.service
        .place_order(CustomerId::new(), f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_is_a_backstop_for_lapsed_holds() {
    let f = common::seeded(2, Duration::from_millis(100));
    let customer = CustomerId::new();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();

    let sweeper = ExpirySweeper::new(
        f.service.booking_store().clone(),
        Duration::from_millis(50),
    );
    let handle = tokio::spawn(sweeper.run());

    // Regardless of which mechanism fires first, the order ends Expired.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let order = f.service.order_status(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Expired);

    f.service.shutdown(Duration::from_secs(2)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn settlement_after_expiry_is_acknowledged_but_changes_nothing() {
    let f = common::seeded(1, Duration::from_millis(100));
    let customer = CustomerId::new();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();
    f.service
        .start_gateway_payment(order.id, customer, GatewayKind::Bank)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        f.service.order_status(order.id).await.unwrap().status,
        OrderStatus::Expired
    );

    // The customer paid at the bank, but too late.
    let adapter = BankAdapter::new(f.config.bank_secret.clone());
    let mut params = HashMap::from([
        ("txn_ref".to_string(), order.id.to_string()),
        ("amount".to_string(), "120000".to_string()),
        ("resp_code".to_string(), "00".to_string()),
        ("bank_txn_id".to_string(), "LATE-1".to_string()),
    ]);
    params.insert("secure_hash".to_string(), adapter.sign(&params));

    let ack = f.service.handle_bank_callback(&params).await;
    assert_eq!(ack.rsp_code, "02");

    let order = f.service.order_status(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert!(f.service.tickets(order.id).await.is_empty());
}

#[tokio::test]
async fn confirmed_order_survives_its_own_hold_timer() {
    let f = common::seeded(1, Duration::from_millis(200));
    let customer = CustomerId::new();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();
    f.service
        .start_gateway_payment(order.id, customer, GatewayKind::Bank)
        .await
        .unwrap();

    let adapter = BankAdapter::new(f.config.bank_secret.clone());
    let mut params = HashMap::from([
        ("txn_ref".to_string(), order.id.to_string()),
        ("amount".to_string(), "120000".to_string()),
        ("resp_code".to_string(), "00".to_string()),
        ("bank_txn_id".to_string(), "FAST-1".to_string()),
    ]);
    params.insert("secure_hash".to_string(), adapter.sign(&params));
    let ack = f.service.handle_bank_callback(&params).await;
    assert_eq!(ack.rsp_code, "00");

    // Let the hold timer fire after confirmation; it must be a no-op.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        f.service.order_status(order.id).await.unwrap().status,
        OrderStatus::Confirmed
    );
    assert_eq!(f.service.tickets(order.id).await.len(), 1);
}

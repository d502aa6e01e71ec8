//! End-to-end demo: seed a catalog, book seats, settle through the bank
//! gateway and the wallet, and show a seat-hold expiring.
//!
//! Run with `cargo run --bin demo`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::info;

use cinebook_booking::aggregates::WalletAction;
use cinebook_booking::gateway::GatewayKind;
use cinebook_booking::types::{
    Catalog, CustomerId, Discount, Money, MovieId, Room, RoomId, RoomKind, Seat, SeatId, SeatKind,
    Showtime, ShowtimeId, Voucher, VoucherId, VoucherScope, WalletId,
};
use cinebook_booking::{CheckoutService, Config};
use cinebook_core::environment::SystemClock;

fn seed_catalog() -> (Catalog, ShowtimeId, Vec<SeatId>) {
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

    let mut seat_ids = Vec::new();
    for label in ["G-01", "G-02", "G-03"] {
        let seat = Seat {
            id: SeatId::new(),
            room_id,
            label: label.into(),
            kind: SeatKind::Vip,
        };
        seat_ids.push(seat.id);
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
        usage_limit: Some(100),
    });

    (catalog, showtime_id, seat_ids)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (catalog, showtime_id, seats) = seed_catalog();
    let service = CheckoutService::new(&config, Arc::new(catalog), Arc::new(SystemClock));

    // --- Bank flow: two VIP seats with a 10% voucher ---------------------
    let alice = CustomerId::new();
    let order = service
        .place_order(
            alice,
            showtime_id,
            vec![seats[0], seats[1]],
            Some("TENOFF".into()),
        )
        .await?;
    info!(order_id = %order.id, total = %order.total_amount, "order placed");

    let (order, _) = service
        .start_gateway_payment(order.id, alice, GatewayKind::Bank)
        .await?;

    // Simulate the bank's server-to-server callback.
    let bank = cinebook_booking::gateway::BankAdapter::new(config.bank_secret.clone());
    let mut params = HashMap::from([
        ("txn_ref".to_string(), order.id.to_string()),
        ("amount".to_string(), order.total_amount.minor().to_string()),
        ("resp_code".to_string(), "00".to_string()),
        ("bank_txn_id".to_string(), "DEMO-BANK-1".to_string()),
    ]);
    params.insert("secure_hash".to_string(), bank.sign(&params));
    let ack = service.handle_bank_callback(&params).await;
    info!(rsp_code = %ack.rsp_code, "bank callback acknowledged");

    // Retried callbacks get the identical ack.
    let retry_ack = service.handle_bank_callback(&params).await;
    assert_eq!(ack, retry_ack);

    let tickets = service.tickets(order.id).await;
    info!(count = tickets.len(), "tickets issued");

    // --- Wallet flow -----------------------------------------------------
    let bob = CustomerId::new();
    let wallet_id = WalletId::new();
    service
        .wallet_store()
        .send(WalletAction::OpenWallet {
            wallet_id,
            customer_id: bob,
            pin: "4321".into(),
        })
        .await?;
    service
        .wallet_store()
        .send(WalletAction::Credit {
            wallet_id,
            amount: Money::from_minor(500_000),
            reference_code: "demo-topup".into(),
        })
        .await?;

    let order = service
        .place_order(bob, showtime_id, vec![seats[2]], None)
        .await?;
    let confirmed = service
        .pay_with_wallet(order.id, bob, wallet_id, "4321".into())
        .await?;
    let balance = service
        .wallet_store()
        .state(|s| s.get(&wallet_id).map(|w| w.balance))
        .await;
    info!(order_id = %confirmed.id, balance = ?balance, "wallet payment confirmed");

    service.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

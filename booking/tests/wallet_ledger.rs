//! Wallet ledger invariants, including the property that the balance always
//! equals the signed sum of the ledger.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use cinebook_booking::BookingError;
use cinebook_booking::aggregates::{BookingAction, WalletAction, WalletEnvironment, WalletReducer};
use cinebook_booking::gateway::{GatewayKind, OrderRef, SettlementEvent, SettlementOutcome};
use cinebook_booking::types::{
    CustomerId, Money, WalletId, WalletReject, WalletState,
};
use cinebook_core::environment::SystemClock;
use cinebook_core::reducer::Reducer;
use proptest::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn wallet_payment_debits_exactly_the_order_total() {
    let f = common::seeded(2, Duration::from_secs(600));
    let customer = CustomerId::new();
    let wallet_id = WalletId::new();

    f.service
        .wallet_store()
        .send(WalletAction::OpenWallet {
            wallet_id,
            customer_id: customer,
            pin: "1234".into(),
        })
        .await
        .unwrap();
    f.service
        .wallet_store()
        .send(WalletAction::Credit {
            wallet_id,
            amount: Money::from_minor(500_000),
            reference_code: "topup".into(),
        })
        .await
        .unwrap();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], Some("TENOFF".into()))
        .await
        .unwrap();
    assert_eq!(order.total_amount, Money::from_minor(108_000));

    let confirmed = f
        .service
        .pay_with_wallet(order.id, customer, wallet_id, "1234".into())
        .await
        .unwrap();
    assert!(confirmed.status.is_terminal());

    let (balance, ledger_sum) = f
        .service
        .wallet_store()
        .state(|s| {
            (
                s.get(&wallet_id).unwrap().balance,
                s.ledger_sum(&wallet_id),
            )
        })
        .await;
    assert_eq!(balance, Money::from_minor(392_000));
    assert_eq!(ledger_sum, 392_000);
}

#[tokio::test]
async fn wrong_pin_leaves_order_payable_and_balance_intact() {
    let f = common::seeded(2, Duration::from_secs(600));
    let customer = CustomerId::new();
    let wallet_id = WalletId::new();

    f.service
        .wallet_store()
        .send(WalletAction::OpenWallet {
            wallet_id,
            customer_id: customer,
            pin: "1234".into(),
        })
        .await
        .unwrap();
    f.service
        .wallet_store()
        .send(WalletAction::Credit {
            wallet_id,
            amount: Money::from_minor(500_000),
            reference_code: "topup".into(),
        })
        .await
        .unwrap();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();

    let err = f
        .service
        .pay_with_wallet(order.id, customer, wallet_id, "0000".into())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Wallet(WalletReject::InvalidPin)));

    let balance = f
        .service
        .wallet_store()
        .state(|s| s.get(&wallet_id).unwrap().balance)
        .await;
    assert_eq!(balance, Money::from_minor(500_000));

    // A later attempt with the right PIN succeeds on the same order.
    f.service
        .pay_with_wallet(order.id, customer, wallet_id, "1234".into())
        .await
        .unwrap();
}

#[tokio::test]
async fn debit_is_reversed_when_the_order_cannot_confirm() {
    let f = common::seeded(2, Duration::from_secs(600));
    let customer = CustomerId::new();
    let wallet_id = WalletId::new();

    f.service
        .wallet_store()
        .send(WalletAction::OpenWallet {
            wallet_id,
            customer_id: customer,
            pin: "1234".into(),
        })
        .await
        .unwrap();
    f.service
        .wallet_store()
        .send(WalletAction::Credit {
            wallet_id,
            amount: Money::from_minor(500_000),
            reference_code: "topup".into(),
        })
        .await
        .unwrap();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();

    // A stray replay under the wallet correlation key lands while the
    // order is only held; it is recorded as Ignored, and that disposition
    // will be replayed when the real settlement arrives.
    let stray = SettlementEvent {
        gateway: GatewayKind::Wallet,
        order_ref: OrderRef::Direct(order.id),
        outcome: SettlementOutcome::Success,
        amount: order.total_amount,
        gateway_txn_id: format!("order:{}", order.id),
    };
    f.service
        .booking_store()
        .send(BookingAction::ApplySettlement { settlement: stray })
        .await
        .unwrap();

    let err = f
        .service
        .pay_with_wallet(order.id, customer, wallet_id, "1234".into())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidOrderState { .. }));

    // The debit moved money, so an offsetting credit restores the balance.
    let (balance, ledger_sum, references) = f
        .service
        .wallet_store()
        .state(|s| {
            (
                s.get(&wallet_id).unwrap().balance,
                s.ledger_sum(&wallet_id),
                s.ledger(&wallet_id)
                    .iter()
                    .map(|t| t.reference_code.clone())
                    .collect::<Vec<_>>(),
            )
        })
        .await;
    assert_eq!(balance, Money::from_minor(500_000));
    assert_eq!(ledger_sum, 500_000);
    assert_eq!(references.len(), 3);
    assert!(references.contains(&format!("refund:order:{}", order.id)));

    // No tickets were issued for the unconfirmed order.
    assert!(f.service.tickets(order.id).await.is_empty());
}

#[tokio::test]
async fn insufficient_funds_rejects_without_partial_debit() {
    let f = common::seeded(2, Duration::from_secs(600));
    let customer = CustomerId::new();
    let wallet_id = WalletId::new();

    f.service
        .wallet_store()
        .send(WalletAction::OpenWallet {
            wallet_id,
            customer_id: customer,
            pin: "1234".into(),
        })
        .await
        .unwrap();
    f.service
        .wallet_store()
        .send(WalletAction::Credit {
            wallet_id,
            amount: Money::from_minor(50_000),
            reference_code: "topup".into(),
        })
        .await
        .unwrap();

    let order = f
        .service
        .place_order(customer, f.showtime_id, vec![f.seats[0]], None)
        .await
        .unwrap();
    let err = f
        .service
        .pay_with_wallet(order.id, customer, wallet_id, "1234".into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Wallet(WalletReject::InsufficientFunds)
    ));

    let (balance, ledger_len) = f
        .service
        .wallet_store()
        .state(|s| (s.get(&wallet_id).unwrap().balance, s.ledger(&wallet_id).len()))
        .await;
    assert_eq!(balance, Money::from_minor(50_000));
    assert_eq!(ledger_len, 1);
}

proptest! {
    /// Any interleaving of credits and debits keeps the balance equal to
    /// the signed ledger sum and never drives it negative.
    #[test]
    fn balance_always_equals_ledger_sum(
        ops in prop::collection::vec((0u8..2, 1u64..100_000), 1..60)
    ) {
        let reducer = WalletReducer::new();
        let env = WalletEnvironment::new(Arc::new(SystemClock), "salt");
        let mut state = WalletState::new();

        let wallet_id = WalletId::new();
        reducer.reduce(
            &mut state,
            WalletAction::OpenWallet {
                wallet_id,
                customer_id: CustomerId::new(),
                pin: "1234".into(),
            },
            &env,
        );

        for (i, (kind, amount)) in ops.into_iter().enumerate() {
            let action = if kind == 0 {
                WalletAction::Credit {
                    wallet_id,
                    amount: Money::from_minor(amount),
                    reference_code: format!("op-{i}"),
                }
            } else {
                WalletAction::Debit {
                    wallet_id,
                    amount: Money::from_minor(amount),
                    pin: "1234".into(),
                    reference_code: format!("op-{i}"),
                }
            };
            reducer.reduce(&mut state, action, &env);

            let balance = state.get(&wallet_id).unwrap().balance;
            let sum = state.ledger_sum(&wallet_id);
            prop_assert!(sum >= 0);
            prop_assert_eq!(i64::try_from(balance.minor()).unwrap(), sum);
        }
    }
}

//! Payment gateway reconciliation adapters.
//!
//! Each adapter verifies an asynchronous callback's signature, extracts the
//! settlement facts, and normalizes them into a [`SettlementEvent`] that the
//! booking reducer consumes without knowing which gateway produced it. The
//! adapters also build the acknowledgement payload each gateway expects,
//! because an unacknowledged callback is retried indefinitely.
//!
//! Two correlation styles exist in the wild and both are supported:
//!
//! * bank-style callbacks carry the order id itself in a transaction
//!   reference field ([`OrderRef::Direct`]);
//! * mobile-wallet callbacks carry only the gateway's own app transaction id
//!   ([`OrderRef::AppTransId`]), which the reducer resolves through its
//!   pending-order staging map.

pub mod bank;
pub mod mobipay;
pub mod zenpay;

pub use bank::{BankAck, BankAdapter};
pub use mobipay::MobiPayAdapter;
pub use zenpay::ZenPayAdapter;

use serde::{Deserialize, Serialize};

use crate::types::{Money, OrderId};

/// Acknowledgement payload shared by the mobile-wallet gateways.
///
/// `return_code` 1 means recorded, 2 means already settled, negative values
/// report verification or lookup failures. The wallet stops retrying once
/// any well-formed ack arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAck {
    /// Disposition code
    pub return_code: i32,
    /// Human-readable message
    pub return_message: String,
}

impl AppAck {
    /// Callback recorded
    #[must_use]
    pub fn recorded() -> Self {
        Self {
            return_code: 1,
            return_message: "success".into(),
        }
    }

    /// Order already terminal; nothing changed
    #[must_use]
    pub fn already_settled() -> Self {
        Self {
            return_code: 2,
            return_message: "order already settled".into(),
        }
    }

    /// MAC verification failed
    #[must_use]
    pub fn invalid_mac() -> Self {
        Self {
            return_code: -1,
            return_message: "mac not equal".into(),
        }
    }

    /// App transaction id unknown
    #[must_use]
    pub fn unknown_transaction() -> Self {
        Self {
            return_code: -2,
            return_message: "transaction not found".into(),
        }
    }

    /// Reported amount did not match the order
    #[must_use]
    pub fn invalid_amount() -> Self {
        Self {
            return_code: -3,
            return_message: "amount mismatch".into(),
        }
    }
}

/// Payment channel an order is settled through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayKind {
    /// Card/bank redirect gateway, order-ref correlation
    Bank,
    /// Mobile wallet, app-trans-id correlation
    MobiPay,
    /// Mobile wallet, app-trans-id correlation, different MAC layout
    ZenPay,
    /// In-house prepaid wallet, settled synchronously
    Wallet,
}

impl GatewayKind {
    /// Stable lowercase name for logs and correlation keys
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::MobiPay => "mobipay",
            Self::ZenPay => "zenpay",
            Self::Wallet => "wallet",
        }
    }

    /// Whether the gateway correlates by app transaction id and therefore
    /// needs a pending-order staging record
    #[must_use]
    pub const fn uses_app_trans_id(&self) -> bool {
        matches!(self, Self::MobiPay | Self::ZenPay)
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a settlement refers back to the order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRef {
    /// The gateway echoed the order id directly
    Direct(OrderId),
    /// The gateway knows only its own transaction id
    AppTransId(String),
}

/// Verified outcome reported by a gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    /// Payment captured
    Success,
    /// Payment declined or aborted
    Failure,
}

/// A signature-verified, gateway-neutral settlement fact.
///
/// Construction implies the signature already verified; adapters never emit
/// an event for a callback that failed verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    /// Gateway that reported the settlement
    pub gateway: GatewayKind,
    /// Reference back to the order
    pub order_ref: OrderRef,
    /// Success or failure as reported
    pub outcome: SettlementOutcome,
    /// Amount the gateway says changed hands
    pub amount: Money,
    /// Gateway's own transaction identifier, for audit
    pub gateway_txn_id: String,
}

impl SettlementEvent {
    /// Stable key for the settlement log, unique per gateway callback.
    ///
    /// Retries of the same callback produce the same key, which is what
    /// makes duplicate handling idempotent.
    #[must_use]
    pub fn correlation_key(&self) -> String {
        match &self.order_ref {
            OrderRef::Direct(order_id) => {
                format!("{}:{}:{}", self.gateway.name(), order_id, self.gateway_txn_id)
            },
            OrderRef::AppTransId(app_trans_id) => {
                format!("{}:{}", self.gateway.name(), app_trans_id)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn correlation_keys_are_stable_across_retries() {
        let order_id = OrderId::new();
        let first = SettlementEvent {
            gateway: GatewayKind::Bank,
            order_ref: OrderRef::Direct(order_id),
            outcome: SettlementOutcome::Success,
            amount: Money::from_minor(216_000),
            gateway_txn_id: "TX-881".into(),
        };
        let retry = first.clone();
        assert_eq!(first.correlation_key(), retry.correlation_key());

        let other = SettlementEvent {
            gateway: GatewayKind::MobiPay,
            order_ref: OrderRef::AppTransId("250601_abc".into()),
            outcome: SettlementOutcome::Failure,
            amount: Money::from_minor(216_000),
            gateway_txn_id: "99".into(),
        };
        assert_ne!(first.correlation_key(), other.correlation_key());
    }

    #[test]
    fn app_trans_id_gateways_are_flagged() {
        assert!(GatewayKind::MobiPay.uses_app_trans_id());
        assert!(GatewayKind::ZenPay.uses_app_trans_id());
        assert!(!GatewayKind::Bank.uses_app_trans_id());
        assert!(!GatewayKind::Wallet.uses_app_trans_id());
    }
}

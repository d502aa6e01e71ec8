//! MobiPay mobile-wallet adapter.
//!
//! MobiPay posts a JSON body and correlates by `app_trans_id`, the id we
//! generated when creating the payment. Its MAC is an HMAC-SHA256 over the
//! pipe-joined fields `app_trans_id|amount|status`, hex encoded.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{GatewayKind, OrderRef, SettlementEvent, SettlementOutcome};
use crate::error::BookingError;
use crate::types::Money;

type HmacSha256 = Hmac<Sha256>;

const GATEWAY: &str = "mobipay";

/// Raw MobiPay callback body
#[derive(Clone, Debug, Deserialize)]
pub struct MobiPayCallback {
    /// Our correlation id
    pub app_trans_id: String,
    /// Amount in minor units
    pub amount: u64,
    /// 1 = captured, anything else = failed
    pub status: i32,
    /// MobiPay's own transaction id
    pub mp_trans_id: String,
    /// Integrity MAC
    pub mac: String,
}

/// Verifies and parses MobiPay callbacks
#[derive(Clone, Debug)]
pub struct MobiPayAdapter {
    key: String,
}

impl MobiPayAdapter {
    /// Creates an adapter with the shared callback key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Computes the MAC for a callback's data fields
    #[must_use]
    pub fn mac(&self, app_trans_id: &str, amount: u64, status: i32) -> String {
        let data = format!("{app_trans_id}|{amount}|{status}");
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Parses the JSON body, verifies its MAC, and normalizes the
    /// settlement.
    ///
    /// # Errors
    ///
    /// [`BookingError::MalformedCallback`] for undecodable JSON and
    /// [`BookingError::InvalidSignature`] for a MAC mismatch.
    pub fn verify_callback(&self, body: &str) -> Result<SettlementEvent, BookingError> {
        let callback: MobiPayCallback =
            serde_json::from_str(body).map_err(|e| BookingError::MalformedCallback {
                gateway: GATEWAY,
                detail: e.to_string(),
            })?;

        let expected = self.mac(&callback.app_trans_id, callback.amount, callback.status);
        if expected != callback.mac {
            return Err(BookingError::InvalidSignature { gateway: GATEWAY });
        }

        let outcome = if callback.status == 1 {
            SettlementOutcome::Success
        } else {
            SettlementOutcome::Failure
        };

        Ok(SettlementEvent {
            gateway: GatewayKind::MobiPay,
            order_ref: OrderRef::AppTransId(callback.app_trans_id),
            outcome,
            amount: Money::from_minor(callback.amount),
            gateway_txn_id: callback.mp_trans_id,
        })
    }
}

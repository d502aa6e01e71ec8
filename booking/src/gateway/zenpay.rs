//! ZenPay mobile-wallet adapter.
//!
//! Same correlation model as MobiPay (the callback carries only the
//! `app_trans_id` we generated) but a different wire shape: ZenPay leads
//! with its own transaction id and signs
//! `zp_trans_id|app_trans_id|amount|result_code`. The field order in the
//! MAC is the point of divergence, which is why each gateway owns its
//! verification instead of sharing one.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{GatewayKind, OrderRef, SettlementEvent, SettlementOutcome};
use crate::error::BookingError;
use crate::types::Money;

type HmacSha256 = Hmac<Sha256>;

const GATEWAY: &str = "zenpay";

/// Raw ZenPay callback body
#[derive(Clone, Debug, Deserialize)]
pub struct ZenPayCallback {
    /// ZenPay's own transaction id
    pub zp_trans_id: String,
    /// Our correlation id
    pub app_trans_id: String,
    /// Amount in minor units
    pub amount: u64,
    /// 1 = captured, anything else = failed
    pub result_code: i32,
    /// Integrity MAC
    pub mac: String,
}

/// Verifies and parses ZenPay callbacks
#[derive(Clone, Debug)]
pub struct ZenPayAdapter {
    key: String,
}

impl ZenPayAdapter {
    /// Creates an adapter with the shared callback key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Computes the MAC for a callback's data fields
    #[must_use]
    pub fn mac(&self, zp_trans_id: &str, app_trans_id: &str, amount: u64, result_code: i32) -> String {
        let data = format!("{zp_trans_id}|{app_trans_id}|{amount}|{result_code}");
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
        let callback: ZenPayCallback =
            serde_json::from_str(body).map_err(|e| BookingError::MalformedCallback {
                gateway: GATEWAY,
                detail: e.to_string(),
            })?;

        let expected = self.mac(
            &callback.zp_trans_id,
            &callback.app_trans_id,
            callback.amount,
            callback.result_code,
        );
        if expected != callback.mac {
            return Err(BookingError::InvalidSignature { gateway: GATEWAY });
        }

        let outcome = if callback.result_code == 1 {
            SettlementOutcome::Success
        } else {
            SettlementOutcome::Failure
        };

        Ok(SettlementEvent {
            gateway: GatewayKind::ZenPay,
            order_ref: OrderRef::AppTransId(callback.app_trans_id),
            outcome,
            amount: Money::from_minor(callback.amount),
            gateway_txn_id: callback.zp_trans_id,
        })
    }
}

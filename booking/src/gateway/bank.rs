//! Bank redirect gateway adapter.
//!
//! The bank posts callbacks as flat key/value forms. The `txn_ref` field
//! echoes the order id we sent at redirect time, so correlation is direct.
//! Integrity comes from `secure_hash`: an HMAC-SHA256 over every other
//! field, serialized as `key=value` pairs joined with `&` in ascending key
//! order. Hash comparison happens before any field is trusted.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

use super::{GatewayKind, OrderRef, SettlementEvent, SettlementOutcome};
use crate::error::BookingError;
use crate::types::{Money, OrderId};

type HmacSha256 = Hmac<Sha256>;

const GATEWAY: &str = "bank";
const HASH_FIELD: &str = "secure_hash";

/// Acknowledgement payload the bank expects for every callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAck {
    /// Response code: "00" recorded, "02" already confirmed, "04" amount
    /// invalid, "97" bad signature, "99" unknown order
    pub rsp_code: String,
    /// Human-readable message
    pub message: String,
}

impl BankAck {
    /// Callback recorded
    #[must_use]
    pub fn recorded() -> Self {
        Self {
            rsp_code: "00".into(),
            message: "Confirm Success".into(),
        }
    }

    /// Order was already in a terminal state
    #[must_use]
    pub fn already_settled() -> Self {
        Self {
            rsp_code: "02".into(),
            message: "Order already confirmed".into(),
        }
    }

    /// Reported amount did not match the order
    #[must_use]
    pub fn invalid_amount() -> Self {
        Self {
            rsp_code: "04".into(),
            message: "Invalid amount".into(),
        }
    }

    /// Signature verification failed
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self {
            rsp_code: "97".into(),
            message: "Invalid signature".into(),
        }
    }

    /// Order reference not recognized
    #[must_use]
    pub fn order_not_found() -> Self {
        Self {
            rsp_code: "99".into(),
            message: "Order not found".into(),
        }
    }
}

/// Verifies and parses bank callbacks
#[derive(Clone, Debug)]
pub struct BankAdapter {
    secret: String,
}

impl BankAdapter {
    /// Creates an adapter with the shared HMAC secret
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the signature for a parameter set, excluding the hash field.
    ///
    /// Also used outbound when building the redirect URL, so the canonical
    /// serialization lives in exactly one place.
    #[must_use]
    pub fn sign(&self, params: &HashMap<String, String>) -> String {
        let mut keys: Vec<&String> = params.keys().filter(|k| *k != HASH_FIELD).collect();
        keys.sort();
        let canonical = keys
            .iter()
            .map(|k| format!("{k}={}", params[*k]))
            .collect::<Vec<_>>()
            .join("&");

        // Key length is unconstrained for HMAC, so new_from_slice cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies the callback signature and normalizes the settlement.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidSignature`] when the hash does not verify and
    /// [`BookingError::MalformedCallback`] when required fields are missing
    /// or unparseable. Either way the caller answers with the matching
    /// [`BankAck`]; the order is never touched.
    pub fn verify_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<SettlementEvent, BookingError> {
        let presented = params
            .get(HASH_FIELD)
            .ok_or_else(|| malformed("missing secure_hash"))?;
        let expected = self.sign(params);
        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            return Err(BookingError::InvalidSignature { gateway: GATEWAY });
        }

        let txn_ref = params.get("txn_ref").ok_or_else(|| malformed("missing txn_ref"))?;
        let order_id = OrderId::parse(txn_ref)
            .map_err(|_| malformed(&format!("txn_ref is not an order id: {txn_ref}")))?;

        let amount = params
            .get("amount")
            .ok_or_else(|| malformed("missing amount"))?
            .parse::<u64>()
            .map_err(|_| malformed("amount is not an integer"))?;

        let rsp_code = params
            .get("resp_code")
            .ok_or_else(|| malformed("missing resp_code"))?;
        let outcome = if rsp_code == "00" {
            SettlementOutcome::Success
        } else {
            SettlementOutcome::Failure
        };

        let gateway_txn_id = params
            .get("bank_txn_id")
            .cloned()
            .unwrap_or_else(|| txn_ref.clone());

        Ok(SettlementEvent {
            gateway: GatewayKind::Bank,
            order_ref: OrderRef::Direct(order_id),
            outcome,
            amount: Money::from_minor(amount),
            gateway_txn_id,
        })
    }
}

fn malformed(detail: &str) -> BookingError {
    BookingError::MalformedCallback {
        gateway: GATEWAY,
        detail: detail.to_string(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn callback(adapter: &BankAdapter, order_id: OrderId, amount: u64, code: &str) -> HashMap<String, String> {
        let mut params = HashMap::from([
            ("txn_ref".to_string(), order_id.to_string()),
            ("amount".to_string(), amount.to_string()),
            ("resp_code".to_string(), code.to_string()),
            ("bank_txn_id".to_string(), "BANK-42".to_string()),
        ]);
        let hash = adapter.sign(&params);
        params.insert(HASH_FIELD.to_string(), hash);
        params
    }

    #[test]
    fn valid_callback_parses_to_settlement() {
        let adapter = BankAdapter::new("topsecret");
        let order_id = OrderId::new();
        let params = callback(&adapter, order_id, 216_000, "00");

        let event = adapter.verify_callback(&params).unwrap();
        assert_eq!(event.order_ref, OrderRef::Direct(order_id));
        assert_eq!(event.outcome, SettlementOutcome::Success);
        assert_eq!(event.amount, Money::from_minor(216_000));
    }

    #[test]
    fn declined_payment_maps_to_failure() {
        let adapter = BankAdapter::new("topsecret");
        let params = callback(&adapter, OrderId::new(), 216_000, "24");
        let event = adapter.verify_callback(&params).unwrap();
        assert_eq!(event.outcome, SettlementOutcome::Failure);
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let adapter = BankAdapter::new("topsecret");
        let mut params = callback(&adapter, OrderId::new(), 216_000, "00");
        params.insert("amount".to_string(), "1".to_string());

        let err = adapter.verify_callback(&params).unwrap_err();
        assert!(matches!(err, BookingError::InvalidSignature { .. }));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signer = BankAdapter::new("topsecret");
        let verifier = BankAdapter::new("different");
        let params = callback(&signer, OrderId::new(), 216_000, "00");
        assert!(matches!(
            verifier.verify_callback(&params),
            Err(BookingError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn missing_fields_are_malformed_not_unsigned() {
        let adapter = BankAdapter::new("topsecret");
        let order_id = OrderId::new();
        let mut params = callback(&adapter, order_id, 216_000, "00");
        params.remove("txn_ref");
        // re-sign so the hash is valid for the remaining fields
        let hash = adapter.sign(&params);
        params.insert(HASH_FIELD.to_string(), hash);

        let err = adapter.verify_callback(&params).unwrap_err();
        assert!(matches!(err, BookingError::MalformedCallback { .. }));
    }

    #[test]
    fn signature_is_order_insensitive() {
        let adapter = BankAdapter::new("topsecret");
        let a = HashMap::from([
            ("txn_ref".to_string(), "x".to_string()),
            ("amount".to_string(), "5".to_string()),
        ]);
        let b = HashMap::from([
            ("amount".to_string(), "5".to_string()),
            ("txn_ref".to_string(), "x".to_string()),
        ]);
        assert_eq!(adapter.sign(&a), adapter.sign(&b));
    }
}

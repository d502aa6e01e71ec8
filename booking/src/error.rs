//! Error taxonomy for the booking engine.
//!
//! Split along the caller's recovery options: validation rejections the
//! customer can fix, conflicts that need a different selection, and
//! infrastructure faults. Gateway callbacks never surface these directly;
//! the checkout layer maps them into acknowledgements so gateways always
//! get a well-formed response.

use crate::types::{BookingReject, OrderId, SeatId, ShowtimeId, WalletReject};

/// Top-level error type for booking and payment operations
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// A booking command was rejected by validation
    #[error("order {order_id} rejected: {reject:?}")]
    Rejected {
        /// The order that was rejected
        order_id: OrderId,
        /// The recorded rejection
        reject: BookingReject,
    },

    /// Requested seats are already claimed by another order
    #[error("seats already taken for showtime {showtime_id}: {seats:?}")]
    SeatsTaken {
        /// The showtime in question
        showtime_id: ShowtimeId,
        /// The contested seats
        seats: Vec<SeatId>,
    },

    /// Order not found
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Order is in a state that does not admit the operation
    #[error("order {order_id} is {status}, cannot {operation}")]
    InvalidOrderState {
        /// The order
        order_id: OrderId,
        /// Current status, rendered
        status: String,
        /// What was attempted
        operation: &'static str,
    },

    /// Callback signature did not verify
    #[error("invalid signature on {gateway} callback")]
    InvalidSignature {
        /// Gateway that sent the callback
        gateway: &'static str,
    },

    /// Callback payload was missing fields or malformed
    #[error("malformed {gateway} callback: {detail}")]
    MalformedCallback {
        /// Gateway that sent the callback
        gateway: &'static str,
        /// What was wrong
        detail: String,
    },

    /// A wallet operation was rejected
    #[error("wallet operation rejected: {0:?}")]
    Wallet(WalletReject),

    /// Pricing configuration or arithmetic fault
    #[error(transparent)]
    Pricing(#[from] crate::pricing::PricingError),

    /// Store runtime failure
    #[error(transparent)]
    Store(#[from] cinebook_runtime::StoreError),
}

impl BookingError {
    /// Whether the error is a customer-recoverable rejection rather than a
    /// fault
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. }
                | Self::SeatsTaken { .. }
                | Self::InvalidOrderState { .. }
                | Self::Wallet(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_distinguished_from_faults() {
        let reject = BookingError::SeatsTaken {
            showtime_id: ShowtimeId::new(),
            seats: vec![SeatId::new()],
        };
        assert!(reject.is_rejection());

        let fault = BookingError::InvalidSignature { gateway: "bank" };
        assert!(!fault.is_rejection());
    }

    #[test]
    fn errors_render_without_panicking() {
        let err = BookingError::InvalidOrderState {
            order_id: OrderId::new(),
            status: "expired".into(),
            operation: "start payment",
        };
        let rendered = err.to_string();
        assert!(rendered.contains("expired"));
        assert!(rendered.contains("start payment"));
    }
}

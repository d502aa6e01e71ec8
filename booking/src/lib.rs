//! # Cinebook Booking
//!
//! Booking and payment reconciliation engine for cinema ticketing.
//!
//! Three aggregates, each a pure reducer behind a [`cinebook_runtime::Store`]:
//!
//! - **Schedule**: showtime calendar with room conflict checking
//! - **Booking**: the pending-order saga (seat claims, pricing, settlement
//!   reconciliation, hold expiry)
//! - **Wallet**: PIN-gated prepaid balance with an append-only ledger
//!
//! [`service::CheckoutService`] composes the stores with the gateway
//! adapters in [`gateway`] and is the intended entry point.

pub mod aggregates;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pricing;
pub mod service;
pub mod sweep;
pub mod types;

pub use config::Config;
pub use error::BookingError;
pub use service::CheckoutService;

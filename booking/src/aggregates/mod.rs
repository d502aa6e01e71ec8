//! Aggregate reducers.
//!
//! Each aggregate is a pure reducer over its own state. Commands validate
//! against current state and emit events; events fold deterministically.
//! The store serializes all commands for an aggregate under one write lock,
//! so a reducer body is the critical section in which check-then-claim
//! decisions are race-free.

pub mod booking;
pub mod schedule;
pub mod wallet;

pub use booking::{BookingAction, BookingEnvironment, BookingReducer};
pub use schedule::{ScheduleAction, ScheduleEnvironment, ScheduleReducer};
pub use wallet::{WalletAction, WalletEnvironment, WalletReducer};

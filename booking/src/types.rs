//! Domain types for the cinema booking engine.
//!
//! Value objects, entities, and aggregate states. Identifiers are newtypes
//! over `Uuid`; money is an integer count of minor currency units so that
//! pricing arithmetic never touches floating point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::pricing::PriceBreakdown;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a movie
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovieId(Uuid);

impl MovieId {
    /// Creates a new random `MovieId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `MovieId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MovieId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a screening room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(Uuid);

impl RoomId {
    /// Creates a new random `RoomId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a showtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShowtimeId(Uuid);

impl ShowtimeId {
    /// Creates a new random `ShowtimeId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ShowtimeId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ShowtimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShowtimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a seat
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatId(Uuid);

impl SeatId {
    /// Creates a new random `SeatId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SeatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse an `OrderId` from its canonical string form
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for a malformed UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a customer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(Uuid);

impl CustomerId {
    /// Creates a new random `CustomerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `CustomerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a voucher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoucherId(Uuid);

impl VoucherId {
    /// Creates a new random `VoucherId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoucherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a wallet
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId(Uuid);

impl WalletId {
    /// Creates a new random `WalletId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a wallet ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Creates a new random `TxnId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money value object (integer minor units, no floating point)
// ============================================================================

/// An amount of money in minor currency units
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two amounts, saturating at `u64::MAX`
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts two amounts (None if the result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Subtracts, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies by a quantity with overflow checking
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Takes a percentage of this amount, rounding half up.
    ///
    /// This is the single rounding point of the pricing pipeline: discounts
    /// are computed in exact integer arithmetic and rounded once here.
    #[must_use]
    pub const fn percent_half_up(self, percent: u32) -> Option<Self> {
        match self.0.checked_mul(percent as u64) {
            Some(product) => match product.checked_add(50) {
                Some(rounded) => Some(Self(rounded / 100)),
                None => None,
            },
            None => None,
        }
    }

    /// The smaller of two amounts
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Catalog entities (rooms, seats, showtimes, vouchers)
// ============================================================================

/// Seat category used by the price table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatKind {
    /// Regular seat
    Standard,
    /// VIP seat
    Vip,
    /// Double-width couple seat
    Couple,
}

impl fmt::Display for SeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Vip => write!(f, "VIP"),
            Self::Couple => write!(f, "Couple"),
        }
    }
}

/// Room category used by the price table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    /// Regular projection room
    Standard,
    /// Large-format room
    Imax,
    /// Premium room
    Premium,
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "Standard"),
            Self::Imax => write!(f, "IMAX"),
            Self::Premium => write!(f, "Premium"),
        }
    }
}

/// A screening room
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Unique room identifier
    pub id: RoomId,
    /// Room name (e.g. "Room 3")
    pub name: String,
    /// Room category
    pub kind: RoomKind,
}

/// A physical seat, static per room
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Unique seat identifier
    pub id: SeatId,
    /// Room this seat belongs to
    pub room_id: RoomId,
    /// Seat label (e.g. "G-07")
    pub label: String,
    /// Seat category
    pub kind: SeatKind,
}

/// A scheduled screening of a movie version in a room.
///
/// The interval is half-open `[start, end)`; two showtimes in the same room
/// must never overlap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    /// Unique showtime identifier
    pub id: ShowtimeId,
    /// Movie version being screened
    pub movie_id: MovieId,
    /// Room the screening runs in
    pub room_id: RoomId,
    /// Screening start (inclusive)
    pub start: DateTime<Utc>,
    /// Screening end (exclusive)
    pub end: DateTime<Utc>,
}

impl Showtime {
    /// Whether two half-open intervals overlap
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Who a voucher applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherScope {
    /// Any customer, any movie
    Global,
    /// A single customer
    Customer(CustomerId),
    /// Orders for a specific movie
    Movie(MovieId),
}

/// Discount carried by a voucher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discount {
    /// Percentage off the order line total (0..=100)
    Percent(u32),
    /// Flat amount off, clamped at the line total
    Amount(Money),
}

/// A discount voucher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    /// Unique voucher identifier
    pub id: VoucherId,
    /// Redemption code entered by the customer
    pub code: String,
    /// Applicability scope
    pub scope: VoucherScope,
    /// The discount rule
    pub discount: Discount,
    /// Maximum total redemptions (None = unlimited)
    pub usage_limit: Option<u32>,
}

// ============================================================================
// Booking entities
// ============================================================================

/// A durable ticket, created only when an order is confirmed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Showtime this ticket admits to
    pub showtime_id: ShowtimeId,
    /// The seat
    pub seat_id: SeatId,
    /// Owning order
    pub order_id: OrderId,
}

/// Order lifecycle status.
///
/// `Confirmed`, `Failed`, and `Expired` are terminal: once reached, no
/// callback or sweep may change the status again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order constructed and priced; seats not yet claimed
    Draft,
    /// Seats exclusively claimed, hold timer running
    SeatsHeld,
    /// Customer redirected to a gateway or wallet debit initiated
    AwaitingPayment,
    /// Settlement verified; tickets issued
    Confirmed,
    /// Payment failed or order cancelled; seats released
    Failed {
        /// Failure reason
        reason: String,
    },
    /// Hold timed out; seats released
    Expired,
}

impl OrderStatus {
    /// Whether the status is terminal and immutable
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed { .. } | Self::Expired)
    }

    /// Whether a settlement may still be applied
    #[must_use]
    pub const fn is_payable(&self) -> bool {
        matches!(self, Self::AwaitingPayment)
    }

    /// Whether the customer may still cancel
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::SeatsHeld | Self::AwaitingPayment)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::SeatsHeld => write!(f, "seats_held"),
            Self::AwaitingPayment => write!(f, "awaiting_payment"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// A customer order: the saga root entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Customer who placed the order (always passed in explicitly)
    pub customer_id: CustomerId,
    /// Showtime the seats are for
    pub showtime_id: ShowtimeId,
    /// Claimed seats
    pub seats: Vec<SeatId>,
    /// Voucher applied to the price, if any
    pub voucher: Option<VoucherId>,
    /// Full price breakdown at placement time
    pub pricing: PriceBreakdown,
    /// Amount a settlement must match exactly
    pub total_amount: Money,
    /// Saga status
    pub status: OrderStatus,
    /// Gateway chosen for payment, once payment started
    pub gateway: Option<crate::gateway::GatewayKind>,
    /// External correlation id (bank txn ref or app transaction id)
    pub correlation: Option<String>,
    /// When the seat hold lapses
    pub expires_at: DateTime<Utc>,
    /// When the order was placed
    pub created_at: DateTime<Utc>,
}

/// Ephemeral staging record for app-transaction-id gateways.
///
/// Lets an asynchronous callback that carries only the gateway's own
/// correlation id be mapped back to the order. Deleted on reconciliation
/// or expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Gateway correlation id (unique per gateway)
    pub app_trans_id: String,
    /// The order being paid
    pub order_id: OrderId,
    /// Expected settlement amount
    pub amount: Money,
    /// Mirror of the order's hold expiry
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Wallet entities
// ============================================================================

/// A customer wallet (1:1 per customer, non-negative balance)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet identifier
    pub id: WalletId,
    /// Owning customer
    pub customer_id: CustomerId,
    /// Current balance; always equals the signed sum of the ledger
    pub balance: Money,
}

/// Append-only wallet ledger entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Unique entry identifier
    pub id: TxnId,
    /// Wallet this entry belongs to
    pub wallet_id: WalletId,
    /// Signed amount in minor units (negative = debit)
    pub amount: i64,
    /// Caller-supplied idempotency reference
    pub reference_code: String,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Catalog (read-only inputs assembled by the entity layer)
// ============================================================================

/// Read-only catalog snapshot injected into the booking environment.
///
/// The booking reducer performs lookups only; catalog mutation belongs to
/// the scheduling/entity layer, which is outside this engine.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    /// Rooms by id
    pub rooms: HashMap<RoomId, Room>,
    /// Seats by id
    pub seats: HashMap<SeatId, Seat>,
    /// Showtimes by id
    pub showtimes: HashMap<ShowtimeId, Showtime>,
    /// Vouchers by redemption code
    pub vouchers: HashMap<String, Voucher>,
    /// Configured prices per (seat kind, room kind)
    pub price_table: crate::pricing::PriceTable,
}

impl Catalog {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a room
    pub fn add_room(&mut self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    /// Adds a seat
    pub fn add_seat(&mut self, seat: Seat) {
        self.seats.insert(seat.id, seat);
    }

    /// Adds a showtime
    pub fn add_showtime(&mut self, showtime: Showtime) {
        self.showtimes.insert(showtime.id, showtime);
    }

    /// Adds a voucher, indexed by its code
    pub fn add_voucher(&mut self, voucher: Voucher) {
        self.vouchers.insert(voucher.code.clone(), voucher);
    }
}

// ============================================================================
// Aggregate states
// ============================================================================

/// State for the Schedule aggregate
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ScheduleState {
    /// All showtimes indexed by id
    pub showtimes: HashMap<ShowtimeId, Showtime>,
    /// Showtimes that have at least one sold ticket (frozen)
    pub ticketed: HashSet<ShowtimeId>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl ScheduleState {
    /// Creates a new empty `ScheduleState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a showtime by id
    #[must_use]
    pub fn get(&self, id: &ShowtimeId) -> Option<&Showtime> {
        self.showtimes.get(id)
    }

    /// Whether a showtime is frozen by existing tickets
    #[must_use]
    pub fn is_locked(&self, id: &ShowtimeId) -> bool {
        self.ticketed.contains(id)
    }

    /// Returns the number of showtimes
    #[must_use]
    pub fn count(&self) -> usize {
        self.showtimes.len()
    }
}

/// Reasons a booking command was rejected, recorded per order for the
/// checkout boundary to surface without side effects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingReject {
    /// Some requested seats already carry a claim
    SeatsTaken {
        /// The contested seats
        seats: Vec<SeatId>,
    },
    /// Showtime not present in the catalog
    UnknownShowtime,
    /// A requested seat is unknown or in the wrong room
    InvalidSeat {
        /// The offending seat
        seat_id: SeatId,
    },
    /// No seats requested
    EmptySeatSelection,
    /// No price row for the seat/room combination
    PricingNotConfigured {
        /// Seat kind without a price row
        seat_kind: SeatKind,
        /// Room kind without a price row
        room_kind: RoomKind,
    },
    /// Order id collision or command out of sequence
    InvalidState {
        /// Explanation
        detail: String,
    },
    /// Identity mismatch: the caller does not own the order
    NotOwner,
}

/// Why a settlement terminated its order.
///
/// Acknowledgement codes are derived from this, so the cause is typed
/// rather than carried as prose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementFailure {
    /// The gateway reported an amount different from the order total
    AmountMismatch {
        /// The order total
        expected: Money,
        /// What the gateway reported
        actual: Money,
    },
    /// The gateway reported the payment itself failed
    GatewayDeclined,
}

impl fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmountMismatch { expected, actual } => {
                write!(f, "amount mismatch: expected {expected}, gateway reported {actual}")
            },
            Self::GatewayDeclined => write!(f, "gateway declined the payment"),
        }
    }
}

/// Outcome recorded for each settlement correlation id.
///
/// Gateways retry callbacks until acknowledged, so the first disposition is
/// remembered and replayed verbatim for duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementDisposition {
    /// Settlement applied; order confirmed
    Confirmed {
        /// The confirmed order
        order_id: OrderId,
    },
    /// Settlement terminated the order
    Failed {
        /// The failed order
        order_id: OrderId,
        /// Why the order failed
        cause: SettlementFailure,
    },
    /// Order already terminal when the callback arrived (idempotent no-op)
    AlreadySettled {
        /// The order in question
        order_id: OrderId,
    },
    /// Correlation id unknown or swept; acknowledged and dropped
    Ignored,
}

/// State for the Booking aggregate (pending-order saga)
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BookingState {
    /// All orders indexed by id
    pub orders: HashMap<OrderId, Order>,
    /// Durable tickets indexed by id
    pub tickets: HashMap<TicketId, Ticket>,
    /// Exclusive seat claims: the uniqueness backstop for (showtime, seat)
    pub claims: HashMap<(ShowtimeId, SeatId), OrderId>,
    /// Staging records for app-transaction-id gateways
    pub pending: HashMap<String, PendingOrder>,
    /// Vouchers consumed by confirmed orders: (voucher, customer)
    pub consumed_vouchers: HashSet<(VoucherId, CustomerId)>,
    /// Total confirmed redemptions per voucher
    pub voucher_redemptions: HashMap<VoucherId, u32>,
    /// First disposition per settlement correlation key
    pub settlement_log: HashMap<String, SettlementDisposition>,
    /// Rejections per order id for the checkout boundary
    pub rejections: HashMap<OrderId, BookingReject>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl BookingState {
    /// Creates a new empty `BookingState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an order by id
    #[must_use]
    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Whether a seat is claimed for a showtime
    #[must_use]
    pub fn is_claimed(&self, showtime_id: ShowtimeId, seat_id: SeatId) -> bool {
        self.claims.contains_key(&(showtime_id, seat_id))
    }

    /// Tickets belonging to one order
    #[must_use]
    pub fn tickets_for(&self, order_id: &OrderId) -> Vec<&Ticket> {
        self.tickets
            .values()
            .filter(|t| t.order_id == *order_id)
            .collect()
    }

    /// Returns the number of orders
    #[must_use]
    pub fn count(&self) -> usize {
        self.orders.len()
    }
}

/// Reasons a wallet operation was rejected, keyed by reference code
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletReject {
    /// Wallet id unknown
    UnknownWallet,
    /// Customer or wallet id already has a wallet
    WalletExists,
    /// No PIN configured or PIN mismatch
    InvalidPin,
    /// Balance lower than the debit amount
    InsufficientFunds,
    /// Reference code already recorded for this wallet
    DuplicateReference,
    /// Zero or otherwise invalid amount
    InvalidAmount,
}

/// State for the Wallet aggregate
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct WalletState {
    /// Wallets indexed by id
    pub wallets: HashMap<WalletId, Wallet>,
    /// Wallet lookup per customer (1:1)
    pub by_customer: HashMap<CustomerId, WalletId>,
    /// Append-only ledger per wallet
    pub ledgers: HashMap<WalletId, Vec<WalletTransaction>>,
    /// PIN digests per wallet
    pub pins: HashMap<WalletId, String>,
    /// Reference codes already applied per wallet
    pub seen_references: HashMap<WalletId, HashSet<String>>,
    /// Rejections per reference code for the checkout boundary
    pub rejections: HashMap<String, WalletReject>,
    /// Last validation error
    pub last_error: Option<String>,
}

impl WalletState {
    /// Creates a new empty `WalletState`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a wallet by id
    #[must_use]
    pub fn get(&self, id: &WalletId) -> Option<&Wallet> {
        self.wallets.get(id)
    }

    /// The ledger for a wallet (empty slice if none)
    #[must_use]
    pub fn ledger(&self, id: &WalletId) -> &[WalletTransaction] {
        self.ledgers.get(id).map_or(&[], Vec::as_slice)
    }

    /// Signed sum of a wallet's ledger, for invariant checks
    #[must_use]
    pub fn ledger_sum(&self, id: &WalletId) -> i64 {
        self.ledger(id).iter().map(|t| t.amount).sum()
    }
}

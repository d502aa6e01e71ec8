//! Wallet aggregate: PIN-gated balance with an append-only ledger.
//!
//! The balance is derived data: it always equals the signed sum of the
//! wallet's ledger entries, and both are updated in the same event fold.
//! Every debit and credit carries a caller-supplied reference code; a
//! reference seen before on the same wallet is rejected, which is what
//! makes checkout retries and payment reversals safe to re-send.

use cinebook_core::environment::Clock;
use cinebook_core::reducer::{Effects, Reducer};
use cinebook_core::{Effect, smallvec};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::types::{
    CustomerId, Money, TxnId, Wallet, WalletId, WalletReject, WalletState, WalletTransaction,
};

/// Actions for the Wallet aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WalletAction {
    // Commands
    /// Open a wallet for a customer with an initial PIN
    OpenWallet {
        /// Pre-allocated wallet id
        wallet_id: WalletId,
        /// Owning customer
        customer_id: CustomerId,
        /// Initial PIN, hashed before storage
        pin: String,
    },
    /// Top the wallet up (no PIN; money entering needs no authorization)
    Credit {
        /// The wallet
        wallet_id: WalletId,
        /// Amount in minor units
        amount: Money,
        /// Idempotency reference
        reference_code: String,
    },
    /// Debit the wallet for a payment; requires the correct PIN
    Debit {
        /// The wallet
        wallet_id: WalletId,
        /// Amount in minor units
        amount: Money,
        /// PIN presented by the customer
        pin: String,
        /// Idempotency reference
        reference_code: String,
    },

    // Events
    /// A wallet was opened
    WalletOpened {
        /// The new wallet
        wallet: Wallet,
        /// PIN digest
        pin_digest: String,
    },
    /// A ledger entry was appended and the balance moved with it
    TransactionAppended {
        /// The entry
        transaction: WalletTransaction,
    },
    /// A command was rejected
    OperationRejected {
        /// Reference code of the rejected command
        reference_code: String,
        /// Why
        reject: WalletReject,
    },
}

/// Environment for the Wallet aggregate
#[derive(Clone)]
pub struct WalletEnvironment {
    /// Clock for ledger timestamps
    pub clock: Arc<dyn Clock>,
    /// Salt mixed into PIN digests
    pub pin_salt: String,
}

impl WalletEnvironment {
    /// Creates an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, pin_salt: impl Into<String>) -> Self {
        Self {
            clock,
            pin_salt: pin_salt.into(),
        }
    }

    /// Salted SHA-256 digest of a PIN
    #[must_use]
    pub fn digest_pin(&self, pin: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pin_salt.as_bytes());
        hasher.update(pin.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Reducer for the Wallet aggregate
#[derive(Clone, Copy, Debug, Default)]
pub struct WalletReducer;

impl WalletReducer {
    /// Creates a new `WalletReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut WalletState,
        reference_code: String,
        reject: WalletReject,
    ) -> Effects<WalletAction> {
        warn!(reference = %reference_code, reject = ?reject, "wallet command rejected");
        state.last_error = Some(format!("{reject:?}"));
        apply_event(state, &WalletAction::OperationRejected {
            reference_code,
            reject,
        });
        smallvec![Effect::None]
    }

    fn credit(
        state: &mut WalletState,
        env: &WalletEnvironment,
        wallet_id: WalletId,
        amount: Money,
        reference_code: String,
    ) -> Effects<WalletAction> {
        if !state.wallets.contains_key(&wallet_id) {
            return Self::reject(state, reference_code, WalletReject::UnknownWallet);
        }
        if amount.is_zero() {
            return Self::reject(state, reference_code, WalletReject::InvalidAmount);
        }
        if state
            .seen_references
            .get(&wallet_id)
            .is_some_and(|refs| refs.contains(&reference_code))
        {
            return Self::reject(state, reference_code, WalletReject::DuplicateReference);
        }

        state.last_error = None;
        let transaction = WalletTransaction {
            id: TxnId::new(),
            wallet_id,
            amount: i64::try_from(amount.minor()).unwrap_or(i64::MAX),
            reference_code,
            created_at: env.clock.now(),
        };
        info!(wallet_id = %wallet_id, amount = %amount, "wallet credited");
        apply_event(state, &WalletAction::TransactionAppended { transaction });
        smallvec![Effect::None]
    }

    fn debit(
        state: &mut WalletState,
        env: &WalletEnvironment,
        wallet_id: WalletId,
        amount: Money,
        pin: &str,
        reference_code: String,
    ) -> Effects<WalletAction> {
        let Some(wallet) = state.wallets.get(&wallet_id) else {
            return Self::reject(state, reference_code, WalletReject::UnknownWallet);
        };

        // PIN first: an attacker probing references learns nothing about
        // balances without the PIN.
        let presented = env.digest_pin(pin);
        if state.pins.get(&wallet_id) != Some(&presented) {
            return Self::reject(state, reference_code, WalletReject::InvalidPin);
        }
        if amount.is_zero() {
            return Self::reject(state, reference_code, WalletReject::InvalidAmount);
        }
        if state
            .seen_references
            .get(&wallet_id)
            .is_some_and(|refs| refs.contains(&reference_code))
        {
            return Self::reject(state, reference_code, WalletReject::DuplicateReference);
        }
        if wallet.balance < amount {
            return Self::reject(state, reference_code, WalletReject::InsufficientFunds);
        }

        state.last_error = None;
        let transaction = WalletTransaction {
            id: TxnId::new(),
            wallet_id,
            amount: -i64::try_from(amount.minor()).unwrap_or(i64::MAX),
            reference_code,
            created_at: env.clock.now(),
        };
        info!(wallet_id = %wallet_id, amount = %amount, "wallet debited");
        apply_event(state, &WalletAction::TransactionAppended { transaction });
        smallvec![Effect::None]
    }
}

impl Reducer for WalletReducer {
    type State = WalletState;
    type Action = WalletAction;
    type Environment = WalletEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            WalletAction::OpenWallet {
                wallet_id,
                customer_id,
                pin,
            } => {
                if state.wallets.contains_key(&wallet_id)
                    || state.by_customer.contains_key(&customer_id)
                {
                    return Self::reject(
                        state,
                        format!("open:{wallet_id}"),
                        WalletReject::WalletExists,
                    );
                }
                state.last_error = None;
                let wallet = Wallet {
                    id: wallet_id,
                    customer_id,
                    balance: Money::ZERO,
                };
                info!(wallet_id = %wallet_id, customer_id = %customer_id, "wallet opened");
                apply_event(state, &WalletAction::WalletOpened {
                    wallet,
                    pin_digest: env.digest_pin(&pin),
                });
                smallvec![Effect::None]
            },
            WalletAction::Credit {
                wallet_id,
                amount,
                reference_code,
            } => Self::credit(state, env, wallet_id, amount, reference_code),
            WalletAction::Debit {
                wallet_id,
                amount,
                pin,
                reference_code,
            } => Self::debit(state, env, wallet_id, amount, &pin, reference_code),

            event @ (WalletAction::WalletOpened { .. }
            | WalletAction::TransactionAppended { .. }
            | WalletAction::OperationRejected { .. }) => {
                apply_event(state, &event);
                smallvec![Effect::None]
            },
        }
    }
}

/// Folds an event into state. The ledger append and the balance update
/// happen together so the sum invariant holds after every fold.
fn apply_event(state: &mut WalletState, event: &WalletAction) {
    match event {
        WalletAction::WalletOpened { wallet, pin_digest } => {
            state.by_customer.insert(wallet.customer_id, wallet.id);
            state.pins.insert(wallet.id, pin_digest.clone());
            state.ledgers.insert(wallet.id, Vec::new());
            state.wallets.insert(wallet.id, wallet.clone());
        },
        WalletAction::TransactionAppended { transaction } => {
            if let Some(wallet) = state.wallets.get_mut(&transaction.wallet_id) {
                let magnitude = Money::from_minor(transaction.amount.unsigned_abs());
                wallet.balance = if transaction.amount >= 0 {
                    wallet.balance.saturating_add(magnitude)
                } else {
                    wallet.balance.saturating_sub(magnitude)
                };
            }
            state
                .seen_references
                .entry(transaction.wallet_id)
                .or_default()
                .insert(transaction.reference_code.clone());
            // A success supersedes any rejection recorded for an earlier
            // attempt under the same reference.
            state.rejections.remove(&transaction.reference_code);
            state
                .ledgers
                .entry(transaction.wallet_id)
                .or_default()
                .push(transaction.clone());
        },
        WalletAction::OperationRejected {
            reference_code,
            reject,
        } => {
            state.rejections.insert(reference_code.clone(), reject.clone());
        },
        // Commands never reach the fold
        _ => {},
    }
}

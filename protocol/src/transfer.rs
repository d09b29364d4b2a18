//! # Value Transfer
//!
//! The ledger runtime owns the money. Contracts ask it to pull value from a
//! party into custody ([`ValueTransfer::transfer_in`]) or push value from
//! custody to a party ([`ValueTransfer::transfer_out`]), and get back a
//! success or a [`TransferError`].
//!
//! Implementations must be atomic per call: when a transfer fails, neither
//! the party's balance nor the custody balance has changed.

use thiserror::Error;

use crate::address::Address;

/// A quantity of the single native asset, in its smallest unit.
pub type Amount = u64;

/// Reasons the value-transfer collaborator refused to move funds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The paying account does not hold enough.
    #[error("insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The account being debited.
        account: Address,
        /// Its current balance.
        available: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// Custody holds less than the amount being paid out.
    #[error("insufficient custody: available {available}, requested {requested}")]
    InsufficientCustody {
        /// Current custody balance.
        available: Amount,
        /// The amount requested.
        requested: Amount,
    },

    /// The account is frozen and may neither send nor receive.
    #[error("account {0} is frozen")]
    AccountFrozen(Address),

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow while crediting {0}")]
    Overflow(Address),
}

/// Moves value between parties and the core's custody.
pub trait ValueTransfer {
    /// Moves `amount` from `from` into custody.
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Moves `amount` out of custody to `to`.
    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

impl<T: ValueTransfer + ?Sized> ValueTransfer for &mut T {
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        (**self).transfer_in(from, amount)
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        (**self).transfer_out(to, amount)
    }
}

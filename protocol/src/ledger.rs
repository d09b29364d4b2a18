//! # Account Ledger
//!
//! Maps addresses to account states and holds one custody balance: the value
//! the contracts are escrowing on behalf of everyone. The ledger is the
//! node's implementation of [`ValueTransfer`].
//!
//! ## Transfers
//!
//! `transfer_in(from, A)`:
//!
//! 1. Verify `from` is not frozen.
//! 2. Verify `from.balance >= A` and `custody + A` does not overflow.
//! 3. `from.balance -= A`, `custody += A`.
//!
//! `transfer_out(to, A)` is the mirror image. All checks happen before the
//! first write, so a rejected transfer changes nothing.
//!
//! ## Conservation
//!
//! Value only enters through [`Ledger::mint`]. At every point
//! `sum(balances) + custody == minted`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::address::Address;
use crate::transfer::{Amount, TransferError, ValueTransfer};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from ledger administration (minting, restoring).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Minting would overflow the account or the total supply.
    #[error("mint overflow: crediting {amount} to {account}")]
    MintOverflow {
        /// The account being credited.
        account: Address,
        /// The amount requested.
        amount: Amount,
    },

    /// Minted zero.
    #[error("mint amount must be positive")]
    ZeroMint,

    /// A restored snapshot does not add up.
    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),
}

// ---------------------------------------------------------------------------
// AccountState
// ---------------------------------------------------------------------------

/// State of a single account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Spendable balance.
    pub balance: Amount,
    /// Whether this account is frozen (compliance hold, dispute, etc.).
    pub frozen: bool,
}

impl AccountState {
    /// Create a new account with the given initial balance.
    pub fn with_balance(balance: Amount) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// In-memory account ledger with a single custody pool.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    accounts: HashMap<Address, AccountState>,
    custody: Amount,
    minted: Amount,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted parts.
    ///
    /// `minted` is the total supply recorded alongside the accounts. It is
    /// kept as-is rather than recomputed, so [`is_conserved`](Self::is_conserved)
    /// reports a snapshot that lost an account or custody write. Pass `None`
    /// for a store that never recorded it; the supply is then summed from the
    /// snapshot.
    pub fn restore(
        accounts: impl IntoIterator<Item = (Address, AccountState)>,
        custody: Amount,
        minted: Option<Amount>,
    ) -> Result<Self, LedgerError> {
        let accounts: HashMap<Address, AccountState> = accounts.into_iter().collect();
        let held = accounts
            .values()
            .try_fold(custody, |acc, a| acc.checked_add(a.balance))
            .ok_or_else(|| {
                LedgerError::InconsistentSnapshot("total supply exceeds u64".into())
            })?;

        let minted = minted.unwrap_or(held);
        if held != minted {
            tracing::warn!(held, minted, "restored ledger does not add up to total supply");
        }

        Ok(Self {
            accounts,
            custody,
            minted,
        })
    }

    /// Create new value in `to`'s account. Devnet faucet only.
    pub fn mint(&mut self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroMint);
        }
        let overflow = || LedgerError::MintOverflow {
            account: *to,
            amount,
        };

        let current = self.balance_of(to);
        let new_balance = current.checked_add(amount).ok_or_else(overflow)?;
        let new_minted = self.minted.checked_add(amount).ok_or_else(overflow)?;

        self.accounts.entry(*to).or_default().balance = new_balance;
        self.minted = new_minted;

        tracing::debug!(account = %to, amount, balance = new_balance, "minted");
        Ok(())
    }

    /// Spendable balance of `address`; zero for unknown accounts.
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    /// Account state for `address`, if it has ever held value.
    pub fn account(&self, address: &Address) -> Option<&AccountState> {
        self.accounts.get(address)
    }

    /// Freeze an account so transfers touching it fail.
    pub fn freeze(&mut self, address: &Address) {
        self.accounts.entry(*address).or_default().frozen = true;
        tracing::info!(account = %address, "account frozen");
    }

    /// Lift a freeze.
    pub fn unfreeze(&mut self, address: &Address) {
        if let Some(account) = self.accounts.get_mut(address) {
            account.frozen = false;
            tracing::info!(account = %address, "account unfrozen");
        }
    }

    /// Value currently held in custody.
    pub fn custody_balance(&self) -> Amount {
        self.custody
    }

    /// Total value ever minted.
    pub fn total_supply(&self) -> Amount {
        self.minted
    }

    /// Number of known accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if the ledger has no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterate over all (address, account_state) pairs.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &AccountState)> {
        self.accounts.iter()
    }

    /// Checks `sum(balances) + custody == minted`.
    pub fn is_conserved(&self) -> bool {
        self.accounts
            .values()
            .try_fold(self.custody, |acc, a| acc.checked_add(a.balance))
            == Some(self.minted)
    }

    fn ensure_not_frozen(&self, address: &Address) -> Result<(), TransferError> {
        match self.accounts.get(address) {
            Some(account) if account.frozen => Err(TransferError::AccountFrozen(*address)),
            _ => Ok(()),
        }
    }
}

impl ValueTransfer for Ledger {
    fn transfer_in(&mut self, from: &Address, amount: Amount) -> Result<(), TransferError> {
        self.ensure_not_frozen(from)?;

        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                account: *from,
                available,
                requested: amount,
            });
        }
        let new_custody = self
            .custody
            .checked_add(amount)
            .ok_or(TransferError::Overflow(*from))?;

        if let Some(account) = self.accounts.get_mut(from) {
            account.balance = available - amount;
        }
        self.custody = new_custody;

        tracing::debug!(from = %from, amount, custody = self.custody, "value moved into custody");
        Ok(())
    }

    fn transfer_out(&mut self, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.ensure_not_frozen(to)?;

        if self.custody < amount {
            return Err(TransferError::InsufficientCustody {
                available: self.custody,
                requested: amount,
            });
        }
        let new_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow(*to))?;

        self.custody -= amount;
        self.accounts.entry(*to).or_default().balance = new_balance;

        tracing::debug!(to = %to, amount, custody = self.custody, "value released from custody");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

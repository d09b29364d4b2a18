//! # Contribution Accounting
//!
//! Value conservation helpers shared by every money-moving campaign
//! operation:
//!
//! - [`checked_credit`] / [`checked_debit`]: overflow-checked arithmetic.
//! - [`ContributionLedger`]: who gave how much, with a running total of
//!   what is still held.
//! - [`EscrowAudit`]: verifies a campaign's books against the conservation
//!   invariants.
//!
//! A contributor's entry goes to zero when refunded but the key stays, so the
//! ledger doubles as a record of everyone who ever contributed.

use crowdx_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::campaign::CampaignState;
use crate::error::CampaignError;

/// `current + amount`, or [`CampaignError::AmountOverflow`].
pub fn checked_credit(current: Amount, amount: Amount) -> Result<Amount, CampaignError> {
    current
        .checked_add(amount)
        .ok_or(CampaignError::AmountOverflow)
}

/// `current - amount`, or [`CampaignError::AmountOverflow`] on underflow.
pub fn checked_debit(current: Amount, amount: Amount) -> Result<Amount, CampaignError> {
    current
        .checked_sub(amount)
        .ok_or(CampaignError::AmountOverflow)
}

/// Whole percent of `goal` covered by `raised`. Exceeds 100 when a campaign
/// is overfunded; zero when there is no goal.
pub fn progress_percent(raised: Amount, goal: Amount) -> u64 {
    if goal == 0 {
        return 0;
    }
    let pct = u128::from(raised) * 100 / u128::from(goal);
    u64::try_from(pct).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// ContributionLedger
// ---------------------------------------------------------------------------

/// Per-contributor amounts currently held, keyed by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionLedger {
    entries: BTreeMap<Address, Amount>,
    held: Amount,
}

impl ContributionLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that crediting `amount` to `who` would not overflow.
    pub fn ensure_can_credit(&self, who: &Address, amount: Amount) -> Result<(), CampaignError> {
        checked_credit(self.amount_of(who), amount)?;
        checked_credit(self.held, amount)?;
        Ok(())
    }

    /// Adds `amount` to `who`'s entry. Returns the new entry.
    pub fn credit(&mut self, who: &Address, amount: Amount) -> Result<Amount, CampaignError> {
        let entry = checked_credit(self.amount_of(who), amount)?;
        let held = checked_credit(self.held, amount)?;
        self.entries.insert(*who, entry);
        self.held = held;
        Ok(entry)
    }

    /// Zeroes `who`'s entry and returns what it held.
    pub fn take(&mut self, who: &Address) -> Amount {
        match self.entries.get_mut(who) {
            Some(entry) if *entry > 0 => {
                let amount = std::mem::take(entry);
                self.held -= amount;
                amount
            }
            _ => 0,
        }
    }

    /// Undoes a [`take`](Self::take) whose payout failed.
    pub fn restore(&mut self, who: &Address, amount: Amount) -> Result<(), CampaignError> {
        self.credit(who, amount).map(|_| ())
    }

    /// Amount currently held for `who`.
    pub fn amount_of(&self, who: &Address) -> Amount {
        self.entries.get(who).copied().unwrap_or(0)
    }

    /// Sum of all entries still held.
    pub fn held(&self) -> Amount {
        self.held
    }

    /// Sum of all entries, recomputed from scratch.
    pub fn recount(&self) -> Option<Amount> {
        self.entries
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
    }

    /// Everyone who ever contributed, with what is still held for them.
    pub fn contributors(&self) -> impl Iterator<Item = (&Address, Amount)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Number of distinct contributors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nobody has contributed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EscrowAudit
// ---------------------------------------------------------------------------

/// A broken conservation invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// The ledger's running total disagrees with its entries.
    #[error("ledger total {recorded} does not match entry sum {recounted:?}")]
    LedgerTotalDrift {
        /// The running total.
        recorded: Amount,
        /// The recomputed sum (None on overflow).
        recounted: Option<Amount>,
    },

    /// `total_raised` and the contributor ledger disagree before any drain.
    #[error("total raised {total_raised} does not match contributions {contributions}")]
    RaisedMismatch {
        /// The campaign's `total_raised`.
        total_raised: Amount,
        /// The ledger sum.
        contributions: Amount,
    },

    /// Escrow balance differs from what the state says it must hold.
    #[error("escrow balance {actual} but {state:?} campaign must hold {expected}")]
    EscrowMismatch {
        /// The campaign state.
        state: CampaignState,
        /// What the escrow should hold.
        expected: Amount,
        /// What it does hold.
        actual: Amount,
    },

    /// `withdrawn` is set on a campaign that did not succeed.
    #[error("withdrawn flag set on {0:?} campaign")]
    WithdrawnWithoutSuccess(CampaignState),
}

/// Snapshot of a campaign's books, checked against the conservation rules.
#[derive(Debug, Clone, Copy)]
pub struct EscrowAudit<'a> {
    /// Current state.
    pub state: CampaignState,
    /// Amount raised.
    pub total_raised: Amount,
    /// Whether the owner has withdrawn.
    pub withdrawn: bool,
    /// Value in custody for this campaign.
    pub escrow_balance: Amount,
    /// Per-contributor entries.
    pub contributions: &'a ContributionLedger,
}

impl EscrowAudit<'_> {
    /// Returns the first violated invariant, if any.
    pub fn check(&self) -> Result<(), InvariantViolation> {
        let recounted = self.contributions.recount();
        if recounted != Some(self.contributions.held()) {
            return Err(InvariantViolation::LedgerTotalDrift {
                recorded: self.contributions.held(),
                recounted,
            });
        }

        let held = self.contributions.held();
        let expected = match self.state {
            CampaignState::Active | CampaignState::Successful => {
                if held != self.total_raised {
                    return Err(InvariantViolation::RaisedMismatch {
                        total_raised: self.total_raised,
                        contributions: held,
                    });
                }
                if self.withdrawn {
                    0
                } else {
                    self.total_raised
                }
            }
            CampaignState::Failed => held,
        };

        if self.withdrawn && self.state != CampaignState::Successful {
            return Err(InvariantViolation::WithdrawnWithoutSuccess(self.state));
        }

        if self.escrow_balance != expected {
            return Err(InvariantViolation::EscrowMismatch {
                state: self.state,
                expected,
                actual: self.escrow_balance,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    #[test]
    fn credits_accumulate_per_contributor() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), 4).unwrap();
        ledger.credit(&addr("y"), 6).unwrap();
        assert_eq!(ledger.credit(&addr("x"), 1).unwrap(), 5);

        assert_eq!(ledger.amount_of(&addr("x")), 5);
        assert_eq!(ledger.held(), 11);
        assert_eq!(ledger.recount(), Some(11));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn take_zeroes_entry_once() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), 3).unwrap();

        assert_eq!(ledger.take(&addr("x")), 3);
        assert_eq!(ledger.take(&addr("x")), 0);
        assert_eq!(ledger.amount_of(&addr("x")), 0);
        assert_eq!(ledger.held(), 0);
        // The contributor is still on record.
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn restore_undoes_take() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), 3).unwrap();
        let taken = ledger.take(&addr("x"));
        ledger.restore(&addr("x"), taken).unwrap();
        assert_eq!(ledger.amount_of(&addr("x")), 3);
        assert_eq!(ledger.held(), 3);
    }

    #[test]
    fn overflowing_credit_changes_nothing() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), u64::MAX).unwrap();
        assert!(ledger.ensure_can_credit(&addr("y"), 1).is_err());
        assert_eq!(
            ledger.credit(&addr("y"), 1),
            Err(CampaignError::AmountOverflow)
        );
        assert_eq!(ledger.amount_of(&addr("y")), 0);
        assert_eq!(ledger.held(), u64::MAX);
    }

    #[test]
    fn progress_percent_rounds_down_and_overflows_past_100() {
        assert_eq!(progress_percent(0, 10), 0);
        assert_eq!(progress_percent(3, 10), 30);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(25, 10), 250);
        assert_eq!(progress_percent(5, 0), 0);
        assert_eq!(progress_percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn audit_flags_escrow_mismatch() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), 10).unwrap();
        let audit = EscrowAudit {
            state: CampaignState::Active,
            total_raised: 10,
            withdrawn: false,
            escrow_balance: 9,
            contributions: &ledger,
        };
        assert_eq!(
            audit.check(),
            Err(InvariantViolation::EscrowMismatch {
                state: CampaignState::Active,
                expected: 10,
                actual: 9,
            })
        );
    }

    #[test]
    fn audit_accepts_partially_refunded_failed_campaign() {
        let mut ledger = ContributionLedger::new();
        ledger.credit(&addr("x"), 3).unwrap();
        ledger.credit(&addr("y"), 2).unwrap();
        ledger.take(&addr("x"));
        let audit = EscrowAudit {
            state: CampaignState::Failed,
            total_raised: 5,
            withdrawn: false,
            escrow_balance: 2,
            contributions: &ledger,
        };
        assert_eq!(audit.check(), Ok(()));
    }

    #[test]
    fn audit_rejects_withdrawn_failed_campaign() {
        let ledger = ContributionLedger::new();
        let audit = EscrowAudit {
            state: CampaignState::Failed,
            total_raised: 0,
            withdrawn: true,
            escrow_balance: 0,
            contributions: &ledger,
        };
        assert_eq!(
            audit.check(),
            Err(InvariantViolation::WithdrawnWithoutSuccess(
                CampaignState::Failed
            ))
        );
    }
}

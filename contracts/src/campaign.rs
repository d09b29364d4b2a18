//! # Campaign Contract
//!
//! One funding campaign: its terms, its escrowed balance, its contributor
//! ledger and its state machine. The lifecycle is:
//!
//! 1. **Create**: the owner sets a goal and a duration; the deadline is
//!    fixed at `creation time + duration`.
//! 2. **Contribute**: anyone moves value into escrow while the campaign is
//!    `Active` and the deadline has not arrived.
//! 3. **Finalize**: once the deadline has passed, anyone resolves the
//!    campaign: `Successful` if `total_raised >= goal`, `Failed` otherwise.
//!    This happens exactly once.
//! 4. **Settle**: on success the owner withdraws everything once; on
//!    failure each contributor reclaims their own contribution once.
//!
//! ## Draining escrow
//!
//! Withdrawal and refund are two-phase. [`Campaign::begin_withdrawal`] and
//! [`Campaign::begin_refund`] commit the bookkeeping (set `withdrawn`, zero
//! the contributor's entry) and hand back a [`Payout`]. Only then is the
//! value-transfer collaborator asked to pay. If it refuses,
//! [`Campaign::abort_payout`] puts the books back exactly as they were.
//! Any call that lands while a payout is in flight sees the drained state and
//! is rejected by the ordinary guards.

use chrono::{DateTime, Duration, Utc};
use crowdx_protocol::config::{MAX_CAMPAIGN_DURATION_SECS, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH};
use crowdx_protocol::{Address, Amount, ValueTransfer};
use serde::{Deserialize, Serialize};

use crate::accounting::{
    checked_credit, checked_debit, progress_percent, ContributionLedger, EscrowAudit,
    InvariantViolation,
};
use crate::error::CampaignError;
use crate::events::CampaignEvent;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a campaign is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignState {
    /// Accepting contributions until the deadline.
    Active,
    /// Resolved with `total_raised >= goal`. Terminal.
    Successful,
    /// Resolved with `total_raised < goal`. Terminal.
    Failed,
}

impl CampaignState {
    /// Numeric encoding: Active = 0, Successful = 1, Failed = 2.
    pub fn code(&self) -> u8 {
        match self {
            CampaignState::Active => 0,
            CampaignState::Successful => 1,
            CampaignState::Failed => 2,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CampaignState::Active),
            1 => Some(CampaignState::Successful),
            2 => Some(CampaignState::Failed),
            _ => None,
        }
    }

    /// `true` once the campaign has been finalized.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CampaignState::Active)
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignState::Active => write!(f, "Active"),
            CampaignState::Successful => write!(f, "Successful"),
            CampaignState::Failed => write!(f, "Failed"),
        }
    }
}

/// Arguments to campaign creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignParams {
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Target amount. Must be positive.
    pub goal: Amount,
    /// Seconds from creation until contributions close. Must be positive.
    pub duration_secs: u64,
}

impl CampaignParams {
    /// Checks every creation rule.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignError::InvalidParameters`] naming the first rule broken.
    pub fn validate(&self) -> Result<(), CampaignError> {
        let invalid = |reason| Err(CampaignError::InvalidParameters { reason });

        if self.goal == 0 {
            return invalid("goal must be positive");
        }
        if self.duration_secs == 0 {
            return invalid("duration must be positive");
        }
        if self.duration_secs > MAX_CAMPAIGN_DURATION_SECS {
            return invalid("duration exceeds the maximum campaign length");
        }
        if self.title.trim().is_empty() {
            return invalid("title must not be empty");
        }
        if self.title.len() > MAX_TITLE_LENGTH {
            return invalid("title is too long");
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return invalid("description is too long");
        }
        Ok(())
    }
}

/// Consistent point-in-time view of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSummary {
    /// Creator.
    pub owner: Address,
    /// Target amount.
    pub goal: Amount,
    /// When contributions close.
    pub deadline: DateTime<Utc>,
    /// Amount raised.
    pub total_raised: Amount,
    /// Lifecycle state.
    pub state: CampaignState,
}

/// Which drain a [`Payout`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutKind {
    /// Owner withdrawal of a successful campaign.
    Withdrawal,
    /// Contributor refund from a failed campaign.
    Refund,
}

/// Value reserved out of escrow whose transfer has not happened yet.
///
/// Produced by the `begin_*` methods; hand it back to
/// [`Campaign::abort_payout`] if the transfer fails.
#[must_use = "a payout must be transferred or aborted"]
#[derive(Debug, PartialEq, Eq)]
pub struct Payout {
    kind: PayoutKind,
    recipient: Address,
    amount: Amount,
}

impl Payout {
    /// Withdrawal or refund.
    pub fn kind(&self) -> PayoutKind {
        self.kind
    }

    /// Who receives the value.
    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// How much.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// The notification for a payout that went through.
    pub fn into_event(self) -> CampaignEvent {
        match self.kind {
            PayoutKind::Withdrawal => CampaignEvent::FundsWithdrawn {
                owner: self.recipient,
                amount: self.amount,
            },
            PayoutKind::Refund => CampaignEvent::RefundClaimed {
                contributor: self.recipient,
                amount: self.amount,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// A funding campaign and its escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    owner: Address,
    title: String,
    description: String,
    goal: Amount,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    total_raised: Amount,
    contributions: ContributionLedger,
    state: CampaignState,
    withdrawn: bool,
    escrow_balance: Amount,
}

impl Campaign {
    /// Creates a new `Active` campaign with an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignError::InvalidParameters`] if the parameters fail
    /// [`CampaignParams::validate`], the owner is the zero address, or the
    /// deadline would fall outside the representable time range.
    pub fn new(
        owner: Address,
        params: CampaignParams,
        now: DateTime<Utc>,
    ) -> Result<Self, CampaignError> {
        params.validate()?;
        if owner.is_zero() {
            return Err(CampaignError::InvalidParameters {
                reason: "owner must not be the zero address",
            });
        }

        let deadline = i64::try_from(params.duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(CampaignError::InvalidParameters {
                reason: "deadline is out of range",
            })?;

        Ok(Self {
            owner,
            title: params.title,
            description: params.description,
            goal: params.goal,
            created_at: now,
            deadline,
            total_raised: 0,
            contributions: ContributionLedger::new(),
            state: CampaignState::Active,
            withdrawn: false,
            escrow_balance: 0,
        })
    }

    /// Moves `amount` from `caller` into escrow and records it.
    ///
    /// Repeated contributions from the same caller accumulate. The transfer
    /// happens before anything is recorded, so a refused transfer leaves the
    /// campaign untouched.
    ///
    /// # Errors
    ///
    /// - [`CampaignError::CampaignNotActive`] once finalized.
    /// - [`CampaignError::DeadlinePassed`] if `now >= deadline`.
    /// - [`CampaignError::ZeroAmount`] if `amount == 0`.
    /// - [`CampaignError::AmountOverflow`] if the books would overflow.
    /// - [`CampaignError::TransferFailed`] if `bank` refuses.
    pub fn contribute(
        &mut self,
        caller: &Address,
        amount: Amount,
        now: DateTime<Utc>,
        bank: &mut dyn ValueTransfer,
    ) -> Result<CampaignEvent, CampaignError> {
        if self.state != CampaignState::Active {
            return Err(CampaignError::CampaignNotActive);
        }
        if now >= self.deadline {
            return Err(CampaignError::DeadlinePassed {
                deadline: self.deadline,
            });
        }
        if amount == 0 {
            return Err(CampaignError::ZeroAmount);
        }

        let total_raised = checked_credit(self.total_raised, amount)?;
        let escrow_balance = checked_credit(self.escrow_balance, amount)?;
        self.contributions.ensure_can_credit(caller, amount)?;

        bank.transfer_in(caller, amount)?;

        let entry = self.contributions.credit(caller, amount)?;
        self.total_raised = total_raised;
        self.escrow_balance = escrow_balance;

        tracing::info!(
            contributor = %caller,
            amount,
            contributor_total = entry,
            total_raised,
            "contribution accepted"
        );
        Ok(CampaignEvent::ContributionMade {
            contributor: *caller,
            amount,
        })
    }

    /// Resolves the campaign. Anyone may call this once the deadline passes.
    ///
    /// # Errors
    ///
    /// - [`CampaignError::CampaignNotActive`] if already finalized.
    /// - [`CampaignError::DeadlineNotReached`] if `now < deadline`.
    pub fn finalize(
        &mut self,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<CampaignEvent, CampaignError> {
        if self.state != CampaignState::Active {
            return Err(CampaignError::CampaignNotActive);
        }
        if now < self.deadline {
            return Err(CampaignError::DeadlineNotReached {
                deadline: self.deadline,
            });
        }

        self.state = if self.total_raised >= self.goal {
            CampaignState::Successful
        } else {
            CampaignState::Failed
        };

        tracing::info!(
            caller = %caller,
            state = %self.state,
            total_raised = self.total_raised,
            goal = self.goal,
            "campaign finalized"
        );
        Ok(CampaignEvent::CampaignFinalized {
            final_state: self.state,
            total_raised: self.total_raised,
        })
    }

    /// First phase of withdrawal: marks the funds withdrawn and reserves the
    /// whole escrow for the owner.
    ///
    /// # Errors
    ///
    /// - [`CampaignError::NotOwner`] if `caller` is not the owner.
    /// - [`CampaignError::CampaignNotSuccessful`] unless `Successful`.
    /// - [`CampaignError::AlreadyWithdrawn`] on a second attempt.
    pub fn begin_withdrawal(&mut self, caller: &Address) -> Result<Payout, CampaignError> {
        if *caller != self.owner {
            return Err(CampaignError::NotOwner);
        }
        if self.state != CampaignState::Successful {
            return Err(CampaignError::CampaignNotSuccessful);
        }
        if self.withdrawn {
            return Err(CampaignError::AlreadyWithdrawn);
        }

        let amount = std::mem::take(&mut self.escrow_balance);
        self.withdrawn = true;

        Ok(Payout {
            kind: PayoutKind::Withdrawal,
            recipient: self.owner,
            amount,
        })
    }

    /// First phase of a refund: zeroes the caller's entry and reserves it.
    ///
    /// # Errors
    ///
    /// - [`CampaignError::CampaignNotFailed`] unless `Failed`.
    /// - [`CampaignError::NothingToRefund`] if the caller's entry is zero.
    pub fn begin_refund(&mut self, caller: &Address) -> Result<Payout, CampaignError> {
        if self.state != CampaignState::Failed {
            return Err(CampaignError::CampaignNotFailed);
        }
        let owed = self.contributions.amount_of(caller);
        if owed == 0 {
            return Err(CampaignError::NothingToRefund);
        }
        let escrow_balance = checked_debit(self.escrow_balance, owed)?;

        let amount = self.contributions.take(caller);
        self.escrow_balance = escrow_balance;

        Ok(Payout {
            kind: PayoutKind::Refund,
            recipient: *caller,
            amount,
        })
    }

    /// Compensating rollback for a payout whose transfer failed.
    ///
    /// The payout must have come from this campaign.
    pub fn abort_payout(&mut self, payout: Payout) -> Result<(), CampaignError> {
        let escrow_balance = checked_credit(self.escrow_balance, payout.amount)?;
        match payout.kind {
            PayoutKind::Withdrawal => {
                self.withdrawn = false;
            }
            PayoutKind::Refund => {
                self.contributions.restore(&payout.recipient, payout.amount)?;
            }
        }
        self.escrow_balance = escrow_balance;

        tracing::warn!(
            kind = ?payout.kind,
            recipient = %payout.recipient,
            amount = payout.amount,
            "payout rolled back"
        );
        Ok(())
    }

    /// Pays the whole escrow to the owner, exactly once.
    ///
    /// # Errors
    ///
    /// Everything [`begin_withdrawal`](Self::begin_withdrawal) returns, plus
    /// [`CampaignError::TransferFailed`], in which case `withdrawn` is reset
    /// so the owner can retry.
    pub fn withdraw_funds(
        &mut self,
        caller: &Address,
        bank: &mut dyn ValueTransfer,
    ) -> Result<CampaignEvent, CampaignError> {
        let payout = self.begin_withdrawal(caller)?;
        self.settle(payout, bank)
    }

    /// Pays the caller back their contribution, exactly once.
    ///
    /// # Errors
    ///
    /// Everything [`begin_refund`](Self::begin_refund) returns, plus
    /// [`CampaignError::TransferFailed`], in which case the caller's entry is
    /// restored so they can retry.
    pub fn claim_refund(
        &mut self,
        caller: &Address,
        bank: &mut dyn ValueTransfer,
    ) -> Result<CampaignEvent, CampaignError> {
        let payout = self.begin_refund(caller)?;
        self.settle(payout, bank)
    }

    /// Second phase of a drain: asks `bank` to pay a reserved [`Payout`].
    ///
    /// If the transfer is refused the payout is aborted before the error is
    /// returned.
    pub fn settle(
        &mut self,
        payout: Payout,
        bank: &mut dyn ValueTransfer,
    ) -> Result<CampaignEvent, CampaignError> {
        if let Err(err) = bank.transfer_out(&payout.recipient, payout.amount) {
            self.abort_payout(payout)?;
            return Err(err.into());
        }

        tracing::info!(
            kind = ?payout.kind,
            recipient = %payout.recipient,
            amount = payout.amount,
            "payout settled"
        );
        Ok(payout.into_event())
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// Consistent snapshot for observers.
    pub fn summary(&self) -> CampaignSummary {
        CampaignSummary {
            owner: self.owner,
            goal: self.goal,
            deadline: self.deadline,
            total_raised: self.total_raised,
            state: self.state,
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn goal(&self) -> Amount {
        self.goal
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn total_raised(&self) -> Amount {
        self.total_raised
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    pub fn withdrawn(&self) -> bool {
        self.withdrawn
    }

    /// Value currently in custody for this campaign.
    pub fn escrow_balance(&self) -> Amount {
        self.escrow_balance
    }

    /// Amount currently held for `contributor`.
    pub fn contribution_of(&self, contributor: &Address) -> Amount {
        self.contributions.amount_of(contributor)
    }

    /// Everyone who ever contributed, with what is still held for them.
    pub fn contributors(&self) -> impl Iterator<Item = (&Address, Amount)> {
        self.contributions.contributors()
    }

    /// Whole percent of the goal raised.
    pub fn progress_percent(&self) -> u64 {
        progress_percent(self.total_raised, self.goal)
    }

    /// Time left until the deadline; zero once it has passed.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        if now >= self.deadline {
            Duration::zero()
        } else {
            self.deadline - now
        }
    }

    /// `true` when [`finalize`](Self::finalize) would succeed at `now`.
    pub fn is_finalizable(&self, now: DateTime<Utc>) -> bool {
        self.state == CampaignState::Active && now >= self.deadline
    }

    /// Checks this campaign's books against the conservation invariants.
    pub fn audit(&self) -> Result<(), InvariantViolation> {
        EscrowAudit {
            state: self.state,
            total_raised: self.total_raised,
            withdrawn: self.withdrawn,
            escrow_balance: self.escrow_balance,
            contributions: &self.contributions,
        }
        .check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdx_protocol::{Ledger, TransferError};

    const DAY: u64 = 86_400;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn params(goal: Amount, duration_secs: u64) -> CampaignParams {
        CampaignParams {
            title: "Community Garden".into(),
            description: "Raised beds for the east lot".into(),
            goal,
            duration_secs,
        }
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        for who in ["x", "y", "z"] {
            ledger.mint(&addr(who), 1_000).unwrap();
        }
        ledger
    }

    fn campaign(goal: Amount) -> Campaign {
        Campaign::new(addr("owner"), params(goal, DAY), t0()).unwrap()
    }

    fn after_deadline() -> DateTime<Utc> {
        t0() + Duration::seconds(DAY as i64)
    }

    /// Always refuses to pay out.
    struct RefusingBank;

    impl ValueTransfer for RefusingBank {
        fn transfer_in(&mut self, _: &Address, _: Amount) -> Result<(), TransferError> {
            Ok(())
        }

        fn transfer_out(&mut self, to: &Address, _: Amount) -> Result<(), TransferError> {
            Err(TransferError::AccountFrozen(*to))
        }
    }

    #[test]
    fn create_campaign_starts_active() {
        let c = campaign(10);
        assert_eq!(c.state(), CampaignState::Active);
        assert_eq!(c.total_raised(), 0);
        assert_eq!(c.escrow_balance(), 0);
        assert!(!c.withdrawn());
        assert_eq!(c.deadline(), t0() + Duration::seconds(DAY as i64));
        assert_eq!(c.created_at(), t0());
    }

    #[test]
    fn create_rejects_non_positive_goal_and_duration() {
        let err = Campaign::new(addr("o"), params(0, DAY), t0()).unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
        let err = Campaign::new(addr("o"), params(10, 0), t0()).unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
    }

    #[test]
    fn create_rejects_blank_title_and_excess_duration() {
        let mut p = params(10, DAY);
        p.title = "   ".into();
        assert!(Campaign::new(addr("o"), p, t0()).is_err());

        let p = params(10, MAX_CAMPAIGN_DURATION_SECS + 1);
        assert!(Campaign::new(addr("o"), p, t0()).is_err());
    }

    #[test]
    fn create_rejects_zero_owner() {
        assert!(Campaign::new(Address::ZERO, params(10, DAY), t0()).is_err());
    }

    #[test]
    fn contributions_accumulate() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 4, t0(), &mut bank).unwrap();
        c.contribute(&addr("x"), 2, t0(), &mut bank).unwrap();
        c.contribute(&addr("y"), 6, t0(), &mut bank).unwrap();

        assert_eq!(c.contribution_of(&addr("x")), 6);
        assert_eq!(c.total_raised(), 12);
        assert_eq!(c.escrow_balance(), 12);
        assert_eq!(bank.custody_balance(), 12);
        assert_eq!(bank.balance_of(&addr("x")), 994);
        assert_eq!(c.audit(), Ok(()));
    }

    #[test]
    fn zero_contribution_rejected() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        assert_eq!(
            c.contribute(&addr("x"), 0, t0(), &mut bank),
            Err(CampaignError::ZeroAmount)
        );
    }

    #[test]
    fn contribution_at_deadline_rejected() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        let err = c
            .contribute(&addr("x"), 1, c.deadline(), &mut bank)
            .unwrap_err();
        assert!(matches!(err, CampaignError::DeadlinePassed { .. }));
        assert_eq!(c.total_raised(), 0);
    }

    #[test]
    fn refused_contribution_records_nothing() {
        let mut bank = Ledger::new();
        let mut c = campaign(10);
        let err = c.contribute(&addr("broke"), 5, t0(), &mut bank).unwrap_err();
        assert!(matches!(
            err,
            CampaignError::TransferFailed(TransferError::InsufficientFunds { .. })
        ));
        assert_eq!(c.total_raised(), 0);
        assert_eq!(c.contribution_of(&addr("broke")), 0);
        assert_eq!(c.contributors().count(), 0);
    }

    #[test]
    fn finalize_before_deadline_rejected() {
        let mut c = campaign(10);
        let err = c.finalize(&addr("anyone"), t0()).unwrap_err();
        assert!(matches!(err, CampaignError::DeadlineNotReached { .. }));
        assert_eq!(c.state(), CampaignState::Active);
    }

    #[test]
    fn finalize_is_inclusive_of_goal() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 10, t0(), &mut bank).unwrap();
        let event = c.finalize(&addr("stranger"), after_deadline()).unwrap();
        assert_eq!(
            event,
            CampaignEvent::CampaignFinalized {
                final_state: CampaignState::Successful,
                total_raised: 10,
            }
        );
    }

    #[test]
    fn finalize_happens_once() {
        let mut c = campaign(10);
        c.finalize(&addr("o"), after_deadline()).unwrap();
        assert_eq!(c.state(), CampaignState::Failed);
        assert_eq!(
            c.finalize(&addr("o"), after_deadline()),
            Err(CampaignError::CampaignNotActive)
        );
        assert_eq!(c.state(), CampaignState::Failed);
    }

    #[test]
    fn failed_withdrawal_transfer_rolls_back() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 10, t0(), &mut bank).unwrap();
        c.finalize(&addr("x"), after_deadline()).unwrap();

        let err = c.withdraw_funds(&addr("owner"), &mut RefusingBank).unwrap_err();
        assert_eq!(err.code(), "transfer_failed");
        assert!(!c.withdrawn());
        assert_eq!(c.escrow_balance(), 10);
        assert_eq!(c.audit(), Ok(()));

        // Retry against a bank that pays.
        c.withdraw_funds(&addr("owner"), &mut bank).unwrap();
        assert!(c.withdrawn());
        assert_eq!(bank.balance_of(&addr("owner")), 10);
    }

    #[test]
    fn failed_refund_transfer_restores_entry() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 3, t0(), &mut bank).unwrap();
        c.finalize(&addr("x"), after_deadline()).unwrap();

        assert!(c.claim_refund(&addr("x"), &mut RefusingBank).is_err());
        assert_eq!(c.contribution_of(&addr("x")), 3);
        assert_eq!(c.escrow_balance(), 3);
        assert_eq!(c.audit(), Ok(()));
    }

    #[test]
    fn reentrant_withdrawal_sees_drained_state() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 10, t0(), &mut bank).unwrap();
        c.finalize(&addr("x"), after_deadline()).unwrap();

        let payout = c.begin_withdrawal(&addr("owner")).unwrap();
        assert_eq!(payout.amount(), 10);
        assert_eq!(c.escrow_balance(), 0);

        // A call arriving while the payout is in flight.
        assert_eq!(
            c.withdraw_funds(&addr("owner"), &mut bank),
            Err(CampaignError::AlreadyWithdrawn)
        );

        bank.transfer_out(payout.recipient(), payout.amount()).unwrap();
        assert_eq!(
            payout.into_event(),
            CampaignEvent::FundsWithdrawn {
                owner: addr("owner"),
                amount: 10
            }
        );
    }

    #[test]
    fn reentrant_refund_sees_zeroed_entry() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 3, t0(), &mut bank).unwrap();
        c.finalize(&addr("x"), after_deadline()).unwrap();

        let payout = c.begin_refund(&addr("x")).unwrap();
        assert_eq!(payout.kind(), PayoutKind::Refund);
        assert_eq!(
            c.begin_refund(&addr("x")),
            Err(CampaignError::NothingToRefund)
        );
        c.abort_payout(payout).unwrap();
        assert_eq!(c.contribution_of(&addr("x")), 3);
    }

    #[test]
    fn read_helpers() {
        let mut bank = funded_ledger();
        let mut c = campaign(10);
        c.contribute(&addr("x"), 3, t0(), &mut bank).unwrap();

        assert_eq!(c.progress_percent(), 30);
        assert_eq!(c.time_remaining(t0()), Duration::seconds(DAY as i64));
        assert_eq!(c.time_remaining(after_deadline()), Duration::zero());
        assert!(!c.is_finalizable(t0()));
        assert!(c.is_finalizable(after_deadline()));

        let summary = c.summary();
        assert_eq!(summary.owner, addr("owner"));
        assert_eq!(summary.total_raised, 3);
        assert_eq!(summary.state, CampaignState::Active);
    }

    #[test]
    fn state_codes_round_trip() {
        for state in [
            CampaignState::Active,
            CampaignState::Successful,
            CampaignState::Failed,
        ] {
            assert_eq!(CampaignState::from_code(state.code()), Some(state));
        }
        assert_eq!(CampaignState::from_code(3), None);
        assert!(!CampaignState::Active.is_terminal());
        assert!(CampaignState::Failed.is_terminal());
    }
}

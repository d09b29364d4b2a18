//! # Campaign Host
//!
//! The execution environment the contracts run in. A [`Host`] owns the
//! campaign registry, the account ledger and the devnet clock, and executes
//! one call at a time to completion. Every call that changes state is written
//! to the [`CrowdStore`] before it returns.
//!
//! A call runs against copies of the registry and ledger. The copies replace
//! the live state only once their changeset has committed, so a call that
//! fails to persist leaves the host exactly as it was.
//!
//! The CLI drives a `Host` directly; `serve` wraps it in a mutex shared by
//! all request handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crowdx_contracts::{
    Campaign, CampaignError, CampaignEvent, CampaignId, CampaignParams, CampaignRegistry,
    CampaignState, EventRecord, InvariantViolation,
};
use crowdx_protocol::config::{DEVNET_FAUCET_LIMIT, PROTOCOL_VERSION};
use crowdx_protocol::{Address, Amount, Clock, Ledger, LedgerError, OffsetClock};

use crate::store::{Changeset, CrowdStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A contract rejected the call. Nothing changed.
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    /// The faucet could not mint.
    #[error("faucet: {0}")]
    Faucet(#[from] LedgerError),

    /// The faucet request exceeds the devnet limit.
    #[error("faucet request of {requested} exceeds the limit of {limit}")]
    FaucetLimit { requested: Amount, limit: Amount },

    /// The call could not be persisted. Nothing changed.
    #[error("storage: {0}")]
    Store(#[from] StoreError),
}

impl HostError {
    /// Stable machine-readable identifier for API responses and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            HostError::Campaign(e) => e.code(),
            HostError::Faucet(_) => "faucet_rejected",
            HostError::FaucetLimit { .. } => "faucet_limit",
            HostError::Store(_) => "storage_error",
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// A consistency check that failed in [`Host::audit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostAuditError {
    /// A campaign's books do not balance.
    #[error("campaign {0}: {1}")]
    Campaign(CampaignId, InvariantViolation),

    /// Account balances plus custody differ from the total minted.
    #[error("ledger balances and custody do not add up to total supply {total_supply}")]
    LedgerNotConserved { total_supply: Amount },

    /// Custody differs from the sum of campaign escrow balances.
    #[error("custody {custody} does not match total escrow {escrowed:?}")]
    CustodyMismatch {
        custody: Amount,
        escrowed: Option<Amount>,
    },
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Everything an observer wants to know about one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignView {
    pub id: CampaignId,
    pub owner: Address,
    pub title: String,
    pub description: String,
    pub goal: Amount,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub total_raised: Amount,
    pub escrow_balance: Amount,
    pub state: CampaignState,
    /// Numeric state: 0 Active, 1 Successful, 2 Failed.
    pub state_code: u8,
    pub withdrawn: bool,
    pub progress_percent: u64,
    pub seconds_remaining: i64,
    pub finalizable: bool,
    pub contributors: usize,
}

impl CampaignView {
    /// Builds the view of `campaign` as seen at `now`.
    pub fn new(id: CampaignId, campaign: &Campaign, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner: *campaign.owner(),
            title: campaign.title().to_string(),
            description: campaign.description().to_string(),
            goal: campaign.goal(),
            created_at: campaign.created_at(),
            deadline: campaign.deadline(),
            total_raised: campaign.total_raised(),
            escrow_balance: campaign.escrow_balance(),
            state: campaign.state(),
            state_code: campaign.state().code(),
            withdrawn: campaign.withdrawn(),
            progress_percent: campaign.progress_percent(),
            seconds_remaining: campaign.time_remaining(now).num_seconds(),
            finalizable: campaign.is_finalizable(now),
            contributors: campaign.contributors().count(),
        }
    }
}

/// Host-wide summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatus {
    pub version: String,
    pub protocol_version: String,
    pub campaigns: usize,
    pub events: usize,
    pub accounts: usize,
    pub custody: Amount,
    pub total_escrowed: Option<Amount>,
    pub total_supply: Amount,
    pub ledger_time: DateTime<Utc>,
    pub clock_offset_secs: i64,
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Registry, ledger and clock, persisted through a [`CrowdStore`].
pub struct Host {
    registry: CampaignRegistry,
    ledger: Ledger,
    clock: OffsetClock,
    store: CrowdStore,
    persisted_events: usize,
}

impl Host {
    /// Loads the host state from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the persisted state cannot be decoded or
    /// does not add up.
    pub fn open(store: CrowdStore) -> HostResult<Self> {
        let registry = store.load_registry()?;
        let ledger = store.load_ledger()?;
        let clock = OffsetClock::new(store.clock_offset()?);

        tracing::info!(
            campaigns = registry.campaigns_count(),
            events = registry.events().len(),
            accounts = ledger.len(),
            custody = ledger.custody_balance(),
            clock_offset_secs = clock.offset_secs(),
            "host state loaded"
        );

        let persisted_events = registry.events().len();
        Ok(Self {
            registry,
            ledger,
            clock,
            store,
            persisted_events,
        })
    }

    // -- Contract calls -------------------------------------------------------

    /// Registers a campaign owned by `owner`.
    pub fn create_campaign(
        &mut self,
        owner: Address,
        params: CampaignParams,
    ) -> HostResult<CampaignId> {
        self.transact(|registry, _, clock| Ok(registry.create_campaign(owner, params, clock)?))
    }

    /// Contributes `amount` from `from` to campaign `id`.
    pub fn contribute(&mut self, id: &CampaignId, from: &Address, amount: Amount) -> HostResult<()> {
        self.transact(|registry, ledger, clock| {
            Ok(registry.contribute(id, from, amount, clock, ledger)?)
        })
    }

    /// Finalizes campaign `id`.
    pub fn finalize(&mut self, id: &CampaignId, caller: &Address) -> HostResult<CampaignState> {
        self.transact(|registry, _, clock| {
            registry.finalize_campaign(id, caller, clock)?;
            Ok(registry.campaign(id)?.state())
        })
    }

    /// Pays the escrow of campaign `id` to its owner.
    pub fn withdraw(&mut self, id: &CampaignId, caller: &Address) -> HostResult<Amount> {
        self.transact(|registry, ledger, clock| {
            Ok(registry.withdraw_funds(id, caller, clock, ledger)?)
        })
    }

    /// Refunds `caller`'s contribution to failed campaign `id`.
    pub fn refund(&mut self, id: &CampaignId, caller: &Address) -> HostResult<Amount> {
        self.transact(|registry, ledger, clock| {
            Ok(registry.claim_refund(id, caller, clock, ledger)?)
        })
    }

    // -- Devnet administration ------------------------------------------------

    /// Mints `amount` into `to`'s account. Returns the new balance.
    pub fn faucet(&mut self, to: &Address, amount: Amount) -> HostResult<Amount> {
        if amount > DEVNET_FAUCET_LIMIT {
            return Err(HostError::FaucetLimit {
                requested: amount,
                limit: DEVNET_FAUCET_LIMIT,
            });
        }
        self.transact(|_, ledger, _| {
            ledger.mint(to, amount)?;
            Ok(ledger.balance_of(to))
        })
    }

    /// Moves the ledger clock forward by `secs`. Returns the new ledger time.
    pub fn advance_time(&mut self, secs: i64) -> HostResult<DateTime<Utc>> {
        let mut clock = self.clock;
        clock.advance_secs(secs);

        let mut changes = Changeset::new();
        changes.put_clock_offset(clock.offset_secs());
        self.store.commit(&changes)?;
        self.clock = clock;
        self.store.flush()?;

        tracing::info!(
            secs,
            offset_secs = self.clock.offset_secs(),
            "ledger clock advanced"
        );
        Ok(self.clock.now())
    }

    // -- Queries --------------------------------------------------------------

    /// The registry, for read-only queries.
    pub fn registry(&self) -> &CampaignRegistry {
        &self.registry
    }

    /// The ledger, for read-only queries.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Current ledger time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// View of campaign `id` at the current ledger time.
    pub fn view(&self, id: &CampaignId) -> HostResult<CampaignView> {
        let campaign = self.registry.campaign(id)?;
        Ok(CampaignView::new(*id, campaign, self.now()))
    }

    /// Views of every campaign, optionally only those owned by `owner`.
    pub fn list(&self, owner: Option<&Address>) -> Vec<CampaignView> {
        let now = self.now();
        self.registry
            .iter()
            .filter(|(_, c)| owner.map_or(true, |o| c.owner() == o))
            .map(|(id, c)| CampaignView::new(*id, c, now))
            .collect()
    }

    /// Journal entries with `sequence >= since`.
    pub fn events_since(&self, since: u64) -> &[EventRecord] {
        self.registry.events_since(since)
    }

    /// Host-wide summary.
    pub fn status(&self) -> HostStatus {
        HostStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            campaigns: self.registry.campaigns_count(),
            events: self.registry.events().len(),
            accounts: self.ledger.len(),
            custody: self.ledger.custody_balance(),
            total_escrowed: self.registry.total_escrowed(),
            total_supply: self.ledger.total_supply(),
            ledger_time: self.now(),
            clock_offset_secs: self.clock.offset_secs(),
        }
    }

    /// Runs every consistency check the host knows: the per-campaign escrow
    /// audit, ledger conservation, and custody matching total escrow.
    pub fn audit(&self) -> Result<(), HostAuditError> {
        self.registry
            .audit()
            .map_err(|(id, violation)| HostAuditError::Campaign(id, violation))?;
        if !self.ledger.is_conserved() {
            return Err(HostAuditError::LedgerNotConserved {
                total_supply: self.ledger.total_supply(),
            });
        }
        let escrowed = self.registry.total_escrowed();
        if escrowed != Some(self.ledger.custody_balance()) {
            return Err(HostAuditError::CustodyMismatch {
                custody: self.ledger.custody_balance(),
                escrowed,
            });
        }
        Ok(())
    }

    // -- Persistence ----------------------------------------------------------

    /// Runs `op` against copies of the registry and ledger, commits what it
    /// changed, and only then installs the copies.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut CampaignRegistry, &mut Ledger, &OffsetClock) -> HostResult<T>,
    ) -> HostResult<T> {
        let mut registry = self.registry.clone();
        let mut ledger = self.ledger.clone();
        let value = op(&mut registry, &mut ledger, &self.clock)?;

        let changes = self.changeset(&registry, &ledger)?;
        if let Err(err) = self.store.commit(&changes) {
            tracing::error!(error = %err, "commit failed, call rolled back");
            return Err(err.into());
        }

        self.persisted_events = registry.events().len();
        self.registry = registry;
        self.ledger = ledger;
        self.store.flush()?;
        Ok(value)
    }

    /// Campaigns named by new journal entries, the handle order if one was
    /// created, the new entries themselves and the ledger.
    fn changeset(&self, registry: &CampaignRegistry, ledger: &Ledger) -> HostResult<Changeset> {
        let fresh = registry.events_since(self.persisted_events as u64);
        let touched: BTreeSet<CampaignId> = fresh.iter().map(|r| r.campaign).collect();
        let created = fresh
            .iter()
            .any(|r| matches!(r.event, CampaignEvent::CampaignCreated { .. }));

        let mut changes = Changeset::new();
        for id in &touched {
            changes.put_campaign(id, registry.campaign(id)?)?;
        }
        if created {
            changes.put_order(registry.get_campaigns())?;
        }
        changes.append_events(fresh)?;
        changes.put_ledger(ledger)?;
        Ok(changes)
    }
}

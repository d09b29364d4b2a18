//! # Campaign Registry
//!
//! Owns every campaign ever created, keyed by an opaque [`CampaignId`], and
//! remembers the order they were created in. Campaigns are never removed;
//! a finalized and fully settled campaign stays here as history.
//!
//! The registry does not reach into campaign internals. Its mutators look up
//! the handle, delegate to the campaign's own operation, and append the
//! returned notification to the journal.

use chrono::{DateTime, Utc};
use crowdx_protocol::{Address, Amount, Clock, ValueTransfer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::accounting::InvariantViolation;
use crate::campaign::{Campaign, CampaignParams};
use crate::error::CampaignError;
use crate::events::{CampaignEvent, EventRecord};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque, stable handle to a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(Uuid);

impl CampaignId {
    /// A fresh random handle.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for CampaignId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for CampaignId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a persisted registry cannot be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// The handle sequence names a campaign that was not supplied.
    #[error("handle {0} has no campaign")]
    MissingCampaign(CampaignId),

    /// A handle appears twice in the sequence.
    #[error("handle {0} listed more than once")]
    DuplicateHandle(CampaignId),

    /// A campaign was supplied that the sequence does not list.
    #[error("campaign {0} is not in the handle sequence")]
    OrphanCampaign(CampaignId),

    /// Journal sequence numbers are not contiguous from zero.
    #[error("journal gap at sequence {0}")]
    JournalGap(u64),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of all campaigns, plus the notification journal.
///
/// Serialized as its persisted parts; deserializing goes through
/// [`CampaignRegistry::restore`] and fails on inconsistent input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "RegistryParts", try_from = "RegistryParts")]
pub struct CampaignRegistry {
    order: Vec<CampaignId>,
    campaigns: HashMap<CampaignId, Campaign>,
    journal: Vec<EventRecord>,
}

/// Wire form of a registry: campaigns listed in creation order.
#[derive(Serialize, Deserialize)]
struct RegistryParts {
    order: Vec<CampaignId>,
    campaigns: Vec<(CampaignId, Campaign)>,
    journal: Vec<EventRecord>,
}

impl From<CampaignRegistry> for RegistryParts {
    fn from(mut registry: CampaignRegistry) -> Self {
        let campaigns = registry
            .order
            .iter()
            .filter_map(|id| registry.campaigns.remove(id).map(|c| (*id, c)))
            .collect();
        Self {
            order: registry.order,
            campaigns,
            journal: registry.journal,
        }
    }
}

impl TryFrom<RegistryParts> for CampaignRegistry {
    type Error = RestoreError;

    fn try_from(parts: RegistryParts) -> Result<Self, Self::Error> {
        Self::restore(parts.order, parts.campaigns, parts.journal)
    }
}

impl CampaignRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted parts.
    ///
    /// # Errors
    ///
    /// Rejects a handle sequence that does not match the campaign set
    /// one-to-one, and a journal whose sequence numbers skip.
    pub fn restore(
        order: Vec<CampaignId>,
        campaigns: impl IntoIterator<Item = (CampaignId, Campaign)>,
        journal: Vec<EventRecord>,
    ) -> Result<Self, RestoreError> {
        let campaigns: HashMap<CampaignId, Campaign> = campaigns.into_iter().collect();

        let mut seen = HashSet::with_capacity(order.len());
        for id in &order {
            if !seen.insert(*id) {
                return Err(RestoreError::DuplicateHandle(*id));
            }
            if !campaigns.contains_key(id) {
                return Err(RestoreError::MissingCampaign(*id));
            }
        }
        if let Some(orphan) = campaigns.keys().find(|id| !seen.contains(*id)) {
            return Err(RestoreError::OrphanCampaign(*orphan));
        }
        for (expected, record) in journal.iter().enumerate() {
            if record.sequence != expected as u64 {
                return Err(RestoreError::JournalGap(expected as u64));
            }
        }

        Ok(Self {
            order,
            campaigns,
            journal,
        })
    }

    /// Registers a new campaign owned by `owner`, with its deadline set
    /// `duration_secs` after the clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignError::InvalidParameters`] for a non-positive goal
    /// or duration, or any other rule in [`CampaignParams::validate`].
    pub fn create_campaign(
        &mut self,
        owner: Address,
        params: CampaignParams,
        clock: &dyn Clock,
    ) -> Result<CampaignId, CampaignError> {
        let now = clock.now();
        let campaign = Campaign::new(owner, params, now)?;
        let id = CampaignId::generate();

        let event = CampaignEvent::CampaignCreated {
            campaign: id,
            owner,
            title: campaign.title().to_string(),
            goal: campaign.goal(),
            deadline: campaign.deadline(),
        };

        tracing::info!(
            campaign = %id,
            owner = %owner,
            goal = campaign.goal(),
            deadline = %campaign.deadline(),
            "campaign created"
        );

        self.campaigns.insert(id, campaign);
        self.order.push(id);
        self.record(id, now, event);
        Ok(id)
    }

    /// All handles, in creation order.
    pub fn get_campaigns(&self) -> &[CampaignId] {
        &self.order
    }

    /// Number of campaigns ever created.
    pub fn campaigns_count(&self) -> usize {
        self.order.len()
    }

    /// Looks up a campaign.
    pub fn campaign(&self, id: &CampaignId) -> Result<&Campaign, CampaignError> {
        self.campaigns
            .get(id)
            .ok_or(CampaignError::UnknownCampaign(*id))
    }

    /// Campaigns in creation order, paired with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (&CampaignId, &Campaign)> {
        self.order
            .iter()
            .filter_map(|id| self.campaigns.get(id).map(|c| (id, c)))
    }

    /// Contributes to campaign `id`. See [`Campaign::contribute`].
    pub fn contribute(
        &mut self,
        id: &CampaignId,
        caller: &Address,
        amount: Amount,
        clock: &dyn Clock,
        bank: &mut dyn ValueTransfer,
    ) -> Result<(), CampaignError> {
        let now = clock.now();
        let event = self.campaign_mut(id)?.contribute(caller, amount, now, bank)?;
        self.record(*id, now, event);
        Ok(())
    }

    /// Finalizes campaign `id`. See [`Campaign::finalize`].
    pub fn finalize_campaign(
        &mut self,
        id: &CampaignId,
        caller: &Address,
        clock: &dyn Clock,
    ) -> Result<(), CampaignError> {
        let now = clock.now();
        let event = self.campaign_mut(id)?.finalize(caller, now)?;
        self.record(*id, now, event);
        Ok(())
    }

    /// Withdraws the funds of campaign `id`. Returns the amount paid.
    pub fn withdraw_funds(
        &mut self,
        id: &CampaignId,
        caller: &Address,
        clock: &dyn Clock,
        bank: &mut dyn ValueTransfer,
    ) -> Result<Amount, CampaignError> {
        let campaign = self.campaign_mut(id)?;
        let payout = campaign.begin_withdrawal(caller)?;
        let amount = payout.amount();
        let event = campaign.settle(payout, bank)?;
        self.record(*id, clock.now(), event);
        Ok(amount)
    }

    /// Refunds `caller` from campaign `id`. Returns the amount paid.
    pub fn claim_refund(
        &mut self,
        id: &CampaignId,
        caller: &Address,
        clock: &dyn Clock,
        bank: &mut dyn ValueTransfer,
    ) -> Result<Amount, CampaignError> {
        let campaign = self.campaign_mut(id)?;
        let payout = campaign.begin_refund(caller)?;
        let amount = payout.amount();
        let event = campaign.settle(payout, bank)?;
        self.record(*id, clock.now(), event);
        Ok(amount)
    }

    /// Handles of campaigns created by `owner`, in creation order.
    pub fn campaigns_owned_by(&self, owner: &Address) -> Vec<CampaignId> {
        self.iter()
            .filter(|(_, c)| c.owner() == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Handles of campaigns `contributor` has ever contributed to.
    pub fn campaigns_backed_by(&self, contributor: &Address) -> Vec<CampaignId> {
        self.iter()
            .filter(|(_, c)| c.contributors().any(|(who, _)| who == contributor))
            .map(|(id, _)| *id)
            .collect()
    }

    /// The full notification journal.
    pub fn events(&self) -> &[EventRecord] {
        &self.journal
    }

    /// Journal entries with `sequence >= since`.
    pub fn events_since(&self, since: u64) -> &[EventRecord] {
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(self.journal.len());
        &self.journal[start..]
    }

    /// Value escrowed across all campaigns.
    pub fn total_escrowed(&self) -> Option<Amount> {
        self.campaigns
            .values()
            .try_fold(0u64, |acc, c| acc.checked_add(c.escrow_balance()))
    }

    /// Audits every campaign; returns the first violation found.
    pub fn audit(&self) -> Result<(), (CampaignId, InvariantViolation)> {
        for (id, campaign) in self.iter() {
            campaign.audit().map_err(|v| (*id, v))?;
        }
        Ok(())
    }

    fn campaign_mut(&mut self, id: &CampaignId) -> Result<&mut Campaign, CampaignError> {
        self.campaigns
            .get_mut(id)
            .ok_or(CampaignError::UnknownCampaign(*id))
    }

    fn record(&mut self, campaign: CampaignId, timestamp: DateTime<Utc>, event: CampaignEvent) {
        let sequence = self.journal.len() as u64;
        tracing::debug!(sequence, campaign = %campaign, kind = event.kind(), "event recorded");
        self.journal.push(EventRecord {
            sequence,
            campaign,
            timestamp,
            event,
        });
    }
}

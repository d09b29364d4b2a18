//! Notifications emitted by the registry and by campaigns.
//!
//! Campaign operations return the event they emit; the registry stamps it
//! with a sequence number, the campaign handle and the ledger time, then
//! appends it to its journal.

use chrono::{DateTime, Utc};
use crowdx_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignState;
use crate::registry::CampaignId;

/// Something observable that happened to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignEvent {
    /// A campaign was registered.
    CampaignCreated {
        /// Handle of the new campaign.
        campaign: CampaignId,
        /// Its creator.
        owner: Address,
        /// Its title.
        title: String,
        /// Target amount.
        goal: Amount,
        /// When contributions close.
        deadline: DateTime<Utc>,
    },

    /// Value was contributed.
    ContributionMade {
        /// Who contributed.
        contributor: Address,
        /// How much.
        amount: Amount,
    },

    /// The campaign was resolved.
    CampaignFinalized {
        /// `Successful` or `Failed`.
        final_state: CampaignState,
        /// Amount raised at resolution.
        total_raised: Amount,
    },

    /// The owner withdrew the raised funds.
    FundsWithdrawn {
        /// The owner.
        owner: Address,
        /// Amount paid out.
        amount: Amount,
    },

    /// A contributor reclaimed their contribution.
    RefundClaimed {
        /// The contributor.
        contributor: Address,
        /// Amount paid back.
        amount: Amount,
    },
}

impl CampaignEvent {
    /// Short name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CampaignEvent::CampaignCreated { .. } => "campaign_created",
            CampaignEvent::ContributionMade { .. } => "contribution_made",
            CampaignEvent::CampaignFinalized { .. } => "campaign_finalized",
            CampaignEvent::FundsWithdrawn { .. } => "funds_withdrawn",
            CampaignEvent::RefundClaimed { .. } => "refund_claimed",
        }
    }
}

/// A journaled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at zero.
    pub sequence: u64,
    /// Campaign the event belongs to.
    pub campaign: CampaignId,
    /// Ledger time when it was emitted.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    pub event: CampaignEvent,
}

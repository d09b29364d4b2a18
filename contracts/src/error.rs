//! Rejections returned by campaign and registry operations.
//!
//! Every variant is a refusal, not a corruption: when an operation returns
//! one of these, the campaign is exactly as it was before the call and the
//! caller may try again.

use chrono::{DateTime, Utc};
use crowdx_protocol::TransferError;
use thiserror::Error;

use crate::registry::CampaignId;

/// Errors that can occur during campaign operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignError {
    /// Creation arguments are malformed.
    #[error("invalid campaign parameters: {reason}")]
    InvalidParameters {
        /// What was wrong with them.
        reason: &'static str,
    },

    /// The campaign has already been finalized.
    #[error("campaign is not active")]
    CampaignNotActive,

    /// Withdrawal attempted on a campaign that did not succeed.
    #[error("campaign did not succeed")]
    CampaignNotSuccessful,

    /// Refund attempted on a campaign that did not fail.
    #[error("campaign did not fail")]
    CampaignNotFailed,

    /// Contribution arrived at or after the deadline.
    #[error("campaign deadline passed at {deadline}")]
    DeadlinePassed {
        /// The campaign's deadline.
        deadline: DateTime<Utc>,
    },

    /// Finalization attempted before the deadline.
    #[error("campaign deadline not reached until {deadline}")]
    DeadlineNotReached {
        /// The campaign's deadline.
        deadline: DateTime<Utc>,
    },

    /// Contribution of zero.
    #[error("contribution amount must be positive")]
    ZeroAmount,

    /// The caller has no refundable contribution.
    #[error("nothing to refund")]
    NothingToRefund,

    /// Owner-only operation called by someone else.
    #[error("caller is not the campaign owner")]
    NotOwner,

    /// The owner already withdrew the raised funds.
    #[error("funds already withdrawn")]
    AlreadyWithdrawn,

    /// The value-transfer collaborator refused to move funds.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Accepting the amount would overflow the campaign's accounting.
    #[error("amount overflow: operation would exceed allowed limits")]
    AmountOverflow,

    /// No campaign is registered under this handle.
    #[error("unknown campaign: {0}")]
    UnknownCampaign(CampaignId),
}

impl CampaignError {
    /// Stable machine-readable identifier for API responses and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            CampaignError::InvalidParameters { .. } => "invalid_parameters",
            CampaignError::CampaignNotActive => "campaign_not_active",
            CampaignError::CampaignNotSuccessful => "campaign_not_successful",
            CampaignError::CampaignNotFailed => "campaign_not_failed",
            CampaignError::DeadlinePassed { .. } => "deadline_passed",
            CampaignError::DeadlineNotReached { .. } => "deadline_not_reached",
            CampaignError::ZeroAmount => "zero_amount",
            CampaignError::NothingToRefund => "nothing_to_refund",
            CampaignError::NotOwner => "not_owner",
            CampaignError::AlreadyWithdrawn => "already_withdrawn",
            CampaignError::TransferFailed(_) => "transfer_failed",
            CampaignError::AmountOverflow => "amount_overflow",
            CampaignError::UnknownCampaign(_) => "unknown_campaign",
        }
    }
}

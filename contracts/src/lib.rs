//! # CrowdX Campaign Contracts
//!
//! Escrow logic for goal-based crowdfunding. A [`CampaignRegistry`] creates
//! and indexes [`Campaign`]s; each campaign holds contributed value until its
//! deadline and then pays it either to the owner (goal met) or back to the
//! contributors (goal missed).
//!
//! ## Design Principles
//!
//! 1. Every amount goes through `checked_add` / `checked_sub`. An operation
//!    that would overflow is rejected before anything changes.
//! 2. State transitions are explicit enum variants. `Successful` and `Failed`
//!    are terminal.
//! 3. Bookkeeping is committed before value leaves escrow, and rolled back if
//!    the transfer is refused.
//! 4. Time and value movement are collaborators passed in by the caller
//!    ([`crowdx_protocol::Clock`], [`crowdx_protocol::ValueTransfer`]), so
//!    the contracts stay deterministic under test.

pub mod accounting;
pub mod campaign;
pub mod error;
pub mod events;
pub mod registry;

pub use accounting::{ContributionLedger, InvariantViolation};
pub use campaign::{
    Campaign, CampaignParams, CampaignState, CampaignSummary, Payout, PayoutKind,
};
pub use error::CampaignError;
pub use events::{CampaignEvent, EventRecord};
pub use registry::{CampaignId, CampaignRegistry, RestoreError};

// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CrowdX Protocol: Execution Environment Primitives
//!
//! The crowdfunding contracts never talk to the outside world directly.
//! Everything they need from the ledger runtime they run inside of comes
//! through the handful of primitives defined here:
//!
//! - **address**: 20-byte account identities. The key type for every
//!   per-party ledger entry.
//! - **clock**: the `Clock` trait. Deadlines are compared against whatever
//!   clock the host injects; nothing in the core reads wall time on its own.
//! - **transfer**: the `ValueTransfer` trait: move value into custody, move
//!   value out of custody, report failure.
//! - **ledger**: an in-memory account ledger implementing `ValueTransfer`.
//!   The node persists it; tests use it as the bank.
//! - **config**: protocol constants and limits.
//!
//! ## Design Philosophy
//!
//! 1. Money is a `u64` and every operation on it is checked.
//! 2. Collaborators are traits so tests can substitute them.
//! 3. A failed transfer leaves both parties exactly as they were.

pub mod address;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod transfer;

pub use address::{Address, AddressError};
pub use clock::{Clock, ManualClock, OffsetClock, SystemClock};
pub use ledger::{AccountState, Ledger, LedgerError};
pub use transfer::{Amount, TransferError, ValueTransfer};

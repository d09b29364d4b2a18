//! # Protocol Configuration & Constants
//!
//! Every limit the contracts enforce and every default the node starts with
//! lives here. Runtime knobs (ports, data directory, log format) are exposed
//! through the node's CLI with `CROWDX_*` environment fallbacks; these are
//! the values those knobs default to.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the campaign interface. Bumped whenever the persisted layout
/// of a campaign or the notification schema changes.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Domain tag mixed into label-derived addresses so they can never collide
/// with hashes computed for any other purpose.
pub const ADDRESS_DERIVATION_DOMAIN: &str = "crowdx:address:";

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Campaign Limits
// ---------------------------------------------------------------------------

/// Seconds in a day. The original front end asked creators for a duration
/// in days and multiplied it out before calling the registry.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Longest campaign the registry accepts: five years.
pub const MAX_CAMPAIGN_DURATION_SECS: u64 = 5 * 365 * SECONDS_PER_DAY;

/// Maximum campaign title length in bytes.
pub const MAX_TITLE_LENGTH: usize = 128;

/// Maximum campaign description length in bytes.
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".crowdx";

/// Largest single faucet mint the devnet node will perform.
pub const DEVNET_FAUCET_LIMIT: u64 = 1_000_000_000_000;

/// Capacity of the live notification broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long the node waits for in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Converts a whole number of days into seconds, or `None` on overflow.
pub fn days_to_secs(days: u64) -> Option<u64> {
    days.checked_mul(SECONDS_PER_DAY)
}

//! # Protocol Configuration & Constants
//!
//! Every policy number in Piggy lives here. The breaking fee, the lock
//! bounds and the hashing domains are part of the contract with savers:
//! changing one after vaults exist changes the terms people signed up for.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Breaking Fee
// ---------------------------------------------------------------------------

/// Penalty charged on a withdrawal made while the bank is still locked,
/// expressed in whole percent of the withdrawn amount.
pub const BREAKING_FEE_PERCENT: u64 = 3;

/// Denominator for [`BREAKING_FEE_PERCENT`]. The fee is
/// `floor(amount * BREAKING_FEE_PERCENT / PERCENT_DENOMINATOR)`.
pub const PERCENT_DENOMINATOR: u64 = 100;

// ---------------------------------------------------------------------------
// Lock Durations
// ---------------------------------------------------------------------------

/// One day in seconds. The most common lock period in practice.
pub const ONE_DAY_SECS: u64 = 86_400;

/// One week in seconds.
pub const ONE_WEEK_SECS: u64 = 7 * ONE_DAY_SECS;

/// A 365-day year in seconds.
pub const ONE_YEAR_SECS: u64 = 365 * ONE_DAY_SECS;

/// Longest lock a bank may carry. Always representable as a
/// `chrono::Duration`.
pub const MAX_LOCK_DURATION_SECS: u64 = 100 * ONE_YEAR_SECS;

/// Largest single step a manual clock will move forward.
pub const MAX_CLOCK_ADVANCE_SECS: u64 = 2 * MAX_LOCK_DURATION_SECS;

// ---------------------------------------------------------------------------
// Hashing Domains
// ---------------------------------------------------------------------------

/// Domain tag for identities derived from human-readable labels.
pub const IDENTITY_DOMAIN: &[u8] = b"piggy/identity/v1";

/// Domain tag for vault custody addresses.
pub const VAULT_ADDRESS_DOMAIN: &[u8] = b"piggy/vault/v1";

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the REST API.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Upper bound on a single devnet faucet mint.
pub const FAUCET_MAX_AMOUNT: u64 = 1_000_000_000_000;

//! # Banks
//!
//! A [`Bank`] is one time-locked pot inside a vault. It holds a single asset,
//! remembers when it was opened, and knows how long it has to age before a
//! withdrawal is penalty-free. Whether it is locked right now is never
//! stored: it is recomputed from the creation time, the lock duration and the
//! instant the caller supplies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use piggy_protocol::config::{BREAKING_FEE_PERCENT, PERCENT_DENOMINATOR};
use piggy_protocol::{Asset, AssetClass, Identity};

/// Stable position of a bank inside its vault's per-class collection.
pub type BankIndex = usize;

/// Whether a withdrawal right now would pay the breaking fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// The lock period has not elapsed; withdrawals pay the breaking fee.
    Locked,
    /// The lock period has elapsed; withdrawals are free.
    Unlocked,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Locked => write!(f, "Locked"),
            LockStatus::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// The breaking fee on an early withdrawal of `amount`:
/// `floor(amount * 3 / 100)`, computed without overflow.
pub fn breaking_fee(amount: u64) -> u64 {
    let fee = u128::from(amount) * u128::from(BREAKING_FEE_PERCENT) / u128::from(PERCENT_DENOMINATOR);
    // fee <= amount, so it always fits.
    fee as u64
}

/// One time-locked sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    asset: Asset,
    label: String,
    lock_duration_secs: u64,
    balance: u64,
    created_at: DateTime<Utc>,
}

impl Bank {
    /// Opens an empty bank. Callers validate the lock duration.
    pub(crate) fn open(
        asset: Asset,
        label: String,
        lock_duration_secs: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            asset,
            label,
            lock_duration_secs,
            balance: 0,
            created_at,
        }
    }

    /// The asset this bank holds.
    pub fn asset(&self) -> Asset {
        self.asset
    }

    /// Base or Token.
    pub fn asset_class(&self) -> AssetClass {
        self.asset.class()
    }

    /// The token identity for token banks, `None` for base banks.
    pub fn token(&self) -> Option<Identity> {
        self.asset.token()
    }

    /// The owner's free-text name for this bank.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn lock_duration_secs(&self) -> u64 {
        self.lock_duration_secs
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The instant from which withdrawals are fee-free. Saturates at the end
    /// of chrono's representable range.
    pub fn unlocks_at(&self) -> DateTime<Utc> {
        i64::try_from(self.lock_duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lock| self.created_at.checked_add_signed(lock))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whole seconds since the bank was opened. A `now` before the creation
    /// time counts as zero.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    pub fn lock_status(&self, now: DateTime<Utc>) -> LockStatus {
        if self.elapsed_secs(now) < self.lock_duration_secs {
            LockStatus::Locked
        } else {
            LockStatus::Unlocked
        }
    }

    /// Seconds until the bank unlocks, zero once it has.
    pub fn remaining_lock_secs(&self, now: DateTime<Utc>) -> u64 {
        self.lock_duration_secs
            .saturating_sub(self.elapsed_secs(now))
    }

    pub(crate) fn set_balance(&mut self, balance: u64) {
        self.balance = balance;
    }
}

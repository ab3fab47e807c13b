//! # Per-Holder Balance Sheets
//!
//! A [`BalanceSheet`] is everything one identity holds in custody: one
//! [`Balance`] per [`Asset`]. It enforces the only two rules money has --
//! you can never spend more than you hold, and you can never hold more than
//! `u64::MAX` of one thing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Asset;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance: available {available}, requested {requested} ({asset})")]
    InsufficientBalance {
        /// The asset being debited.
        asset: Asset,
        /// The current balance.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Arithmetic overflow during a credit operation.
    #[error("balance overflow: current {current}, credit {credit} ({asset})")]
    Overflow {
        /// The asset being credited.
        asset: Asset,
        /// The balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// A single asset balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// The asset this balance is for.
    pub asset: Asset,

    /// Balance in smallest units.
    pub amount: u64,
}

impl Balance {
    /// Creates a new zero balance for the given asset.
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            amount: 0,
        }
    }

    /// Returns `true` if this balance is zero.
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

// ---------------------------------------------------------------------------
// BalanceSheet
// ---------------------------------------------------------------------------

/// The complete set of custody balances for a single holder.
///
/// An asset that was never credited reads as zero; debiting it fails with
/// [`BalanceError::InsufficientBalance`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    #[serde(with = "crate::asset::asset_map")]
    balances: HashMap<Asset, Balance>,
}

impl BalanceSheet {
    /// Creates an empty balance sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` of `asset` and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::Overflow`] if the credit would exceed `u64::MAX`.
    /// The sheet is left unchanged in that case.
    pub fn credit(&mut self, asset: Asset, amount: u64) -> Result<u64, BalanceError> {
        let current = self.get_balance(&asset);
        let new_amount = current.checked_add(amount).ok_or(BalanceError::Overflow {
            asset,
            current,
            credit: amount,
        })?;

        let balance = self
            .balances
            .entry(asset)
            .or_insert_with(|| Balance::new(asset));
        balance.amount = new_amount;

        Ok(new_amount)
    }

    /// Debits `amount` of `asset` and returns the remaining balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if the debit exceeds
    /// the current balance. The sheet is left unchanged in that case.
    pub fn debit(&mut self, asset: Asset, amount: u64) -> Result<u64, BalanceError> {
        let available = self.get_balance(&asset);
        if available < amount {
            return Err(BalanceError::InsufficientBalance {
                asset,
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(available);
        }

        let balance = self
            .balances
            .entry(asset)
            .or_insert_with(|| Balance::new(asset));
        balance.amount -= amount;

        Ok(balance.amount)
    }

    /// Returns the balance of `asset`, zero if never credited.
    pub fn get_balance(&self, asset: &Asset) -> u64 {
        self.balances.get(asset).map(|b| b.amount).unwrap_or(0)
    }

    /// Returns all non-zero balances as `(asset, amount)` pairs, sorted by asset.
    pub fn all_balances(&self) -> Vec<(Asset, u64)> {
        let mut out: Vec<(Asset, u64)> = self
            .balances
            .iter()
            .filter(|(_, b)| !b.is_zero())
            .map(|(asset, b)| (*asset, b.amount))
            .collect();
        out.sort();
        out
    }

    /// Returns `true` if no asset was ever credited.
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

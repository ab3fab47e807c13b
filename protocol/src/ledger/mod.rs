//! # Custody Ledger
//!
//! The ledger is the world outside the vaults: it records how much base
//! currency and how many tokens every identity (savers, the admin, and each
//! vault's custody address) actually holds. Vaults never touch these
//! balances directly; they hand the ledger a batch of [`Transfer`]s and the
//! ledger applies all of them or none.
//!
//! ```text
//! balance.rs  -- BalanceSheet: one holder's balances, overflow/underflow checked
//! mod.rs      -- Ledger trait, Transfer, InMemoryLedger
//! ```
//!
//! A holder can be marked as refusing incoming payments. That is the
//! in-process stand-in for a recipient that rejects a transfer, and it is
//! what makes the all-or-nothing settlement path testable.

pub mod balance;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Asset;
use crate::identity::Identity;

pub use balance::{Balance, BalanceError, BalanceSheet};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while settling transfers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A holder's balance sheet refused the debit or credit.
    #[error("{holder}: {source}")]
    Balance {
        /// The holder whose balance could not be updated.
        holder: Identity,
        /// The underlying balance failure.
        #[source]
        source: BalanceError,
    },

    /// The recipient refuses incoming payments.
    #[error("recipient {recipient} rejected an incoming {asset} payment")]
    Rejected {
        /// The asset that was being paid.
        asset: Asset,
        /// The refusing recipient.
        recipient: Identity,
    },
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

/// One movement of value between two holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// What is moving.
    pub asset: Asset,
    /// Who pays.
    pub from: Identity,
    /// Who receives.
    pub to: Identity,
    /// How much, in smallest units.
    pub amount: u64,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Custody of value for every identity.
pub trait Ledger: Send {
    /// Returns how much of `asset` `holder` currently holds.
    fn balance_of(&self, asset: &Asset, holder: &Identity) -> u64;

    /// Applies every transfer in order, or none of them.
    ///
    /// On error the ledger is exactly as it was before the call.
    fn settle(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError>;
}

/// A ledger held entirely in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryLedger {
    accounts: HashMap<Identity, BalanceSheet>,
    rejecting: HashSet<Identity>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` of `asset` out of thin air for `to`.
    ///
    /// This is the devnet faucet and the test fixture; it ignores the
    /// rejection list.
    pub fn mint(&mut self, asset: Asset, to: Identity, amount: u64) -> Result<u64, LedgerError> {
        let sheet = self.accounts.entry(to).or_default();
        let balance = sheet
            .credit(asset, amount)
            .map_err(|source| LedgerError::Balance { holder: to, source })?;
        tracing::debug!(%asset, to = %to.short(), amount, balance, "minted");
        Ok(balance)
    }

    /// Makes `holder` refuse every future incoming payment.
    pub fn reject_incoming(&mut self, holder: Identity) {
        self.rejecting.insert(holder);
    }

    /// Makes `holder` accept incoming payments again.
    pub fn accept_incoming(&mut self, holder: Identity) {
        self.rejecting.remove(&holder);
    }

    /// Returns the full balance sheet of `holder`, if it ever held anything.
    pub fn sheet(&self, holder: &Identity) -> Option<&BalanceSheet> {
        self.accounts.get(holder)
    }

    /// Total amount of `asset` held across every holder.
    pub fn supply(&self, asset: &Asset) -> u128 {
        self.accounts
            .values()
            .map(|sheet| u128::from(sheet.get_balance(asset)))
            .sum()
    }
}

impl Ledger for InMemoryLedger {
    fn balance_of(&self, asset: &Asset, holder: &Identity) -> u64 {
        self.accounts
            .get(holder)
            .map(|sheet| sheet.get_balance(asset))
            .unwrap_or(0)
    }

    fn settle(&mut self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        // Apply the batch to copies of the touched sheets; swap them in only
        // once every transfer has gone through.
        let mut scratch: HashMap<Identity, BalanceSheet> = HashMap::new();

        for transfer in transfers.iter().filter(|t| t.amount > 0) {
            if self.rejecting.contains(&transfer.to) {
                return Err(LedgerError::Rejected {
                    asset: transfer.asset,
                    recipient: transfer.to,
                });
            }

            scratch
                .entry(transfer.from)
                .or_insert_with(|| self.accounts.get(&transfer.from).cloned().unwrap_or_default())
                .debit(transfer.asset, transfer.amount)
                .map_err(|source| LedgerError::Balance {
                    holder: transfer.from,
                    source,
                })?;

            scratch
                .entry(transfer.to)
                .or_insert_with(|| self.accounts.get(&transfer.to).cloned().unwrap_or_default())
                .credit(transfer.asset, transfer.amount)
                .map_err(|source| LedgerError::Balance {
                    holder: transfer.to,
                    source,
                })?;
        }

        self.accounts.extend(scratch);
        Ok(())
    }
}

//! # Staged Settlement
//!
//! Deposits and withdrawals change two things that must never disagree: a
//! bank's recorded balance and the custody ledger. A [`Settlement`] stages
//! the bank's new balance next to the transfers that justify it. Committing
//! settles the transfers first, as one all-or-nothing batch, and only then
//! writes the staged balance. If the ledger refuses, the settlement is
//! dropped and the bank is untouched.

use piggy_protocol::{Asset, Identity, Ledger, LedgerError, Transfer};

use crate::bank::Bank;

/// A bank balance change waiting on its custody transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a settlement does nothing until committed"]
pub struct Settlement {
    staged_balance: u64,
    transfers: Vec<Transfer>,
}

impl Settlement {
    /// Starts a settlement that will leave the bank holding `staged_balance`.
    pub fn stage(staged_balance: u64) -> Self {
        Self {
            staged_balance,
            transfers: Vec::with_capacity(2),
        }
    }

    /// Adds a transfer to the batch. Zero amounts are dropped.
    pub fn pay(mut self, asset: Asset, from: Identity, to: Identity, amount: u64) -> Self {
        if amount > 0 {
            self.transfers.push(Transfer {
                asset,
                from,
                to,
                amount,
            });
        }
        self
    }

    /// The balance the bank will hold after commit.
    pub fn staged_balance(&self) -> u64 {
        self.staged_balance
    }

    /// The transfers that will be settled, in order.
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Settles every transfer, then writes the staged balance into `bank`.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error if any transfer is refused; neither the
    /// ledger nor the bank changes in that case.
    pub fn commit(self, ledger: &mut dyn Ledger, bank: &mut Bank) -> Result<(), LedgerError> {
        ledger.settle(&self.transfers)?;
        bank.set_balance(self.staged_balance);
        Ok(())
    }
}

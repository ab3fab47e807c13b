//! # Observable Events
//!
//! Every successful state change in the registry or a vault appends one
//! [`Event`] to that component's journal. Failed calls append nothing.

use serde::{Deserialize, Serialize};

use crate::asset::AssetClass;
use crate::identity::Identity;

/// An observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An identity registered itself and received a vault.
    Registered { identity: Identity, vault: Identity },

    /// The admin provisioned a vault on behalf of an identity.
    Provisioned { identity: Identity, vault: Identity },

    /// A bank was opened inside a vault.
    BankCreated {
        vault: Identity,
        asset_class: AssetClass,
        bank_index: usize,
        lock_duration_secs: u64,
    },

    /// Value was credited to a bank.
    Deposited {
        vault: Identity,
        asset_class: AssetClass,
        bank_index: usize,
        amount: u64,
    },

    /// Value left a bank. `amount` is the gross debit; `fee` is the part
    /// routed to the admin.
    Withdrawn {
        vault: Identity,
        asset_class: AssetClass,
        bank_index: usize,
        amount: u64,
        fee: u64,
    },
}

impl Event {
    /// Short snake_case name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Registered { .. } => "registered",
            Event::Provisioned { .. } => "provisioned",
            Event::BankCreated { .. } => "bank_created",
            Event::Deposited { .. } => "deposited",
            Event::Withdrawn { .. } => "withdrawn",
        }
    }
}

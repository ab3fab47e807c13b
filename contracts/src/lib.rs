//! # Piggy Contracts
//!
//! The savings engine. Two contracts, one per concern:
//!
//! - **Vault**: one identity's savings, held in time-locked banks of base
//!   currency or a token. Early withdrawals pay the breaking fee.
//! - **Registry**: one vault per identity, self-service or provisioned by
//!   the admin, plus aggregate queries delegated to the owning vault.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow with `checked_add`,
//!    `checked_sub` and widening to `u128` where a product could overflow.
//! 2. Validate everything, then mutate. A failed call changes nothing.
//! 3. Custody transfers and bank balances move together through a staged
//!    [`settlement::Settlement`], never one without the other.
//! 4. Every public type is serializable (serde) for wire transport and
//!    snapshots.

pub mod bank;
pub mod registry;
pub mod settlement;
pub mod vault;

pub use bank::{breaking_fee, Bank, BankIndex, LockStatus};
pub use registry::{Registry, RegistryError};
pub use settlement::Settlement;
pub use vault::{Vault, VaultError, Withdrawal};

//! # Vault Registry
//!
//! The registry hands out exactly one [`Vault`] per identity, forever. An
//! identity either registers itself or is provisioned by the admin; either
//! way the vault is created with the registry's admin baked in as its fee
//! recipient, and the mapping is never changed or removed.
//!
//! The vault handle given back to callers is the vault's custody
//! [`Identity`]. Resolve it with [`Registry::vault`] /
//! [`Registry::vault_mut`] to reach bank-level operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use piggy_protocol::{AssetClass, Event, Identity};

use crate::vault::Vault;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The identity already has a vault.
    #[error("already registered: {identity} owns vault {vault}")]
    AlreadyRegistered {
        /// The identity that was being registered.
        identity: Identity,
        /// Its existing vault.
        vault: Identity,
    },

    /// The identity has no vault.
    #[error("not registered: {identity} has no vault")]
    NotRegistered { identity: Identity },

    /// Only the admin may provision vaults for others.
    #[error("not admin: {caller} is not the registry admin")]
    NotAdmin { caller: Identity },
}

impl RegistryError {
    /// Stable snake_case discriminator for programmatic branching.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::AlreadyRegistered { .. } => "already_registered",
            RegistryError::NotRegistered { .. } => "not_registered",
            RegistryError::NotAdmin { .. } => "not_admin",
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Directory of every vault, keyed by owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    admin: Identity,
    /// Owner -> position in `vaults`.
    by_owner: HashMap<Identity, usize>,
    /// Vault address -> position in `vaults`.
    by_address: HashMap<Identity, usize>,
    /// Append-only directory.
    vaults: Vec<Vault>,
    journal: Vec<Event>,
}

impl Registry {
    /// Creates an empty registry administered by `admin`.
    pub fn new(admin: Identity) -> Self {
        Self {
            admin,
            by_owner: HashMap::new(),
            by_address: HashMap::new(),
            vaults: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// The admin: fee recipient of every vault and provisioning authority.
    pub fn admin(&self) -> Identity {
        self.admin
    }

    /// Registry-level events (`Registered`, `Provisioned`), oldest first.
    pub fn events(&self) -> &[Event] {
        &self.journal
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Creates a vault for `caller` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if `caller` has a vault.
    pub fn register(
        &mut self,
        caller: Identity,
        now: DateTime<Utc>,
    ) -> Result<Identity, RegistryError> {
        let vault = self.open_vault(caller, now)?;
        self.journal.push(Event::Registered {
            identity: caller,
            vault,
        });
        tracing::info!(identity = %caller.short(), vault = %vault.short(), "registered");
        Ok(vault)
    }

    /// Admin-only: creates a vault for `target` and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotAdmin`] if `caller` is not the admin, and
    /// [`RegistryError::AlreadyRegistered`] if `target` has a vault.
    pub fn provision(
        &mut self,
        caller: Identity,
        target: Identity,
        now: DateTime<Utc>,
    ) -> Result<Identity, RegistryError> {
        if caller != self.admin {
            tracing::debug!(caller = %caller.short(), "rejected provision by non-admin");
            return Err(RegistryError::NotAdmin { caller });
        }
        let vault = self.open_vault(target, now)?;
        self.journal.push(Event::Provisioned {
            identity: target,
            vault,
        });
        tracing::info!(identity = %target.short(), vault = %vault.short(), "provisioned");
        Ok(vault)
    }

    fn open_vault(&mut self, owner: Identity, now: DateTime<Utc>) -> Result<Identity, RegistryError> {
        if let Some(existing) = self.by_owner.get(&owner).and_then(|&i| self.vaults.get(i)) {
            return Err(RegistryError::AlreadyRegistered {
                identity: owner,
                vault: existing.address(),
            });
        }

        let position = self.vaults.len();
        let address = Identity::vault_address(&self.admin, &owner, position as u64);
        self.vaults.push(Vault::new(address, owner, self.admin, now));
        self.by_owner.insert(owner, position);
        self.by_address.insert(address, position);
        Ok(address)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn is_registered(&self, identity: &Identity) -> bool {
        self.vault_for(identity).is_ok()
    }

    pub fn total_registered(&self) -> usize {
        self.vaults.len()
    }

    /// The vault handle of `identity`.
    pub fn vault_of(&self, identity: &Identity) -> Result<Identity, RegistryError> {
        self.vault_for(identity).map(Vault::address)
    }

    /// Every vault handle, in creation order.
    pub fn all_vaults(&self) -> Vec<Identity> {
        self.vaults.iter().map(Vault::address).collect()
    }

    /// Resolves a vault handle.
    pub fn vault(&self, handle: &Identity) -> Option<&Vault> {
        self.by_address.get(handle).and_then(|&i| self.vaults.get(i))
    }

    /// Resolves a vault handle for bank-level writes.
    pub fn vault_mut(&mut self, handle: &Identity) -> Option<&mut Vault> {
        let position = *self.by_address.get(handle)?;
        self.vaults.get_mut(position)
    }

    /// The vault owned by `identity`.
    pub fn vault_for(&self, identity: &Identity) -> Result<&Vault, RegistryError> {
        self.by_owner
            .get(identity)
            .and_then(|&i| self.vaults.get(i))
            .ok_or(RegistryError::NotRegistered {
                identity: *identity,
            })
    }

    /// The vault owned by `identity`, for bank-level writes.
    pub fn vault_for_mut(&mut self, identity: &Identity) -> Result<&mut Vault, RegistryError> {
        self.by_owner
            .get(identity)
            .and_then(|&i| self.vaults.get_mut(i))
            .ok_or(RegistryError::NotRegistered {
                identity: *identity,
            })
    }

    /// `(base_count, token_count)` of the vault owned by `identity`.
    pub fn bank_counts_of(&self, identity: &Identity) -> Result<(usize, usize), RegistryError> {
        self.vault_for(identity).map(Vault::bank_counts)
    }

    /// `(base_total, token_total)` of the vault owned by `identity`; the
    /// token total is restricted to `token` when given.
    pub fn total_balance_of(
        &self,
        identity: &Identity,
        token: Option<&Identity>,
    ) -> Result<(u64, u64), RegistryError> {
        let vault = self.vault_for(identity)?;
        Ok((
            vault.total_balance(AssetClass::Base, None),
            vault.total_balance(AssetClass::Token, token),
        ))
    }
}

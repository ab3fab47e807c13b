//! # Vault Contract
//!
//! A vault is one identity's savings account. It holds two independent,
//! append-only collections of [`Bank`]s, one per [`AssetClass`], and a
//! custody address on the ledger where the deposited value actually sits.
//!
//! ## Rules
//!
//! - Only the owner creates banks, deposits and withdraws.
//! - Within one asset class, no two banks share a lock duration. Base and
//!   Token keep separate namespaces.
//! - Bank indices are handed out in append order and never reused.
//! - Withdrawing while a bank is locked costs [`breaking_fee`], paid to the
//!   admin captured when the vault was created. The lock clock starts when
//!   the bank is opened and is never reset, so each partial withdrawal is
//!   judged against the same creation time.
//! - Every mutating call validates everything first. Custody transfers and
//!   the bank balance change are committed together through a
//!   [`Settlement`], or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use piggy_protocol::config::MAX_LOCK_DURATION_SECS;
use piggy_protocol::{Asset, AssetClass, Event, Identity, Ledger, LedgerError};

use crate::bank::{breaking_fee, Bank, BankIndex, LockStatus};
use crate::settlement::Settlement;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The caller does not own this vault.
    #[error("not owner: {caller} does not own this vault (owner {owner})")]
    NotOwner {
        /// Who called.
        caller: Identity,
        /// Who owns the vault.
        owner: Identity,
    },

    /// Another bank of the same class already uses this lock duration.
    #[error(
        "duplicate lock period: {asset_class} bank {existing_index} already locks for {lock_duration_secs}s"
    )]
    DuplicateLockPeriod {
        asset_class: AssetClass,
        lock_duration_secs: u64,
        existing_index: BankIndex,
    },

    /// No bank of this class at this index.
    #[error("invalid bank: no {asset_class} bank at index {index}")]
    InvalidBank {
        asset_class: AssetClass,
        index: BankIndex,
    },

    /// The amount is not a positive number of units.
    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: u64 },

    /// The withdrawal exceeds the bank balance.
    #[error(
        "insufficient balance in {asset_class} bank {index}: balance {balance}, requested {requested}"
    )]
    InsufficientBalance {
        asset_class: AssetClass,
        index: BankIndex,
        balance: u64,
        requested: u64,
    },

    /// Withdrawals cannot pay the vault's own custody address.
    #[error("invalid destination: {destination} is this vault's custody address")]
    InvalidDestination { destination: Identity },

    /// A custody transfer was refused; nothing changed.
    #[error("transfer of {asset} failed: {source}")]
    TransferFailed {
        asset: Asset,
        #[source]
        source: LedgerError,
    },

    /// Lock durations must be positive and bounded.
    #[error("invalid lock duration: {lock_duration_secs}s (must be 1..={max}s)")]
    InvalidLockDuration { lock_duration_secs: u64, max: u64 },

    /// A token bank needs a token identity.
    #[error("token bank requires a token identity")]
    MissingToken,

    /// The deposit would push the bank balance past `u64::MAX`.
    #[error("balance overflow in {asset_class} bank {index}: balance {balance}, deposit {amount}")]
    BalanceOverflow {
        asset_class: AssetClass,
        index: BankIndex,
        balance: u64,
        amount: u64,
    },
}

impl VaultError {
    /// Stable snake_case discriminator for programmatic branching.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotOwner { .. } => "not_owner",
            VaultError::DuplicateLockPeriod { .. } => "duplicate_lock_period",
            VaultError::InvalidBank { .. } => "invalid_bank",
            VaultError::InvalidAmount { .. } => "invalid_amount",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::InvalidDestination { .. } => "invalid_destination",
            VaultError::TransferFailed { .. } => "transfer_failed",
            VaultError::InvalidLockDuration { .. } => "invalid_lock_duration",
            VaultError::MissingToken => "missing_token",
            VaultError::BalanceOverflow { .. } => "balance_overflow",
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Receipt for a settled withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Unique receipt identifier.
    pub receipt_id: Uuid,
    /// Gross amount debited from the bank.
    pub amount: u64,
    /// Breaking fee paid to the admin (zero once unlocked).
    pub fee: u64,
    /// Amount paid to the destination.
    pub net: u64,
    /// Whether the bank was still locked.
    pub early: bool,
}

/// One identity's savings vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    /// Custody address on the ledger; also the vault's public handle.
    address: Identity,
    owner: Identity,
    /// Fee recipient, fixed at creation.
    admin: Identity,
    created_at: DateTime<Utc>,
    base_banks: Vec<Bank>,
    token_banks: Vec<Bank>,
    journal: Vec<Event>,
}

impl Vault {
    /// Creates an empty vault.
    pub fn new(
        address: Identity,
        owner: Identity,
        admin: Identity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            address,
            owner,
            admin,
            created_at,
            base_banks: Vec::new(),
            token_banks: Vec::new(),
            journal: Vec::new(),
        }
    }

    pub fn address(&self) -> Identity {
        self.address
    }

    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn admin(&self) -> Identity {
        self.admin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Everything this vault has done, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.journal
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Opens a new bank and returns its index within `asset_class`.
    ///
    /// A `token` passed for a base bank is ignored.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotOwner`], [`VaultError::InvalidLockDuration`],
    /// [`VaultError::MissingToken`], [`VaultError::DuplicateLockPeriod`].
    pub fn create_bank(
        &mut self,
        caller: Identity,
        asset_class: AssetClass,
        label: impl Into<String>,
        token: Option<Identity>,
        lock_duration_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<BankIndex, VaultError> {
        self.ensure_owner(caller)?;

        if lock_duration_secs == 0 || lock_duration_secs > MAX_LOCK_DURATION_SECS {
            return Err(VaultError::InvalidLockDuration {
                lock_duration_secs,
                max: MAX_LOCK_DURATION_SECS,
            });
        }

        let asset = match asset_class {
            AssetClass::Base => Asset::Base,
            AssetClass::Token => Asset::Token(token.ok_or(VaultError::MissingToken)?),
        };

        if let Some(existing_index) = self
            .banks(asset_class)
            .iter()
            .position(|b| b.lock_duration_secs() == lock_duration_secs)
        {
            return Err(VaultError::DuplicateLockPeriod {
                asset_class,
                lock_duration_secs,
                existing_index,
            });
        }

        let banks = self.banks_mut(asset_class);
        banks.push(Bank::open(asset, label.into(), lock_duration_secs, now));
        let index = banks.len() - 1;

        self.journal.push(Event::BankCreated {
            vault: self.address,
            asset_class,
            bank_index: index,
            lock_duration_secs,
        });
        tracing::info!(
            vault = %self.address.short(),
            %asset_class,
            index,
            lock_duration_secs,
            "bank created"
        );

        Ok(index)
    }

    /// Moves `amount` of the bank's asset from `caller` into custody and
    /// credits the bank. Returns the new bank balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotOwner`], [`VaultError::InvalidBank`],
    /// [`VaultError::InvalidAmount`], [`VaultError::BalanceOverflow`],
    /// [`VaultError::TransferFailed`] (e.g. the caller lacks the funds).
    pub fn deposit(
        &mut self,
        ledger: &mut dyn Ledger,
        caller: Identity,
        asset_class: AssetClass,
        index: BankIndex,
        amount: u64,
    ) -> Result<u64, VaultError> {
        self.ensure_owner(caller)?;
        let address = self.address;
        let bank = self.bank_mut(asset_class, index)?;

        if amount == 0 {
            return Err(VaultError::InvalidAmount { amount });
        }

        let staged = bank
            .balance()
            .checked_add(amount)
            .ok_or(VaultError::BalanceOverflow {
                asset_class,
                index,
                balance: bank.balance(),
                amount,
            })?;

        let asset = bank.asset();
        Settlement::stage(staged)
            .pay(asset, caller, address, amount)
            .commit(ledger, bank)
            .map_err(|source| VaultError::TransferFailed { asset, source })?;

        self.journal.push(Event::Deposited {
            vault: address,
            asset_class,
            bank_index: index,
            amount,
        });
        tracing::info!(
            vault = %address.short(),
            %asset_class,
            index,
            amount,
            balance = staged,
            "deposit settled"
        );

        Ok(staged)
    }

    /// Debits `amount` from the bank and pays it out of custody: everything
    /// to `destination` once unlocked, otherwise the breaking fee to the
    /// admin and the rest to `destination`.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotOwner`], [`VaultError::InvalidBank`],
    /// [`VaultError::InvalidAmount`], [`VaultError::InvalidDestination`] when
    /// `destination` is the vault itself, [`VaultError::InsufficientBalance`],
    /// [`VaultError::TransferFailed`] if either payment is refused.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw(
        &mut self,
        ledger: &mut dyn Ledger,
        caller: Identity,
        asset_class: AssetClass,
        index: BankIndex,
        destination: Identity,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, VaultError> {
        self.ensure_owner(caller)?;
        let (address, admin) = (self.address, self.admin);
        let bank = self.bank_mut(asset_class, index)?;

        if amount == 0 {
            return Err(VaultError::InvalidAmount { amount });
        }
        if destination == address {
            return Err(VaultError::InvalidDestination { destination });
        }
        if amount > bank.balance() {
            return Err(VaultError::InsufficientBalance {
                asset_class,
                index,
                balance: bank.balance(),
                requested: amount,
            });
        }

        let early = bank.lock_status(now) == LockStatus::Locked;
        let fee = if early { breaking_fee(amount) } else { 0 };
        let net = amount - fee;
        let asset = bank.asset();

        Settlement::stage(bank.balance() - amount)
            .pay(asset, address, admin, fee)
            .pay(asset, address, destination, net)
            .commit(ledger, bank)
            .map_err(|source| VaultError::TransferFailed { asset, source })?;

        self.journal.push(Event::Withdrawn {
            vault: address,
            asset_class,
            bank_index: index,
            amount,
            fee,
        });
        tracing::info!(
            vault = %address.short(),
            %asset_class,
            index,
            amount,
            fee,
            net,
            early,
            "withdrawal settled"
        );

        Ok(Withdrawal {
            receipt_id: Uuid::new_v4(),
            amount,
            fee,
            net,
            early,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All banks of one class, in index order.
    pub fn banks(&self, asset_class: AssetClass) -> &[Bank] {
        match asset_class {
            AssetClass::Base => &self.base_banks,
            AssetClass::Token => &self.token_banks,
        }
    }

    /// One bank.
    pub fn bank(&self, asset_class: AssetClass, index: BankIndex) -> Result<&Bank, VaultError> {
        self.banks(asset_class)
            .get(index)
            .ok_or(VaultError::InvalidBank { asset_class, index })
    }

    /// `(base_count, token_count)`.
    pub fn bank_counts(&self) -> (usize, usize) {
        (self.base_banks.len(), self.token_banks.len())
    }

    pub fn bank_balance(&self, asset_class: AssetClass, index: BankIndex) -> Result<u64, VaultError> {
        self.bank(asset_class, index).map(Bank::balance)
    }

    /// Seconds until the bank unlocks, zero once it has.
    pub fn remaining_lock_time(
        &self,
        asset_class: AssetClass,
        index: BankIndex,
        now: DateTime<Utc>,
    ) -> Result<u64, VaultError> {
        self.bank(asset_class, index)
            .map(|b| b.remaining_lock_secs(now))
    }

    pub fn lock_status(
        &self,
        asset_class: AssetClass,
        index: BankIndex,
        now: DateTime<Utc>,
    ) -> Result<LockStatus, VaultError> {
        self.bank(asset_class, index).map(|b| b.lock_status(now))
    }

    /// Sum of all bank balances in `asset_class`.
    ///
    /// For token banks, `token` restricts the sum to banks of that token;
    /// `None` sums every token bank (saturating, since different tokens do
    /// not share a unit). The filter is ignored for base banks.
    pub fn total_balance(&self, asset_class: AssetClass, token: Option<&Identity>) -> u64 {
        self.banks(asset_class)
            .iter()
            .filter(|b| match (asset_class, token) {
                (AssetClass::Token, Some(t)) => b.token().as_ref() == Some(t),
                _ => true,
            })
            .fold(0u64, |acc, b| acc.saturating_add(b.balance()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_owner(&self, caller: Identity) -> Result<(), VaultError> {
        if caller != self.owner {
            tracing::debug!(
                vault = %self.address.short(),
                caller = %caller.short(),
                "rejected non-owner call"
            );
            return Err(VaultError::NotOwner {
                caller,
                owner: self.owner,
            });
        }
        Ok(())
    }

    fn banks_mut(&mut self, asset_class: AssetClass) -> &mut Vec<Bank> {
        match asset_class {
            AssetClass::Base => &mut self.base_banks,
            AssetClass::Token => &mut self.token_banks,
        }
    }

    fn bank_mut(&mut self, asset_class: AssetClass, index: BankIndex) -> Result<&mut Bank, VaultError> {
        self.banks_mut(asset_class)
            .get_mut(index)
            .ok_or(VaultError::InvalidBank { asset_class, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use piggy_protocol::InMemoryLedger;

    const DAY: u64 = 86_400;

    struct Fixture {
        vault: Vault,
        ledger: InMemoryLedger,
        owner: Identity,
        admin: Identity,
        t0: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let owner = Identity::derive("owner");
        let admin = Identity::derive("admin");
        let t0 = Utc::now();
        let address = Identity::vault_address(&admin, &owner, 0);
        let mut ledger = InMemoryLedger::new();
        ledger.mint(Asset::Base, owner, 1_000).unwrap();
        Fixture {
            vault: Vault::new(address, owner, admin, t0),
            ledger,
            owner,
            admin,
            t0,
        }
    }

    #[test]
    fn create_bank_assigns_append_order_indices() {
        let mut f = fixture();
        let a = f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let b = f.vault.create_bank(f.owner, AssetClass::Base, "b", None, 2 * DAY, f.t0).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(f.vault.bank_counts(), (2, 0));
    }

    #[test]
    fn base_bank_discards_token() {
        let mut f = fixture();
        let usd = Identity::derive("usd-token");
        f.vault.create_bank(f.owner, AssetClass::Base, "a", Some(usd), DAY, f.t0).unwrap();
        assert_eq!(f.vault.bank(AssetClass::Base, 0).unwrap().token(), None);
    }

    #[test]
    fn token_bank_without_token_rejected() {
        let mut f = fixture();
        let err = f
            .vault
            .create_bank(f.owner, AssetClass::Token, "t", None, DAY, f.t0)
            .unwrap_err();
        assert_eq!(err, VaultError::MissingToken);
        assert_eq!(f.vault.bank_counts(), (0, 0));
    }

    #[test]
    fn zero_and_oversized_lock_durations_rejected() {
        let mut f = fixture();
        for secs in [0, MAX_LOCK_DURATION_SECS + 1] {
            let err = f
                .vault
                .create_bank(f.owner, AssetClass::Base, "x", None, secs, f.t0)
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_lock_duration");
        }
    }

    #[test]
    fn duplicate_lock_reports_existing_index() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        f.vault.create_bank(f.owner, AssetClass::Base, "b", None, 2 * DAY, f.t0).unwrap();
        let err = f
            .vault
            .create_bank(f.owner, AssetClass::Base, "c", None, 2 * DAY, f.t0)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::DuplicateLockPeriod {
                asset_class: AssetClass::Base,
                lock_duration_secs: 2 * DAY,
                existing_index: 1,
            }
        );
    }

    #[test]
    fn deposit_zero_rejected() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let err = f
            .vault
            .deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 0)
            .unwrap_err();
        assert_eq!(err, VaultError::InvalidAmount { amount: 0 });
    }

    #[test]
    fn deposit_into_wrong_class_is_invalid_bank() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let err = f
            .vault
            .deposit(&mut f.ledger, f.owner, AssetClass::Token, 0, 10)
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::InvalidBank {
                asset_class: AssetClass::Token,
                index: 0
            }
        );
    }

    #[test]
    fn deposit_moves_value_into_custody() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let balance = f
            .vault
            .deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 100)
            .unwrap();
        assert_eq!(balance, 100);
        assert_eq!(f.ledger.balance_of(&Asset::Base, &f.owner), 900);
        assert_eq!(f.ledger.balance_of(&Asset::Base, &f.vault.address()), 100);
    }

    #[test]
    fn partial_early_withdrawals_each_pay_truncated_fee() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 100).unwrap();

        let later = f.t0 + Duration::hours(12);
        let w1 = f
            .vault
            .withdraw(&mut f.ledger, f.owner, AssetClass::Base, 0, f.owner, 50, later)
            .unwrap();
        let w2 = f
            .vault
            .withdraw(&mut f.ledger, f.owner, AssetClass::Base, 0, f.owner, 50, later)
            .unwrap();

        assert_eq!((w1.fee, w1.net, w2.fee, w2.net), (1, 49, 1, 49));
        assert!(w1.early && w2.early);
        assert_ne!(w1.receipt_id, w2.receipt_id);
        assert_eq!(f.ledger.balance_of(&Asset::Base, &f.admin), 2);
        assert_eq!(f.vault.bank_balance(AssetClass::Base, 0).unwrap(), 0);
    }

    #[test]
    fn lock_clock_does_not_reset_after_partial_withdrawal() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 200).unwrap();

        let early = f.t0 + Duration::hours(23);
        f.vault
            .withdraw(&mut f.ledger, f.owner, AssetClass::Base, 0, f.owner, 100, early)
            .unwrap();

        let after = f.t0 + Duration::seconds(DAY as i64);
        assert_eq!(
            f.vault.remaining_lock_time(AssetClass::Base, 0, after).unwrap(),
            0
        );
        let w = f
            .vault
            .withdraw(&mut f.ledger, f.owner, AssetClass::Base, 0, f.owner, 100, after)
            .unwrap();
        assert_eq!((w.fee, w.net, w.early), (0, 100, false));
    }

    #[test]
    fn withdraw_zero_rejected() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let err = f
            .vault
            .withdraw(&mut f.ledger, f.owner, AssetClass::Base, 0, f.owner, 0, f.t0)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_amount");
    }

    #[test]
    fn events_are_journaled_only_on_success() {
        let mut f = fixture();
        f.vault.create_bank(f.owner, AssetClass::Base, "a", None, DAY, f.t0).unwrap();
        let _ = f.vault.create_bank(f.owner, AssetClass::Base, "dup", None, DAY, f.t0);
        f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 10).unwrap();
        let _ = f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Base, 0, 10_000);

        let names: Vec<_> = f.vault.events().iter().map(Event::name).collect();
        assert_eq!(names, vec!["bank_created", "deposited"]);
    }

    #[test]
    fn total_balance_filters_tokens() {
        let mut f = fixture();
        let usd = Identity::derive("usd-token");
        let eur = Identity::derive("eur-token");
        f.ledger.mint(Asset::Token(usd), f.owner, 50).unwrap();
        f.ledger.mint(Asset::Token(eur), f.owner, 70).unwrap();
        f.vault.create_bank(f.owner, AssetClass::Token, "usd", Some(usd), DAY, f.t0).unwrap();
        f.vault.create_bank(f.owner, AssetClass::Token, "eur", Some(eur), 2 * DAY, f.t0).unwrap();
        f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Token, 0, 50).unwrap();
        f.vault.deposit(&mut f.ledger, f.owner, AssetClass::Token, 1, 70).unwrap();

        assert_eq!(f.vault.total_balance(AssetClass::Token, Some(&usd)), 50);
        assert_eq!(f.vault.total_balance(AssetClass::Token, Some(&eur)), 70);
        assert_eq!(f.vault.total_balance(AssetClass::Token, None), 120);
        assert_eq!(f.vault.total_balance(AssetClass::Base, Some(&usd)), 0);
    }
}

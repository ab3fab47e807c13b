// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Piggy Protocol Primitives
//!
//! Everything the savings engine needs that is not the engine itself: who
//! the principals are, what kinds of value exist, what time it is, and who
//! actually holds the money.
//!
//! ## Architecture
//!
//! - **config**: policy constants such as the breaking fee and lock bounds.
//! - **identity**: 32-byte opaque principals and vault address derivation.
//! - **asset**: `AssetClass` (Base / Token) and the concrete `Asset`.
//! - **clock**: Wall clock and a manual clock for tests and devnet.
//! - **ledger**: Custody balances and all-or-nothing transfer settlement.
//! - **events**: The observable event vocabulary.
//!
//! ## Design Philosophy
//!
//! 1. All amounts are `u64` in the smallest unit. No floating point, ever.
//! 2. Every arithmetic step on money is checked.
//! 3. Lock arithmetic takes "now" as an argument and never reads the wall clock.
//! 4. If it touches money, it has tests. Plural.

pub mod asset;
pub mod clock;
pub mod config;
pub mod events;
pub mod identity;
pub mod ledger;

pub use asset::{Asset, AssetClass};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::Event;
pub use identity::Identity;
pub use ledger::{InMemoryLedger, Ledger, LedgerError, Transfer};

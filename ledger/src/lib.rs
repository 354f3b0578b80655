//! The coinworks ledger engine.
//!
//! Everything that can move coins lives here: game awards with perk
//! bonuses, the two-phase credit-conversion workflow, tip redemption,
//! vault transfers, and the recurring VIP upkeep charge. Mutations of a
//! record are serialized behind per-key locks and persisted as atomic
//! batches, so a crashed operation leaves no partial state and every
//! balance change has a matching log entry.

mod engine;
mod locks;
mod store;

pub mod convert;
pub mod external;
pub mod redis_store;
pub mod upkeep;
pub mod vault;

pub use convert::{ConversionOutcome, TipOutcome};
pub use engine::{AwardOutcome, Ledger};
pub use external::{ProjectDirectory, TipEvent, TipFeed};
pub use locks::KeyLocks;
pub use redis_store::RedisStore;
pub use store::{Batch, Key, Staged, Store, Value};
pub use upkeep::VipUpkeep;
pub use vault::{PurchaseOutcome, VaultChargeOutcome};

#[cfg(any(test, feature = "mocks"))]
pub use external::{FixedProjects, FixedTips};
#[cfg(any(test, feature = "mocks"))]
pub use store::Memory;

#[cfg(test)]
mod concurrency_tests;

/// Current wall-clock time in epoch milliseconds. Engine operations take
/// timestamps from the caller; this is the edge where they originate.
pub fn system_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

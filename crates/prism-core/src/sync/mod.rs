//! Outbound synchronization: the drain engine and its background worker

mod engine;
mod trigger;
mod worker;

pub use engine::{DrainOutcome, DrainSummary, SkipReason, SyncEngine};
pub use trigger::SyncTrigger;
pub use worker::SyncWorker;

#[cfg(test)]
mod tests;

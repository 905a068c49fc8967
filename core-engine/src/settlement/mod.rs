//! Settlement: routes a policy's `Release` decision into RTGS-immediate or
//! Q2, and the liquidity-saving mechanism that periodically clears Q2 via
//! bilateral netting and cycle discovery.

pub mod lsm;
pub mod rtgs;

pub use lsm::{LsmConfig, LsmSummary};
pub use rtgs::{release, scan_queue2, QueueProcessingResult, ReleaseOutcome, SettlementError};

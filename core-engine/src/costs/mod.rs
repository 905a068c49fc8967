//! Cost accounting: per-tick accruals, event-triggered penalties, and the
//! end-of-day sweep. Every cost routes through [`engine::accrue`] so the
//! event log always carries a matching `CostAccrual` record.

pub mod engine;
pub mod rates;

pub use engine::accrue;
pub use rates::{bps_of, CostKind, CostRates};

//! Cost rate table: the single source of truth for every accrual rate and
//! one-time penalty the cost engine applies.

use serde::{Deserialize, Serialize};

/// A category of cost charged against an agent's running accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostKind {
    Overdraft,
    Delay,
    Collateral,
    Deadline,
    SplitFriction,
    Eod,
}

impl CostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostKind::Overdraft => "overdraft",
            CostKind::Delay => "delay",
            CostKind::Collateral => "collateral",
            CostKind::Deadline => "deadline",
            CostKind::SplitFriction => "split_friction",
            CostKind::Eod => "eod",
        }
    }
}

/// Rates and one-time penalties applied by the cost engine. Loaded once at
/// engine construction; all monetary fields are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRates {
    /// Overdraft cost, basis points per tick, applied to `|balance|` when negative.
    pub overdraft_bps_per_tick: i64,
    /// Delay cost, basis points per tick, applied to each pending transaction's remaining amount.
    pub delay_bps_per_tick: i64,
    /// Collateral holding cost, basis points per tick, applied to posted collateral.
    pub collateral_bps_per_tick: i64,
    /// Multiplier applied to the delay rate once a transaction is overdue.
    pub overdue_delay_multiplier: i64,
    /// One-time charge on the tick a transaction transitions to Overdue.
    pub deadline_penalty: i64,
    /// One-time charge per split operation, debited to the splitter.
    pub split_friction_cost: i64,
    /// Charge per unsettled transaction at the very last tick of the run.
    pub eod_penalty: i64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            overdraft_bps_per_tick: 1,
            delay_bps_per_tick: 1,
            collateral_bps_per_tick: 1,
            overdue_delay_multiplier: 3,
            deadline_penalty: 500,
            split_friction_cost: 50,
            eod_penalty: 1_000,
        }
    }
}

/// `amount * bps / 10_000`, rounded half-to-even, computed with a 128-bit
/// intermediate so large notionals cannot overflow before the divide.
pub fn bps_of(amount: i64, bps: i64) -> i64 {
    if amount == 0 || bps == 0 {
        return 0;
    }
    let numerator = (amount as i128) * (bps as i128);
    let denom: i128 = 10_000;
    round_half_even_div(numerator, denom)
}

fn round_half_even_div(numerator: i128, denom: i128) -> i64 {
    let quotient = numerator / denom;
    let remainder = numerator % denom;
    let twice_remainder = remainder.abs() * 2;
    let rounded = if twice_remainder > denom.abs() {
        quotient + remainder.signum()
    } else if twice_remainder == denom.abs() {
        if quotient % 2 == 0 {
            quotient
        } else {
            quotient + remainder.signum()
        }
    } else {
        quotient
    };
    rounded as i64
}

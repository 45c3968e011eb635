//! Cost estimates.
//!
//! A [`CostEstimate`] is an immutable triple of estimated cost, estimated output row count and
//! the row count of a single scan (one probe of an inner table). All estimates produced during
//! one optimization are in the same unit, which the timeout rule treats as milliseconds.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Cost of reading one row from a heap or index conglomerate.
pub const ROW_FETCH_COST: f64 = 0.1;
/// Fixed cost of opening a scan (one probe).
pub const SCAN_OPEN_COST: f64 = 1.0;
/// Extra cost of fetching the base row for a row found through a non-covering index.
pub const BASE_ROW_FETCH_COST: f64 = 0.2;
/// Cost of evaluating one qualifier against one row.
pub const QUALIFIER_COST: f64 = 0.01;
/// Cost of one hash table lookup.
pub const HASH_PROBE_COST: f64 = 0.05;
/// Cost of one comparison while sorting.
pub const SORT_COMPARE_COST: f64 = 0.02;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostEstimate {
    cost: f64,
    row_count: f64,
    single_scan_row_count: f64,
}

impl CostEstimate {
    pub fn new(cost: f64, row_count: f64, single_scan_row_count: f64) -> Self {
        Self {
            cost,
            row_count,
            single_scan_row_count,
        }
    }

    /// Fresh estimate to accumulate into.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Estimate that every real plan beats.
    pub fn max() -> Self {
        Self::new(f64::MAX, f64::MAX, f64::MAX)
    }

    /// The estimate of the (empty) outermost row source: no cost, one row.
    pub fn outermost() -> Self {
        Self::new(0.0, 1.0, 1.0)
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    pub fn single_scan_row_count(&self) -> f64 {
        self.single_scan_row_count
    }

    pub fn with_cost(&self, cost: f64) -> Self {
        Self { cost, ..*self }
    }

    pub fn with_row_count(&self, row_count: f64) -> Self {
        Self { row_count, ..*self }
    }

    /// Total order: by cost, then row count, then single scan row count.
    pub fn compare(&self, other: &CostEstimate) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.row_count.total_cmp(&other.row_count))
            .then_with(|| {
                self.single_scan_row_count
                    .total_cmp(&other.single_scan_row_count)
            })
    }

    pub fn is_cheaper_than(&self, other: &CostEstimate) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn is_max(&self) -> bool {
        self.cost == f64::MAX
    }
}

impl Default for CostEstimate {
    fn default() -> Self {
        Self::zero()
    }
}

impl Display for CostEstimate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_max() {
            return write!(f, "cost=MAX");
        }
        write!(
            f,
            "cost={:.4} rows={:.2} singleScanRows={:.2}",
            self.cost, self.row_count, self.single_scan_row_count
        )
    }
}

/// How a candidate with exactly the best cost is treated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TieBreak {
    /// The first cheapest plan found is kept.
    FirstFound,
    /// A later plan of equal cost replaces the earlier one.
    LastFound,
}

impl TieBreak {
    pub fn replaces(&self, candidate: &CostEstimate, best: &CostEstimate) -> bool {
        match self {
            TieBreak::FirstFound => candidate.compare(best) == Ordering::Less,
            TieBreak::LastFound => candidate.compare(best) != Ordering::Greater,
        }
    }
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::FirstFound
    }
}

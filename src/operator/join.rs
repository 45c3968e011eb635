use enumset::{EnumSet, EnumSetType};
use strum_macros::{Display, EnumString};

use crate::cost::{CostEstimate, HASH_PROBE_COST};

/// Estimated bytes of bookkeeping per hash table entry.
pub const HASH_ENTRY_OVERHEAD: f64 = 32.0;

/// How an inner row source is joined to the rows of the tables before it.
#[derive(EnumSetType, Debug, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum JoinStrategyKind {
    /// Re-scan the inner source once per outer row.
    #[strum(serialize = "NESTEDLOOP")]
    NestedLoop,
    /// Scan the inner source once into a hash table and probe it per outer row.
    #[strum(serialize = "HASH")]
    Hash,
}

impl JoinStrategyKind {
    /// Operator symbol used in the textual plan form.
    pub fn symbol(&self) -> &'static str {
        match self {
            JoinStrategyKind::NestedLoop => "*",
            JoinStrategyKind::Hash => "#",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "*" => Some(JoinStrategyKind::NestedLoop),
            "#" => Some(JoinStrategyKind::Hash),
            _ => None,
        }
    }

    pub fn all() -> EnumSet<JoinStrategyKind> {
        EnumSet::all()
    }

    /// Whether the inner source is materialized, so it must be materializable and fit in memory.
    pub fn materializes_inner(&self) -> bool {
        matches!(self, JoinStrategyKind::Hash)
    }

    /// Largest number of rows the strategy may hold in memory for one table.
    pub fn max_capacity(
        &self,
        user_capacity: Option<usize>,
        max_memory_per_table: usize,
        per_row_usage: f64,
    ) -> usize {
        match self {
            JoinStrategyKind::NestedLoop => usize::MAX,
            JoinStrategyKind::Hash => {
                if let Some(capacity) = user_capacity {
                    return capacity;
                }
                let per_row_usage = per_row_usage + HASH_ENTRY_OVERHEAD;
                if per_row_usage <= 1.0 {
                    max_memory_per_table
                } else {
                    (max_memory_per_table as f64 / per_row_usage) as usize
                }
            }
        }
    }

    /// Combines the cost of scanning the inner source with the rows coming from outer tables.
    pub fn estimate_cost(&self, scan: &ScanCost, outer: &CostEstimate) -> CostEstimate {
        let outer_rows = outer.row_count();
        match self {
            JoinStrategyKind::NestedLoop => CostEstimate::new(
                outer_rows * scan.probe_cost,
                outer_rows * scan.probe_rows,
                scan.probe_rows,
            ),
            JoinStrategyKind::Hash => CostEstimate::new(
                scan.build_cost + outer_rows * HASH_PROBE_COST,
                outer_rows * scan.probe_rows,
                scan.probe_rows,
            ),
        }
    }
}

/// Cost of scanning one inner source, before the join strategy is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScanCost {
    /// Cost of one probe restricted by every usable predicate.
    pub probe_cost: f64,
    /// Rows returned by one probe.
    pub probe_rows: f64,
    /// Cost of the single scan that builds a hash table.
    pub build_cost: f64,
    /// Rows stored in the hash table.
    pub build_rows: f64,
}

//! Table statistics and the selectivity constants used when statistics are missing.

use std::collections::HashMap;

/// Row count assumed for a table with no statistics.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;
/// Row width in bytes assumed for a table with no statistics.
pub const DEFAULT_ROW_WIDTH: f64 = 100.0;
/// Selectivity of an equality predicate when the column's distinct count is unknown.
pub const DEFAULT_EQUALITY_SELECTIVITY: f64 = 0.1;
/// Selectivity of a range predicate (`<`, `<=`, `>`, `>=`).
pub const RANGE_SELECTIVITY: f64 = 0.33;
/// Selectivity of a not-equal predicate.
pub const NOT_EQUAL_SELECTIVITY: f64 = 0.9;

/// Statistics of a base table.
#[derive(Clone, Debug, PartialEq)]
pub struct Statistics {
    row_count: f64,
    row_width: f64,
    /// Distinct value count keyed by column position.
    distinct_counts: HashMap<usize, f64>,
}

impl Statistics {
    pub fn new(row_count: f64, row_width: f64) -> Self {
        Self {
            row_count,
            row_width,
            distinct_counts: HashMap::new(),
        }
    }

    pub fn with_distinct_count(mut self, column: usize, distinct: f64) -> Self {
        self.distinct_counts.insert(column, distinct);
        self
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    pub fn row_width(&self) -> f64 {
        self.row_width
    }

    pub fn distinct_count(&self, column: usize) -> Option<f64> {
        self.distinct_counts.get(&column).copied()
    }

    /// Selectivity of `column = <something>` under a uniform distribution.
    pub fn equality_selectivity(&self, column: usize) -> f64 {
        match self.distinct_count(column) {
            Some(ndv) if ndv >= 1.0 => 1.0 / ndv,
            _ => DEFAULT_EQUALITY_SELECTIVITY,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_COUNT, DEFAULT_ROW_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_selectivity_uses_distinct_count() {
        let stats = Statistics::new(10_000.0, 40.0).with_distinct_count(2, 500.0);
        assert_eq!(stats.equality_selectivity(2), 1.0 / 500.0);
        assert_eq!(stats.equality_selectivity(0), DEFAULT_EQUALITY_SELECTIVITY);
    }
}

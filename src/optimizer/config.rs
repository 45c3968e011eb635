use std::collections::HashMap;
use std::time::Duration;

use enumset::EnumSet;

use crate::cost::TieBreak;
use crate::error::{OptResult, OptimizerError};
use crate::operator::JoinStrategyKind;

pub const NO_TIMEOUT_PROPERTY: &str = "derby.optimizer.noTimeout";
pub const MAX_MEMORY_PER_TABLE_PROPERTY: &str = "derby.language.maxMemoryPerTable";
pub const USE_STATISTICS_PROPERTY: &str = "derby.language.useStatistics";
pub const JOIN_ORDER_OPTIMIZATION_PROPERTY: &str = "derby.optimizer.joinOrderOptimization";

/// Default memory a single table may use for a hash table, in bytes.
pub const DEFAULT_MAX_MEMORY_PER_TABLE: usize = 1024 * 1024;
/// Queries with more tables than this time out and use the jump heuristic.
pub const DEFAULT_JUMP_THRESHOLD: usize = 6;

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    /// Never stop the search early because of the cost based timeout.
    pub no_timeout: bool,
    /// Use distinct counts from table statistics for selectivity.
    pub use_statistics: bool,
    /// Bytes one table may use to materialize its rows.
    pub max_memory_per_table: usize,
    pub join_strategies: EnumSet<JoinStrategyKind>,
    /// When false the optimizables are joined in the order given.
    pub join_order_optimization: bool,
    pub tie_break: TieBreak,
    /// Wall clock limit, checked only once some plan has been found.
    pub time_budget: Option<Duration>,
    pub jump_threshold: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            no_timeout: false,
            use_statistics: true,
            max_memory_per_table: DEFAULT_MAX_MEMORY_PER_TABLE,
            join_strategies: JoinStrategyKind::all(),
            join_order_optimization: true,
            tie_break: TieBreak::default(),
            time_budget: None,
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
        }
    }
}

fn invalid(key: &str, value: &str) -> OptimizerError {
    OptimizerError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> OptResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

impl OptimizerConfig {
    /// Reads the optimizer properties from `properties`, starting from the defaults. Keys other
    /// than the optimizer's own are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> OptResult<Self> {
        let mut config = Self::default();
        for (key, value) in properties {
            match key.as_str() {
                NO_TIMEOUT_PROPERTY => config.no_timeout = parse_bool(key, value)?,
                USE_STATISTICS_PROPERTY => config.use_statistics = parse_bool(key, value)?,
                JOIN_ORDER_OPTIMIZATION_PROPERTY => {
                    config.join_order_optimization = parse_bool(key, value)?
                }
                MAX_MEMORY_PER_TABLE_PROPERTY => {
                    // kilobytes
                    let kb = value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid(key, value))?;
                    config.max_memory_per_table =
                        kb.checked_mul(1024).ok_or_else(|| invalid(key, value))?;
                }
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn with_no_timeout(mut self, no_timeout: bool) -> Self {
        self.no_timeout = no_timeout;
        self
    }

    pub fn with_max_memory_per_table(mut self, bytes: usize) -> Self {
        self.max_memory_per_table = bytes;
        self
    }

    pub fn with_join_strategies(mut self, strategies: EnumSet<JoinStrategyKind>) -> Self {
        self.join_strategies = strategies;
        self
    }

    pub fn with_join_order_optimization(mut self, enabled: bool) -> Self {
        self.join_order_optimization = enabled;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_use_statistics(mut self, use_statistics: bool) -> Self {
        self.use_statistics = use_statistics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties() {
        let config = OptimizerConfig::from_properties(&props(&[
            (NO_TIMEOUT_PROPERTY, "TRUE"),
            (MAX_MEMORY_PER_TABLE_PROPERTY, "64"),
            (USE_STATISTICS_PROPERTY, "false"),
            (JOIN_ORDER_OPTIMIZATION_PROPERTY, "false"),
            ("derby.storage.pageSize", "4096"),
        ]))
        .unwrap();
        assert!(config.no_timeout);
        assert_eq!(config.max_memory_per_table, 64 * 1024);
        assert!(!config.use_statistics);
        assert!(!config.join_order_optimization);
        assert_eq!(config.jump_threshold, DEFAULT_JUMP_THRESHOLD);
    }

    #[test]
    fn test_rejects_bad_values() {
        for (key, value) in [
            (NO_TIMEOUT_PROPERTY, "yes"),
            (MAX_MEMORY_PER_TABLE_PROPERTY, "-1"),
            (MAX_MEMORY_PER_TABLE_PROPERTY, "lots"),
        ] {
            assert!(matches!(
                OptimizerConfig::from_properties(&props(&[(key, value)])),
                Err(OptimizerError::InvalidProperty { .. })
            ));
        }
    }
}

use std::str::FromStr;

use crate::error::{OptResult, OptimizerError};
use crate::operator::JoinStrategyKind;

pub const INDEX_HINT: &str = "index";
pub const JOIN_STRATEGY_HINT: &str = "joinStrategy";
pub const HASH_INITIAL_CAPACITY_HINT: &str = "hashInitialCapacity";
pub const HASH_LOAD_FACTOR_HINT: &str = "hashLoadFactor";
pub const HASH_MAX_CAPACITY_HINT: &str = "hashMaxCapacity";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexHint {
    /// `index=NULL`: read the heap.
    TableScan,
    Index(String),
}

/// Per-table optimizer overrides, parsed from `key=value` properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableHints {
    pub index: Option<IndexHint>,
    pub join_strategy: Option<JoinStrategyKind>,
    pub hash_initial_capacity: Option<usize>,
    pub hash_load_factor: Option<f32>,
    pub hash_max_capacity: Option<usize>,
}

fn invalid(table: &str, key: &str, value: &str) -> OptimizerError {
    OptimizerError::InvalidHint {
        table: table.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn positive(table: &str, key: &str, value: &str) -> OptResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(invalid(table, key, value)),
    }
}

impl TableHints {
    /// Parses the hints given for `table`. Keys are matched exactly; later keys win.
    pub fn parse(table: &str, properties: &[(String, String)]) -> OptResult<Self> {
        let mut hints = TableHints::default();
        for (key, value) in properties {
            match key.as_str() {
                INDEX_HINT => {
                    let name = value.trim();
                    if name.is_empty() {
                        return Err(invalid(table, key, value));
                    }
                    hints.index = Some(if name.eq_ignore_ascii_case("NULL") {
                        IndexHint::TableScan
                    } else {
                        IndexHint::Index(name.to_string())
                    });
                }
                JOIN_STRATEGY_HINT => {
                    let strategy = JoinStrategyKind::from_str(value.trim()).map_err(|_| {
                        OptimizerError::InvalidJoinStrategy {
                            table: table.to_string(),
                            strategy: value.clone(),
                        }
                    })?;
                    hints.join_strategy = Some(strategy);
                }
                HASH_INITIAL_CAPACITY_HINT => {
                    hints.hash_initial_capacity = Some(positive(table, key, value)?);
                }
                HASH_MAX_CAPACITY_HINT => {
                    hints.hash_max_capacity = Some(positive(table, key, value)?);
                }
                HASH_LOAD_FACTOR_HINT => match value.trim().parse::<f32>() {
                    Ok(f) if f > 0.0 && f <= 1.0 => hints.hash_load_factor = Some(f),
                    _ => return Err(invalid(table, key, value)),
                },
                _ => return Err(invalid(table, key, value)),
            }
        }
        Ok(hints)
    }

    pub fn has_hash_parameters(&self) -> bool {
        self.hash_initial_capacity.is_some()
            || self.hash_load_factor.is_some()
            || self.hash_max_capacity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_hints() {
        let hints = TableHints::parse(
            "T",
            &props(&[
                ("index", "null"),
                ("joinStrategy", "hash"),
                ("hashInitialCapacity", "16"),
                ("hashLoadFactor", "0.5"),
                ("hashMaxCapacity", "100"),
            ]),
        )
        .unwrap();
        assert_eq!(hints.index, Some(IndexHint::TableScan));
        assert_eq!(hints.join_strategy, Some(JoinStrategyKind::Hash));
        assert_eq!(hints.hash_initial_capacity, Some(16));
        assert_eq!(hints.hash_load_factor, Some(0.5));
        assert_eq!(hints.hash_max_capacity, Some(100));
    }

    #[test]
    fn test_rejects_bad_values() {
        for (key, value) in [
            ("hashLoadFactor", "0"),
            ("hashLoadFactor", "1.5"),
            ("hashInitialCapacity", "0"),
            ("hashMaxCapacity", "-3"),
            ("bogus", "1"),
            ("index", " "),
        ] {
            assert!(
                matches!(
                    TableHints::parse("T", &props(&[(key, value)])),
                    Err(OptimizerError::InvalidHint { .. })
                ),
                "{}={}",
                key,
                value
            );
        }
        assert!(matches!(
            TableHints::parse("T", &props(&[("joinStrategy", "MERGE")])),
            Err(OptimizerError::InvalidJoinStrategy { .. })
        ));
    }
}

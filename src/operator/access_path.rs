use std::fmt::{Display, Formatter};

use crate::catalog::ConglomerateDescriptor;
use crate::cost::CostEstimate;
use crate::operator::JoinStrategyKind;

/// One way of reading an optimizable at one position of a join order.
///
/// Table functions and subqueries have no conglomerate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessPath {
    conglomerate: Option<ConglomerateDescriptor>,
    join_strategy: Option<JoinStrategyKind>,
    cost_estimate: Option<CostEstimate>,
    covering_index: bool,
    non_matching_index_scan: bool,
}

impl AccessPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conglomerate(&self) -> Option<&ConglomerateDescriptor> {
        self.conglomerate.as_ref()
    }

    pub fn set_conglomerate(&mut self, conglomerate: Option<ConglomerateDescriptor>) {
        self.conglomerate = conglomerate;
    }

    pub fn join_strategy(&self) -> Option<JoinStrategyKind> {
        self.join_strategy
    }

    pub fn set_join_strategy(&mut self, join_strategy: Option<JoinStrategyKind>) {
        self.join_strategy = join_strategy;
    }

    pub fn cost_estimate(&self) -> Option<&CostEstimate> {
        self.cost_estimate.as_ref()
    }

    pub fn set_cost_estimate(&mut self, cost_estimate: Option<CostEstimate>) {
        self.cost_estimate = cost_estimate;
    }

    pub fn is_covering_index(&self) -> bool {
        self.covering_index
    }

    pub fn set_covering_index(&mut self, covering_index: bool) {
        self.covering_index = covering_index;
    }

    /// An index scan that cannot use any predicate to position itself.
    pub fn is_non_matching_index_scan(&self) -> bool {
        self.non_matching_index_scan
    }

    pub fn set_non_matching_index_scan(&mut self, non_matching: bool) {
        self.non_matching_index_scan = non_matching;
    }
}

impl Display for AccessPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let conglomerate = self
            .conglomerate
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or("-");
        let strategy = self
            .join_strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(f, "{} using {}", conglomerate, strategy)?;
        if self.is_non_matching_index_scan() {
            write!(f, " without start/stop keys")?;
        }
        match &self.cost_estimate {
            Some(cost) => write!(f, " ({})", cost),
            None => write!(f, " (not costed)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConglomerateId, IndexDescriptor, SchemaId, TableId};

    #[test]
    fn test_display() {
        let mut path = AccessPath::new();
        path.set_join_strategy(Some(JoinStrategyKind::NestedLoop));
        assert_eq!(path.to_string(), "- using NESTEDLOOP (not costed)");

        path.set_conglomerate(Some(ConglomerateDescriptor {
            id: ConglomerateId(2),
            name: "T_K".to_string(),
            table_id: TableId(0),
            schema_id: SchemaId(0),
            index: Some(IndexDescriptor::new([0], false)),
        }));
        path.set_non_matching_index_scan(true);
        assert!(path.is_non_matching_index_scan());
        assert_eq!(path.to_string(), "T_K using NESTEDLOOP without start/stop keys (not costed)");
    }
}

use std::fmt::{Display, Formatter};

use itertools::Itertools;
use smallvec::SmallVec;

use crate::catalog::{AliasDescriptor, ConglomerateDescriptor};
use crate::optimizer::JoinPlan;

/// Row source an optimizable becomes once the search is over.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessNode {
    TableScan {
        heap: ConglomerateDescriptor,
    },
    /// Covering index scan; no base row fetch.
    IndexScan {
        index: ConglomerateDescriptor,
    },
    /// Index scan followed by a fetch of each base row.
    IndexToBaseRow {
        index: ConglomerateDescriptor,
    },
    TableFunctionScan {
        alias: AliasDescriptor,
    },
    Subquery {
        plan: Box<JoinPlan>,
    },
    /// The source is read once into a hash table probed on `key_columns`.
    HashScan {
        source: Box<AccessNode>,
        key_columns: SmallVec<[usize; 4]>,
        initial_capacity: Option<usize>,
        load_factor: Option<f32>,
        max_capacity: Option<usize>,
    },
}

impl AccessNode {
    pub fn is_hash_scan(&self) -> bool {
        matches!(self, AccessNode::HashScan { .. })
    }

    /// The node below any hash table wrapper.
    pub fn source(&self) -> &AccessNode {
        match self {
            AccessNode::HashScan { source, .. } => source.source(),
            other => other,
        }
    }
}

impl Display for AccessNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessNode::TableScan { heap } => write!(f, "TableScan({})", heap.name),
            AccessNode::IndexScan { index } => write!(f, "IndexScan({})", index.name),
            AccessNode::IndexToBaseRow { index } => write!(f, "IndexToBaseRow({})", index.name),
            AccessNode::TableFunctionScan { alias } => write!(f, "TableFunction({})", alias.name),
            AccessNode::Subquery { plan } => match plan.plan() {
                Some(inner) => write!(f, "Subquery[{}]", inner),
                None => write!(f, "Subquery[]"),
            },
            AccessNode::HashScan {
                source,
                key_columns,
                ..
            } => write!(f, "HashScan({}, keys=[{}])", source, key_columns.iter().join(", ")),
        }
    }
}

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::cost::CostEstimate;
use crate::operator::{AccessNode, AccessPath};
use crate::optimizable::PlanType;
use crate::optimizer::ContextId;
use crate::plan::OptimizerPlan;

/// One optimizable of the chosen join order.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinPlanEntry {
    pub table_number: usize,
    pub name: String,
    pub access_path: AccessPath,
    pub plan_type: Option<PlanType>,
    /// Ids of the predicates evaluated at this position.
    pub predicates: Vec<usize>,
    pub node: AccessNode,
}

/// Result of optimizing one query block.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinPlan {
    context: ContextId,
    entries: Vec<JoinPlanEntry>,
    cost: CostEstimate,
    sort_needed: bool,
    plan: Option<OptimizerPlan>,
}

impl JoinPlan {
    pub(crate) fn new(
        context: ContextId,
        entries: Vec<JoinPlanEntry>,
        cost: CostEstimate,
        sort_needed: bool,
        plan: Option<OptimizerPlan>,
    ) -> Self {
        Self {
            context,
            entries,
            cost,
            sort_needed,
            plan,
        }
    }

    /// A query block without tables.
    pub(crate) fn vacuous(context: ContextId) -> Self {
        Self::new(context, Vec::new(), CostEstimate::zero(), false, None)
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Entries in join order, outermost first.
    pub fn entries(&self) -> &[JoinPlanEntry] {
        &self.entries
    }

    pub fn entry(&self, table_number: usize) -> Option<&JoinPlanEntry> {
        self.entries.iter().find(|e| e.table_number == table_number)
    }

    pub fn cost(&self) -> &CostEstimate {
        &self.cost
    }

    /// Whether the result still has to be sorted into the required ordering.
    pub fn is_sort_needed(&self) -> bool {
        self.sort_needed
    }

    /// The chosen join order in override form; `None` for a vacuous plan.
    pub fn plan(&self) -> Option<&OptimizerPlan> {
        self.plan.as_ref()
    }

    pub fn join_order(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.table_number).collect()
    }

    pub fn is_vacuous(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for JoinPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_vacuous() {
            return write!(f, "<vacuous>");
        }
        write!(
            f,
            "{} [{}]{}",
            self.cost,
            self.entries.iter().map(|e| &e.node).join(", "),
            if self.sort_needed { " sorted" } else { "" }
        )
    }
}

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use derive_more::Display;

use crate::catalog::{Catalog, SessionContext};
use crate::error::OptResult;
use crate::optimizable::Optimizable;
use crate::optimizer::{Optimizer, OptimizerConfig};
use crate::plan::OptimizerPlan;
use crate::predicate::{PredicateList, TableSet};
use crate::properties::RequiredRowOrdering;
use crate::trace::{SharedTrace, Tracer};

/// Identifies one optimization context: an optimizer, or a candidate plan of a subquery. Best
/// access paths are saved and restored per context.
#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ContextId(pub u32);

/// Hands out context ids, remembering what each one was allocated for.
#[derive(Debug, Default)]
pub struct ContextArena {
    next: Cell<u32>,
    labels: RefCell<Vec<String>>,
}

impl ContextArena {
    pub fn allocate<S: Into<String>>(&self, label: S) -> ContextId {
        let id = ContextId(self.next.get());
        self.next.set(id.0 + 1);
        self.labels.borrow_mut().push(label.into());
        id
    }

    pub fn label(&self, id: ContextId) -> Option<String> {
        self.labels.borrow().get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.next.get() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry point of the join order search: builds optimizers that share one configuration, one
/// context arena and one trace sink.
#[derive(Debug)]
pub struct OptimizerFactory {
    config: OptimizerConfig,
    arena: Rc<ContextArena>,
    tracer: Tracer,
}

impl OptimizerFactory {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            arena: Rc::new(ContextArena::default()),
            tracer: Tracer::disabled(),
        }
    }

    /// Reports every search decision of the optimizers built from now on to `sink`.
    pub fn with_trace(mut self, sink: SharedTrace) -> Self {
        self.tracer = Tracer::new(sink);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn arena(&self) -> &ContextArena {
        &self.arena
    }

    pub fn supports_optimizer_trace(&self) -> bool {
        true
    }

    pub fn max_memory_per_table(&self) -> usize {
        self.config.max_memory_per_table
    }

    pub fn do_join_order_optimization(&self) -> bool {
        self.config.join_order_optimization
    }

    /// Builds an optimizer for one query block.
    ///
    /// Hints of every optimizable are validated and `override_plan` is bound and applied here, so
    /// every user error surfaces before the search starts.
    #[allow(clippy::too_many_arguments)]
    pub fn get_optimizer(
        &self,
        optimizables: Vec<Optimizable>,
        predicates: PredicateList,
        catalog: &dyn Catalog,
        required_ordering: Option<RequiredRowOrdering>,
        num_tables: usize,
        override_plan: Option<OptimizerPlan>,
        session: &SessionContext,
    ) -> OptResult<Optimizer> {
        let context = self.arena.allocate(format!(
            "query block of {} optimizables",
            optimizables.len()
        ));
        Optimizer::new(
            context,
            self.config.clone(),
            self.tracer.clone(),
            optimizables,
            predicates,
            catalog,
            required_ordering,
            num_tables,
            override_plan,
            session,
        )
    }

    /// Wraps an optimizer built by this factory as a subquery row source of an enclosing query
    /// block. `correlated_with` holds the outer tables the subquery references.
    pub fn subquery(
        &self,
        table_number: usize,
        name: &str,
        inner: Optimizer,
        correlated_with: TableSet,
    ) -> Optimizable {
        let best_key = self.arena.allocate(format!("best plan of {}", name));
        let sort_avoidance_key = self.arena.allocate(format!("sort avoiding plan of {}", name));
        Optimizable::subquery(
            table_number,
            name,
            inner,
            correlated_with,
            best_key,
            sort_avoidance_key,
        )
    }
}

impl Default for OptimizerFactory {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use join_order_optimizer::catalog::{
    Catalog, InMemoryCatalog, SchemaDescriptor, SessionContext, TableId,
};
use join_order_optimizer::optimizable::Optimizable;
use join_order_optimizer::optimizer::{JoinPlan, Optimizer, OptimizerConfig, OptimizerFactory};
use join_order_optimizer::plan::OptimizerPlan;
use join_order_optimizer::predicate::{ColumnRef, Predicate, PredicateList};
use join_order_optimizer::properties::RequiredRowOrdering;
use join_order_optimizer::stat::Statistics;
use join_order_optimizer::trace::{SharedTrace, TextOptTrace};

pub const SCHEMA: &str = "APP";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Tables of schema APP, each with columns X and Y of 4 bytes.
pub struct Fixture {
    pub catalog: InMemoryCatalog,
    pub tables: Vec<TableId>,
}

impl Fixture {
    pub fn new(tables: &[(&str, f64)]) -> Self {
        init_logger();
        let mut catalog = InMemoryCatalog::new();
        let schema = catalog.add_schema(SCHEMA);
        let tables = tables
            .iter()
            .map(|(name, rows)| {
                let id = catalog.add_table(schema, name, &[("X", 4.0), ("Y", 4.0)]);
                catalog.set_statistics(id, Statistics::new(*rows, 8.0));
                id
            })
            .collect();
        Self { catalog, tables }
    }

    pub fn schema(&self) -> SchemaDescriptor {
        self.catalog.schema_descriptor(SCHEMA).unwrap().unwrap()
    }

    /// The i-th table as optimizable number `table_number`.
    pub fn base_table(&self, i: usize, table_number: usize) -> Optimizable {
        let table = self.catalog.table_descriptor(self.tables[i]).unwrap().unwrap();
        Optimizable::base_table(table_number, self.schema(), table)
    }

    /// One optimizable per table, numbered in fixture order.
    pub fn optimizables(&self) -> Vec<Optimizable> {
        (0..self.tables.len()).map(|i| self.base_table(i, i)).collect()
    }

    pub fn optimizer(
        &self,
        factory: &OptimizerFactory,
        optimizables: Vec<Optimizable>,
        predicates: PredicateList,
        required_ordering: Option<RequiredRowOrdering>,
        override_plan: Option<&str>,
    ) -> Optimizer {
        self.try_optimizer(factory, optimizables, predicates, required_ordering, override_plan)
            .unwrap()
    }

    pub fn try_optimizer(
        &self,
        factory: &OptimizerFactory,
        optimizables: Vec<Optimizable>,
        predicates: PredicateList,
        required_ordering: Option<RequiredRowOrdering>,
        override_plan: Option<&str>,
    ) -> join_order_optimizer::error::OptResult<Optimizer> {
        let num_tables = optimizables.len();
        let override_plan = override_plan.map(|text| OptimizerPlan::parse(text).unwrap());
        factory.get_optimizer(
            optimizables,
            predicates,
            &self.catalog,
            required_ordering,
            num_tables,
            override_plan,
            &SessionContext::default(),
        )
    }
}

/// `T0.X = T1.X`, `T1.X = T2.X`, ... over `n` tables.
pub fn chain_predicates(n: usize) -> PredicateList {
    (1..n)
        .map(|i| Predicate::equijoin(i - 1, ColumnRef::new(i - 1, 0), ColumnRef::new(i, 0)))
        .collect()
}

pub fn optimize(optimizer: &mut Optimizer) -> JoinPlan {
    optimizer.optimize().unwrap();
    optimizer.modify_access_paths().unwrap()
}

pub fn text_trace() -> (Rc<RefCell<TextOptTrace>>, SharedTrace) {
    let text = Rc::new(RefCell::new(TextOptTrace::new()));
    let sink: SharedTrace = text.clone();
    (text, sink)
}

pub fn factory(config: OptimizerConfig) -> OptimizerFactory {
    OptimizerFactory::new(config)
}

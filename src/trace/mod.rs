//! Optimizer tracing.
//!
//! An [`OptTrace`] is a pure observer of the join order search: every method is a notification of
//! one search decision, and none of them can influence the search. The search holds its sink in a
//! [`Tracer`], which only builds trace arguments when a sink is installed.

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::catalog::ConglomerateDescriptor;
use crate::cost::CostEstimate;
use crate::operator::{AccessPath, JoinStrategyKind};
use crate::optimizable::{PlanType, ScanSelectivity};
use crate::optimizer::ContextId;
use crate::plan::OptimizerPlan;
use crate::predicate::TableSet;

mod text;
pub use text::*;

/// Receives notifications about the join order search.
///
/// Every method has an empty default so sinks only implement what they care about.
#[allow(unused_variables)]
pub trait OptTrace {
    fn trace_start_query_block(&mut self, context: ContextId, num_optimizables: usize) {}

    fn trace_end_query_block(&mut self, context: ContextId) {}

    fn trace_timeout(&mut self, elapsed: Duration, best_cost: &CostEstimate) {}

    fn trace_vacuous(&mut self) {}

    fn trace_complete_join_order(&mut self, join_order: &[Option<usize>]) {}

    fn trace_sort_cost(&mut self, sort_cost: &CostEstimate, current_cost: &CostEstimate) {}

    fn trace_no_best_plan(&mut self, context: ContextId) {}

    fn trace_modifying_access_paths(&mut self, context: ContextId) {}

    fn trace_short_circuiting(
        &mut self,
        time_exceeded: bool,
        table_number: usize,
        join_position: usize,
    ) {
    }

    fn trace_skipping_join_order(
        &mut self,
        next_optimizable: usize,
        join_position: usize,
        join_order: &[Option<usize>],
        assigned: &TableSet,
    ) {
    }

    fn trace_illegal_user_join_order(&mut self) {}

    fn trace_user_join_order_optimized(&mut self) {}

    fn trace_join_order_consideration(
        &mut self,
        join_position: usize,
        join_order: &[Option<usize>],
        assigned: &TableSet,
    ) {
    }

    fn trace_cost_without_sort_avoidance(&mut self, cost: &CostEstimate) {}

    fn trace_cost_with_sort_avoidance(&mut self, cost: &CostEstimate) {}

    fn trace_current_plan_avoids_sort(
        &mut self,
        best_cost: &CostEstimate,
        sort_avoidance_cost: &CostEstimate,
    ) {
    }

    fn trace_cheapest_plan_so_far(&mut self, plan_type: PlanType, cost: &CostEstimate) {}

    fn trace_sort_needed_for_ordering(&mut self, plan_type: PlanType, sort_needed: bool) {}

    fn trace_remembering_best_join_order(
        &mut self,
        context: ContextId,
        join_order: &[usize],
        plan: &OptimizerPlan,
        plan_type: PlanType,
        cost: &CostEstimate,
    ) {
    }

    fn trace_skipping_because_too_much_memory(
        &mut self,
        table_number: usize,
        row_count: f64,
        max_memory_per_table: usize,
    ) {
    }

    fn trace_skip_unmaterializable_hash_join(&mut self, table_number: usize) {}

    fn trace_skip_hash_join_no_hash_keys(&mut self, table_number: usize) {}

    fn trace_hash_key_columns(&mut self, table_number: usize, columns: &[usize]) {}

    fn trace_considering_join_strategy(
        &mut self,
        strategy: JoinStrategyKind,
        table_number: usize,
    ) {
    }

    fn trace_considering_conglomerate(
        &mut self,
        conglomerate: &ConglomerateDescriptor,
        table_number: usize,
    ) {
    }

    fn trace_no_more_conglomerates(&mut self, table_number: usize) {}

    fn trace_cost_of_conglomerate_scan(
        &mut self,
        table_number: usize,
        conglomerate: &ConglomerateDescriptor,
        selectivity: &ScanSelectivity,
        cost: &CostEstimate,
    ) {
    }

    fn trace_cost_of_n_scans(
        &mut self,
        table_number: usize,
        outer_rows: f64,
        cost: &CostEstimate,
    ) {
    }

    fn trace_remembering_best_access_path(
        &mut self,
        access_path: &AccessPath,
        table_number: usize,
        plan_type: PlanType,
    ) {
    }

    /// Renders what has been recorded so far.
    fn print_to_writer(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let _ = out;
        Ok(())
    }
}

/// A sink that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpTrace;

impl OptTrace for NoOpTrace {}

pub type SharedTrace = Rc<RefCell<dyn OptTrace>>;

/// Handle to an optional trace sink, shared by nested optimizers.
#[derive(Clone, Default)]
pub struct Tracer {
    sink: Option<SharedTrace>,
}

impl Tracer {
    pub fn new(sink: SharedTrace) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.sink.is_some()
    }

    /// Runs `f` against the sink. Arguments built inside `f` cost nothing when tracing is off.
    pub fn emit<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn OptTrace),
    {
        if let Some(sink) = &self.sink {
            f(&mut *sink.borrow_mut());
        }
    }
}

impl Debug for Tracer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tracer({})", if self.is_on() { "on" } else { "off" })
    }
}

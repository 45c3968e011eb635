//! Join order search.
//!
//! The [`Optimizer`] places optimizables into join positions left to right and backtracks over
//! permutations. For each placed optimizable it walks the candidate access paths, keeping the
//! cheapest one per position (and, when an ordering is required, the cheapest one that keeps the
//! ordering). A complete join order that beats the best one so far is remembered by asking every
//! optimizable to commit its best path.
//!
//! Driving the search by hand:
//!
//! ```ignore
//! while optimizer.get_next_permutation()? {
//!     while optimizer.get_next_decorated_permutation()? {
//!         optimizer.cost_permutation()?;
//!     }
//! }
//! let plan = optimizer.modify_access_paths()?;
//! ```
//!
//! [`Optimizer::optimize`] runs the same loop.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use log::{debug, trace};

use crate::catalog::{Catalog, SessionContext};
use crate::cost::CostEstimate;
use crate::error::{OptResult, OptimizerError};
use crate::operator::JoinStrategyKind;
use crate::optimizable::{Optimizable, PlanAction, PlanType};
use crate::plan::OptimizerPlan;
use crate::predicate::{PredicateList, TableSet};
use crate::properties::{RequiredRowOrdering, RowOrdering, SortRequirement};
use crate::trace::Tracer;

mod config;
pub use config::*;
mod factory;
pub use factory::*;
mod forced;
mod join_plan;
pub use join_plan::*;

/// Large queries first jump to a join order that looks promising, walk the orders above it,
/// then walk the orders below it up to where they jumped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PermuteState {
    NoJump,
    ReadyToJump,
    Jumping,
    WalkHigh,
    WalkLow,
}

/// Best join order of one round, saved per context.
#[derive(Clone, Debug, PartialEq)]
struct SavedPlan {
    join_order: Vec<usize>,
    cost: CostEstimate,
    found: bool,
    sort_needed: Option<bool>,
}

#[derive(Debug)]
pub struct Optimizer {
    context: ContextId,
    config: OptimizerConfig,
    tracer: Tracer,
    optimizables: Vec<Optimizable>,
    /// Predicates not pushed to any placed optimizable.
    predicates: PredicateList,
    required_ordering: Option<RequiredRowOrdering>,
    num_tables: usize,
    /// Tables of this query block; references to any other table are correlated.
    non_correlated: TableSet,
    /// Optimizable indexes fixed by a plan override, by join position.
    dictated_order: Vec<usize>,
    join_position: isize,
    proposed_join_order: Vec<Option<usize>>,
    best_join_order: Vec<usize>,
    assigned: TableSet,
    outermost_cost: CostEstimate,
    current_cost: CostEstimate,
    current_sort_avoidance_cost: CostEstimate,
    best_cost: CostEstimate,
    sort_cost: Option<CostEstimate>,
    current_row_ordering: RowOrdering,
    best_row_ordering: RowOrdering,
    permute_state: PermuteState,
    first_look_order: Vec<usize>,
    jump_retries: usize,
    found_a_best_plan: bool,
    desired_join_order_found: bool,
    started: Instant,
    time_exceeded: bool,
    saved_plans: HashMap<ContextId, SavedPlan>,
}

impl Optimizer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: ContextId,
        config: OptimizerConfig,
        tracer: Tracer,
        mut optimizables: Vec<Optimizable>,
        predicates: PredicateList,
        catalog: &dyn Catalog,
        required_ordering: Option<RequiredRowOrdering>,
        num_tables: usize,
        override_plan: Option<OptimizerPlan>,
        session: &SessionContext,
    ) -> OptResult<Self> {
        let highest_table = optimizables
            .iter()
            .map(|o| o.table_number())
            .chain(predicates.iter().filter_map(|p| p.highest_table_number()))
            .map(|t| t + 1)
            .max()
            .unwrap_or(0);
        TableSet::check_capacity(num_tables.max(highest_table))?;

        for optimizable in optimizables.iter_mut() {
            optimizable.verify_properties(catalog, &config)?;
        }
        let non_correlated = optimizables
            .iter()
            .fold(TableSet::new(), |acc, o| acc.union(&o.referenced_tables()));

        let dictated_order = match override_plan {
            Some(mut plan) => {
                plan.bind(catalog, session)?;
                debug!("query block {} uses plan override {}", context, plan);
                forced::apply_override(&plan, &mut optimizables)?
            }
            None => Vec::new(),
        };

        let n = optimizables.len();
        let mut optimizer = Self {
            context,
            config,
            tracer,
            optimizables,
            predicates,
            required_ordering,
            num_tables,
            non_correlated,
            dictated_order,
            join_position: -1,
            proposed_join_order: vec![None; n],
            best_join_order: Vec::with_capacity(n),
            assigned: TableSet::new(),
            outermost_cost: CostEstimate::outermost(),
            current_cost: CostEstimate::zero(),
            current_sort_avoidance_cost: CostEstimate::zero(),
            best_cost: CostEstimate::max(),
            sort_cost: None,
            current_row_ordering: RowOrdering::new(),
            best_row_ordering: RowOrdering::new(),
            permute_state: PermuteState::NoJump,
            first_look_order: (0..n).collect(),
            jump_retries: 0,
            found_a_best_plan: false,
            desired_join_order_found: false,
            started: Instant::now(),
            time_exceeded: false,
            saved_plans: HashMap::new(),
        };
        optimizer.permute_state = optimizer.initial_permute_state();
        Ok(optimizer)
    }

    fn initial_permute_state(&self) -> PermuteState {
        if self.num_tables > self.config.jump_threshold
            && self.dictated_order.is_empty()
            && self.config.join_order_optimization
        {
            PermuteState::ReadyToJump
        } else {
            PermuteState::NoJump
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimizables(&self) -> &[Optimizable] {
        &self.optimizables
    }

    pub fn optimizable(&self, table_number: usize) -> Option<&Optimizable> {
        self.optimizables
            .iter()
            .find(|o| o.table_number() == table_number)
    }

    /// Predicates currently not pushed to any optimizable.
    pub fn predicates(&self) -> &PredicateList {
        &self.predicates
    }

    pub fn required_ordering(&self) -> Option<&RequiredRowOrdering> {
        self.required_ordering.as_ref()
    }

    /// Cost of the best complete join order, or the maximum cost if none was found.
    pub fn best_cost(&self) -> &CostEstimate {
        &self.best_cost
    }

    pub fn found_best_plan(&self) -> bool {
        self.found_a_best_plan
    }

    /// Optimizable indexes of the best join order, outermost first.
    pub fn best_join_order(&self) -> &[usize] {
        &self.best_join_order
    }

    pub fn is_time_exceeded(&self) -> bool {
        self.time_exceeded
    }

    /// Runs the whole search.
    pub fn optimize(&mut self) -> OptResult<()> {
        let n = self.optimizables.len();
        self.tracer
            .emit(|t| t.trace_start_query_block(self.context, n));
        debug!("optimizing query block {} with {} optimizables", self.context, n);
        let result = self.search();
        self.tracer.emit(|t| t.trace_end_query_block(self.context));
        if result.is_ok() && self.found_a_best_plan {
            debug!(
                "query block {} best join order {:?} with {}",
                self.context, self.best_join_order, self.best_cost
            );
        }
        result
    }

    fn search(&mut self) -> OptResult<()> {
        while self.get_next_permutation()? {
            while self.get_next_decorated_permutation()? {
                self.cost_permutation()?;
            }
        }
        Ok(())
    }

    /// Union of the tables placed at join positions before `position`.
    fn tables_before(&self, position: usize) -> TableSet {
        self.proposed_join_order[..position]
            .iter()
            .flatten()
            .fold(TableSet::new(), |acc, i| {
                acc.union(&self.optimizables[*i].referenced_tables())
            })
    }

    /// Whether the optimizables can be joined in the order given.
    fn list_order_is_legal(&self) -> bool {
        let mut assigned = TableSet::new();
        for optimizable in &self.optimizables {
            if !optimizable.legal_join_order(&assigned) {
                return false;
            }
            assigned = assigned.union(&optimizable.referenced_tables());
        }
        true
    }

    fn check_time(&mut self) {
        if self.time_exceeded {
            return;
        }
        let elapsed = self.started.elapsed();
        // Cost units are taken as milliseconds.
        let mut exceeded = self.num_tables > self.config.jump_threshold
            && !self.config.no_timeout
            && elapsed.as_secs_f64() * 1000.0 > self.best_cost.cost();
        if let Some(budget) = self.config.time_budget {
            exceeded |= self.found_a_best_plan && elapsed >= budget;
        }
        if exceeded {
            self.time_exceeded = true;
            debug!(
                "query block {} stops searching after {:?}",
                self.context, elapsed
            );
            self.tracer
                .emit(|t| t.trace_timeout(elapsed, &self.best_cost));
        }
    }

    /// Moves to the next join order to cost, either by placing an optimizable at the next
    /// position or by replacing the one at the current position. Returns false once the search
    /// is over.
    pub fn get_next_permutation(&mut self) -> OptResult<bool> {
        let n = self.optimizables.len();
        if n == 0 {
            self.tracer.emit(|t| t.trace_vacuous());
            return Ok(false);
        }
        self.check_time();

        let last = n as isize - 1;
        let mut advanced = false;
        if self.join_position < last
            && (self.current_cost.is_cheaper_than(&self.best_cost)
                || self
                    .current_sort_avoidance_cost
                    .is_cheaper_than(&self.best_cost))
            && !self.time_exceeded
        {
            let placed_is_costed = self.join_position < 0
                || self.proposed_join_order[self.join_position as usize]
                    .map(|i| self.optimizables[i].best_access_path().cost_estimate().is_some())
                    .unwrap_or(false);
            if placed_is_costed {
                self.join_position += 1;
                advanced = true;
                self.current_row_ordering = self.best_row_ordering.clone();
            }
        } else if self.join_position >= 0 && self.join_position < last {
            let position = self.join_position as usize;
            if let Some(i) = self.proposed_join_order[position] {
                let table = self.optimizables[i].table_number();
                trace!("short circuiting at join position {}", position);
                self.tracer
                    .emit(|t| t.trace_short_circuiting(self.time_exceeded, table, position));
            }
        }

        if self.permute_state == PermuteState::Jumping && !advanced && self.join_position >= 0 {
            self.rewind_join_order();
            self.permute_state = PermuteState::NoJump;
        }

        while self.join_position >= 0 {
            let position = self.join_position as usize;
            let mut next;
            if self.desired_join_order_found || self.time_exceeded {
                next = n;
            } else if position < self.dictated_order.len() {
                let dictated = self.dictated_order[position];
                if self.proposed_join_order[position] == Some(dictated) {
                    next = n;
                } else {
                    let outer = self.tables_before(position);
                    if !self.optimizables[dictated].legal_join_order(&outer) {
                        self.tracer.emit(|t| t.trace_illegal_user_join_order());
                        return Err(OptimizerError::IllegalForcedJoinOrder);
                    }
                    next = dictated;
                }
            } else if self.permute_state == PermuteState::Jumping {
                next = self.first_look_order[position];
                let outer = self.tables_before(position);
                if !self.optimizables[next].legal_join_order(&outer) {
                    if position < n - 1 && position > 0 && self.jump_retries < n {
                        self.first_look_order.swap(position, n - 1);
                        self.jump_retries += 1;
                    } else {
                        self.permute_state = PermuteState::NoJump;
                    }
                    if position > 0 {
                        self.join_position -= 1;
                        self.rewind_join_order();
                    }
                    continue;
                }
                if position == n - 1 {
                    self.permute_state = PermuteState::WalkHigh;
                }
            } else {
                next = self.proposed_join_order[position]
                    .map(|p| p + 1)
                    .unwrap_or(0);
                let outer = self.tables_before(position);
                while next < n {
                    let found = self.proposed_join_order[..position].contains(&Some(next));
                    if !found && !self.optimizables[next].legal_join_order(&outer) {
                        self.tracer.emit(|t| {
                            t.trace_skipping_join_order(
                                next,
                                position,
                                &self.proposed_join_order,
                                &outer,
                            )
                        });
                        if !self.config.join_order_optimization {
                            self.tracer.emit(|t| t.trace_illegal_user_join_order());
                            return Err(OptimizerError::IllegalForcedJoinOrder);
                        }
                        next += 1;
                        continue;
                    }
                    if !found {
                        break;
                    }
                    next += 1;
                }
            }

            if let Some(pulled) = self.proposed_join_order[position] {
                self.pull_from_position(position, pulled);
            }

            if next >= n {
                if !self.config.join_order_optimization && !self.desired_join_order_found {
                    if !self.list_order_is_legal() {
                        self.tracer.emit(|t| t.trace_illegal_user_join_order());
                        return Err(OptimizerError::IllegalForcedJoinOrder);
                    }
                    self.tracer.emit(|t| t.trace_user_join_order_optimized());
                    self.desired_join_order_found = true;
                }

                if self.permute_state == PermuteState::ReadyToJump
                    && position > 0
                    && position == n - 1
                    && self.prepare_jump()
                {
                    self.join_position -= 1;
                    self.rewind_join_order();
                    continue;
                }

                self.join_position -= 1;
                if self.join_position >= 0 {
                    if let Some(i) = self.proposed_join_order[self.join_position as usize] {
                        self.assigned = self
                            .assigned
                            .difference(&self.optimizables[i].referenced_tables());
                    }
                }
                if self.join_position < 0 && self.permute_state == PermuteState::WalkHigh {
                    self.join_position = 0;
                    self.permute_state = PermuteState::WalkLow;
                }
                continue;
            }

            self.proposed_join_order[position] = Some(next);
            if self.permute_state == PermuteState::WalkLow && self.finished_walk() {
                self.proposed_join_order[position] = None;
                self.join_position -= 1;
                if self.join_position >= 0 {
                    self.rewind_join_order();
                    self.join_position = -1;
                }
                self.permute_state = PermuteState::ReadyToJump;
                return Ok(false);
            }

            self.optimizables[next].start_optimizing();
            self.assigned = self.tables_before(position + 1);
            self.tracer.emit(|t| {
                t.trace_join_order_consideration(
                    position,
                    &self.proposed_join_order,
                    &self.assigned,
                )
            });
            trace!(
                "query block {} considering join order {:?}",
                self.context,
                self.proposed_join_order
            );
            let outer = self.assigned;
            self.push_predicates(next, &outer);
            return Ok(true);
        }
        Ok(false)
    }

    /// Takes the optimizable at `position` out of the join order, removing its cost from the
    /// running totals and returning its predicates to the pool.
    fn pull_from_position(&mut self, position: usize, pulled: usize) {
        let previous = if position == 0 {
            None
        } else {
            self.proposed_join_order[position - 1]
        };
        let previous_best = previous
            .and_then(|p| self.optimizables[p].best_access_path().cost_estimate().copied())
            .unwrap_or(self.outermost_cost);

        let mut new_cost = self.current_cost.cost();
        if let Some(pulled_cost) = self.optimizables[pulled].best_access_path().cost_estimate() {
            new_cost = (new_cost - pulled_cost.cost()).max(0.0);
        }
        if position == 0 {
            new_cost = self.outermost_cost.cost();
        }
        self.current_cost = CostEstimate::new(
            new_cost,
            previous_best.row_count(),
            previous_best.single_scan_row_count(),
        );

        if self.required_ordering.is_some()
            && self.optimizables[pulled].consider_sort_avoidance_path()
        {
            let pulled_cost = self.optimizables[pulled]
                .best_sort_avoidance_path()
                .cost_estimate()
                .map(|c| c.cost())
                .unwrap_or(0.0);
            self.current_sort_avoidance_cost = match previous {
                None => self.outermost_cost,
                Some(p) => {
                    let opt = &self.optimizables[p];
                    let previous_sa = opt
                        .best_sort_avoidance_path()
                        .cost_estimate()
                        .or_else(|| opt.best_access_path().cost_estimate())
                        .copied()
                        .unwrap_or(self.outermost_cost);
                    CostEstimate::new(
                        self.current_sort_avoidance_cost.cost() - pulled_cost,
                        previous_sa.row_count(),
                        previous_sa.single_scan_row_count(),
                    )
                }
            };
            self.best_row_ordering
                .remove_optimizable(self.optimizables[pulled].table_number());
            self.current_row_ordering = self.best_row_ordering.clone();
        }

        self.optimizables[pulled].pull_opt_predicates(&mut self.predicates);
        self.proposed_join_order[position] = None;
    }

    /// Orders the optimizables by ascending single scan row count of their best paths. Returns
    /// whether that order differs from the list order.
    fn prepare_jump(&mut self) -> bool {
        let mut row_counts = Vec::with_capacity(self.optimizables.len());
        for optimizable in &self.optimizables {
            match optimizable.best_access_path().cost_estimate() {
                Some(ce) => row_counts.push(ce.single_scan_row_count()),
                None => return false,
            }
        }
        let n = row_counts.len();
        let mut order: Vec<usize> = (0..n).collect();
        let mut moved = false;
        for i in 0..n {
            let mut k = i;
            for j in i + 1..n {
                if row_counts[j] < row_counts[k] {
                    k = j;
                }
            }
            if k != i {
                row_counts[k] = row_counts[i];
                order.swap(i, k);
                moved = true;
            }
        }
        if moved {
            debug!(
                "query block {} jumps to join order {:?}",
                self.context, order
            );
            self.first_look_order = order;
            self.permute_state = PermuteState::Jumping;
        } else {
            self.permute_state = PermuteState::NoJump;
        }
        moved
    }

    /// Whether the walk below the jump target came back to it.
    fn finished_walk(&self) -> bool {
        for (proposed, first) in self
            .proposed_join_order
            .iter()
            .zip(self.first_look_order.iter())
        {
            let proposed = proposed.map(|p| p as isize).unwrap_or(-1);
            match proposed.cmp(&(*first as isize)) {
                Ordering::Less => return false,
                Ordering::Greater => return true,
                Ordering::Equal => {}
            }
        }
        true
    }

    /// Pulls everything from `join_position` down to 0 and restarts at position 0.
    fn rewind_join_order(&mut self) {
        let mut position = self.join_position.max(0) as usize;
        loop {
            if let Some(i) = self.proposed_join_order.get(position).copied().flatten() {
                self.optimizables[i].pull_opt_predicates(&mut self.predicates);
                self.proposed_join_order[position] = None;
            }
            if position == 0 {
                break;
            }
            position -= 1;
        }
        self.join_position = 0;
        self.current_cost = CostEstimate::zero();
        self.current_sort_avoidance_cost = CostEstimate::zero();
        self.assigned.clear();
        self.current_row_ordering = RowOrdering::new();
        self.best_row_ordering = RowOrdering::new();
    }

    /// Moves every pooled predicate that only references `outer_tables` (or tables outside this
    /// query block) to the optimizable at `index`. Predicates with subqueries stay in the pool.
    fn push_predicates(&mut self, index: usize, outer_tables: &TableSet) {
        let mut i = self.predicates.len();
        while i > 0 {
            i -= 1;
            let predicate = self.predicates.get(i);
            if predicate.has_subquery() {
                continue;
            }
            let unplaced = predicate
                .referenced_tables()
                .difference(outer_tables)
                .intersection(&self.non_correlated);
            if unplaced.is_empty() {
                let predicate = self.predicates.remove(i);
                self.optimizables[index].push_opt_predicate(predicate);
            }
        }
    }

    /// Moves the optimizable at the current position to its next access path. When its paths
    /// are exhausted, adds its best path to the running cost and, at the last position, considers
    /// the complete join order. Returns false once the paths are exhausted.
    pub fn get_next_decorated_permutation(&mut self) -> OptResult<bool> {
        if self.join_position < 0 {
            return Ok(false);
        }
        let position = self.join_position as usize;
        let index = match self.proposed_join_order[position] {
            Some(i) => i,
            None => return Ok(false),
        };

        if self.optimizables[index].next_access_path(&mut self.current_row_ordering, &self.tracer) {
            return Ok(true);
        }
        let best = match self.optimizables[index].best_access_path().cost_estimate() {
            Some(ce) => *ce,
            None => return Ok(false),
        };

        self.current_cost = CostEstimate::new(
            self.current_cost.cost() + best.cost(),
            best.row_count(),
            best.single_scan_row_count(),
        );
        let consider_sort_avoidance = self.optimizables[index].consider_sort_avoidance_path();
        if consider_sort_avoidance && self.required_ordering.is_some() {
            if let Some(sa) = self.optimizables[index]
                .best_sort_avoidance_path()
                .cost_estimate()
            {
                self.current_sort_avoidance_cost = CostEstimate::new(
                    self.current_sort_avoidance_cost.cost() + sa.cost(),
                    sa.row_count(),
                    sa.single_scan_row_count(),
                );
            }
        }
        self.tracer
            .emit(|t| t.trace_cost_without_sort_avoidance(&self.current_cost));
        if consider_sort_avoidance {
            self.tracer
                .emit(|t| t.trace_cost_with_sort_avoidance(&self.current_sort_avoidance_cost));
        }

        if position == self.optimizables.len() - 1 {
            self.consider_complete_join_order(consider_sort_avoidance);
        }
        Ok(false)
    }

    fn consider_complete_join_order(&mut self, consider_sort_avoidance: bool) {
        self.tracer
            .emit(|t| t.trace_complete_join_order(&self.proposed_join_order));

        let mut sort_cost = CostEstimate::zero();
        let mut original_row_count = self.current_cost.row_count();
        if let Some(required) = &self.required_ordering {
            let mut got_sort_cost = false;
            if self.sort_cost.is_some() && required.is_sort_needed() && self.found_a_best_plan {
                if self.best_cost.row_count() > self.current_cost.row_count() {
                    // The best plan was costed with a sort of more rows than this one returns.
                    let old_sort_cost = required.estimate_cost(self.best_cost.row_count()).cost();
                    sort_cost = required.estimate_cost(self.current_cost.row_count());
                    got_sort_cost = true;
                    self.best_cost = CostEstimate::new(
                        self.best_cost.cost() - old_sort_cost + sort_cost.cost(),
                        sort_cost.row_count(),
                        self.current_cost.single_scan_row_count(),
                    );
                } else if self.best_cost.row_count() < self.current_cost.row_count() {
                    self.current_cost =
                        self.current_cost.with_row_count(self.best_cost.row_count());
                }
            }
            if !got_sort_cost {
                sort_cost = required.estimate_cost(self.current_cost.row_count());
            }
            self.sort_cost = Some(sort_cost);
            original_row_count = self.current_cost.row_count();
            self.current_cost = CostEstimate::new(
                self.current_cost.cost() + sort_cost.cost(),
                sort_cost.row_count(),
                self.current_cost.single_scan_row_count(),
            );
            self.tracer
                .emit(|t| t.trace_sort_cost(&sort_cost, &self.current_cost));
        }

        if !self.found_a_best_plan
            || self
                .config
                .tie_break
                .replaces(&self.current_cost, &self.best_cost)
        {
            let cost = self.current_cost;
            self.remember_best_cost(cost, PlanType::Normal);
        }

        if self.required_ordering.is_some() {
            self.current_cost = CostEstimate::new(
                (self.current_cost.cost() - sort_cost.cost()).max(0.0),
                original_row_count,
                self.current_cost.single_scan_row_count(),
            );
        }

        let avoids_sort = consider_sort_avoidance
            && self
                .required_ordering
                .as_ref()
                .map(|r| {
                    r.sort_required(&self.best_row_ordering, None)
                        == SortRequirement::NothingRequired
                })
                .unwrap_or(false);
        if avoids_sort {
            self.tracer.emit(|t| {
                t.trace_current_plan_avoids_sort(&self.best_cost, &self.current_sort_avoidance_cost)
            });
            if self.current_sort_avoidance_cost.compare(&self.best_cost) != Ordering::Greater {
                let cost = self.current_sort_avoidance_cost;
                self.remember_best_cost(cost, PlanType::SortAvoidance);
            }
        }
    }

    fn remember_best_cost(&mut self, cost: CostEstimate, plan_type: PlanType) {
        self.found_a_best_plan = true;
        self.tracer
            .emit(|t| t.trace_cheapest_plan_so_far(plan_type, &cost));
        self.best_cost = cost;
        self.best_join_order = self.proposed_join_order.iter().flatten().copied().collect();

        let tracer = &self.tracer;
        for i in &self.best_join_order {
            self.optimizables[*i].remember_as_best(plan_type, self.context, tracer);
        }

        if let Some(required) = &mut self.required_ordering {
            match plan_type {
                PlanType::SortAvoidance => required.sort_not_needed(),
                PlanType::Normal => required.sort_needed(),
            }
            let sort_needed = required.is_sort_needed();
            self.tracer
                .emit(|t| t.trace_sort_needed_for_ordering(plan_type, sort_needed));
        }
        if self.tracer.is_on() {
            if let Some(plan) = self.best_plan() {
                self.tracer.emit(|t| {
                    t.trace_remembering_best_join_order(
                        self.context,
                        &self.best_join_order,
                        &plan,
                        plan_type,
                        &self.best_cost,
                    )
                });
            }
        }
        trace!(
            "query block {} remembers {} join order {:?} with {}",
            self.context,
            plan_type,
            self.best_join_order,
            self.best_cost
        );
    }

    /// The best join order as a plan override, built from the truly-the-best access paths.
    pub fn best_plan(&self) -> Option<OptimizerPlan> {
        let (first, rest) = self.best_join_order.split_first()?;
        let leaf = |i: usize| {
            let optimizable = &self.optimizables[i];
            optimizable.plan_leaf(optimizable.truly_the_best_access_path())
        };
        Some(OptimizerPlan::left_deep(
            leaf(*first),
            rest.iter().map(|i| {
                let strategy = self.optimizables[*i]
                    .truly_the_best_access_path()
                    .join_strategy()
                    .unwrap_or(JoinStrategyKind::NestedLoop);
                (strategy, leaf(*i))
            }),
        ))
    }

    /// Costs the current access path of the optimizable at the current join position.
    pub fn cost_permutation(&mut self) -> OptResult<()> {
        if self.join_position < 0 {
            return Ok(());
        }
        let position = self.join_position as usize;
        let index = match self.proposed_join_order[position] {
            Some(i) => i,
            None => return Ok(()),
        };
        let outer_cost = if position == 0 {
            self.outermost_cost
        } else {
            match self.proposed_join_order[position - 1]
                .and_then(|p| self.optimizables[p].best_access_path().cost_estimate().copied())
            {
                Some(ce) => ce,
                None => return Ok(()),
            }
        };

        let optimizable = &mut self.optimizables[index];
        if !optimizable.feasible_join_strategy(&outer_cost, &self.tracer) {
            return Ok(());
        }
        let estimate = optimizable.optimize_it(&outer_cost, &self.tracer)?;
        self.consider_cost(index, estimate);
        Ok(())
    }

    /// Keeps the current access path of the optimizable at `index` if it is the cheapest at this
    /// position, and separately if it is the cheapest that keeps the required ordering.
    fn consider_cost(&mut self, index: usize, estimate: CostEstimate) {
        let position = self.join_position as usize;
        let max_memory = self.config.max_memory_per_table;
        let optimizable = &self.optimizables[index];
        let rows_per_scan = optimizable.current_memory_rows();
        if !optimizable.memory_usage_ok(rows_per_scan, max_memory) {
            let table = optimizable.table_number();
            trace!(
                "table {} skips an access path needing {:.1} rows in memory",
                table,
                rows_per_scan
            );
            self.tracer.emit(|t| {
                t.trace_skipping_because_too_much_memory(table, rows_per_scan, max_memory)
            });
            return;
        }

        let replaces = match optimizable.best_access_path().cost_estimate() {
            None => true,
            Some(best) if optimizable.is_base_table() => {
                estimate.compare(best) == Ordering::Less
            }
            Some(best) => estimate.compare(best) != Ordering::Greater,
        };
        if replaces {
            self.optimizables[index].remember_current_as(PlanType::Normal);
        }

        let Some(required) = &self.required_ordering else {
            return;
        };
        let previous_keeps_order = position == 0
            || self.proposed_join_order[position - 1]
                .map(|p| self.optimizables[p].consider_sort_avoidance_path())
                .unwrap_or(false);
        if !previous_keeps_order
            || required.sort_required(&self.current_row_ordering, Some(&self.assigned))
                != SortRequirement::NothingRequired
        {
            return;
        }
        let cheaper = match self.optimizables[index]
            .best_sort_avoidance_path()
            .cost_estimate()
        {
            None => true,
            Some(best) => estimate.is_cheaper_than(best),
        };
        if cheaper {
            self.optimizables[index].remember_current_as(PlanType::SortAvoidance);
            self.best_row_ordering = self.current_row_ordering.clone();
        }
    }

    /// Sets the number of rows the outermost position is probed with; a subquery is optimized
    /// once per outer row.
    pub fn set_outer_rows(&mut self, outer_rows: f64) {
        self.outermost_cost = CostEstimate::new(
            self.outermost_cost.cost(),
            outer_rows,
            self.outermost_cost.single_scan_row_count(),
        );
    }

    /// Resets the search so it can run again, e.g. for another outer row count.
    pub fn prep_for_next_round(&mut self) {
        for optimizable in self.optimizables.iter_mut() {
            optimizable.pull_opt_predicates(&mut self.predicates);
        }
        self.join_position = -1;
        self.proposed_join_order.iter_mut().for_each(|p| *p = None);
        self.best_join_order.clear();
        self.assigned.clear();
        self.current_cost = CostEstimate::zero();
        self.current_sort_avoidance_cost = CostEstimate::zero();
        self.best_cost = CostEstimate::max();
        self.sort_cost = None;
        self.current_row_ordering = RowOrdering::new();
        self.best_row_ordering = RowOrdering::new();
        self.first_look_order = (0..self.optimizables.len()).collect();
        self.jump_retries = 0;
        self.permute_state = self.initial_permute_state();
        self.found_a_best_plan = false;
        self.desired_join_order_found = false;
        self.started = Instant::now();
        self.time_exceeded = false;
        if let Some(required) = &mut self.required_ordering {
            required.sort_needed();
        }
    }

    /// Runs a fresh round with the outermost position probed `outer_rows` times and returns the
    /// best cost.
    pub fn optimize_for_outer_rows(&mut self, outer_rows: f64) -> OptResult<CostEstimate> {
        self.prep_for_next_round();
        self.set_outer_rows(outer_rows);
        self.optimize()?;
        if self.optimizables.is_empty() {
            return Ok(CostEstimate::new(0.0, outer_rows, 1.0));
        }
        if !self.found_a_best_plan {
            self.tracer.emit(|t| t.trace_no_best_plan(self.context));
            return Err(OptimizerError::NoBestPlan(self.context.0));
        }
        Ok(self.best_cost)
    }

    /// Saves, restores or forgets the best join order under `key`, together with the
    /// truly-the-best access path of every optimizable.
    pub fn update_best_plan_maps(&mut self, action: PlanAction, key: ContextId) {
        match action {
            PlanAction::Add => {
                self.saved_plans.insert(
                    key,
                    SavedPlan {
                        join_order: self.best_join_order.clone(),
                        cost: self.best_cost,
                        found: self.found_a_best_plan,
                        sort_needed: self.required_ordering.as_ref().map(|r| r.is_sort_needed()),
                    },
                );
            }
            PlanAction::Load => {
                if let Some(saved) = self.saved_plans.get(&key).cloned() {
                    self.best_join_order = saved.join_order;
                    self.best_cost = saved.cost;
                    self.found_a_best_plan = saved.found;
                    if let (Some(required), Some(sort_needed)) =
                        (&mut self.required_ordering, saved.sort_needed)
                    {
                        if sort_needed {
                            required.sort_needed();
                        } else {
                            required.sort_not_needed();
                        }
                    }
                }
            }
            PlanAction::Remove => {
                self.saved_plans.remove(&key);
            }
        }
        for optimizable in self.optimizables.iter_mut() {
            optimizable.update_best_plan_map(action, key);
        }
    }

    /// Finalizes the best join order: pushes predicates in that order and turns every
    /// optimizable's truly-the-best access path into a row source node.
    pub fn modify_access_paths(&mut self) -> OptResult<JoinPlan> {
        self.tracer
            .emit(|t| t.trace_modifying_access_paths(self.context));
        if self.optimizables.is_empty() {
            return Ok(JoinPlan::vacuous(self.context));
        }
        if !self.found_a_best_plan {
            self.tracer.emit(|t| t.trace_no_best_plan(self.context));
            return Err(OptimizerError::NoBestPlan(self.context.0));
        }

        for optimizable in self.optimizables.iter_mut() {
            optimizable.pull_opt_predicates(&mut self.predicates);
        }
        let plan = self.best_plan();
        let mut outer_tables = TableSet::new();
        let mut entries = Vec::with_capacity(self.best_join_order.len());
        for index in self.best_join_order.clone() {
            outer_tables = outer_tables.union(&self.optimizables[index].referenced_tables());
            self.push_predicates(index, &outer_tables);
            let optimizable = &mut self.optimizables[index];
            let node = optimizable.modify_access_path(self.context)?;
            entries.push(JoinPlanEntry {
                table_number: optimizable.table_number(),
                name: optimizable.name().to_string(),
                access_path: optimizable.truly_the_best_access_path().clone(),
                plan_type: optimizable.truly_the_best_plan_type(),
                predicates: optimizable.pushed_predicates().iter().map(|p| p.id()).collect(),
                node,
            });
        }
        let sort_needed = self
            .required_ordering
            .as_ref()
            .map(|r| r.is_sort_needed())
            .unwrap_or(false);
        Ok(JoinPlan::new(
            self.context,
            entries,
            self.best_cost,
            sort_needed,
            plan,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, InMemoryCatalog};
    use crate::predicate::{ColumnRef, Predicate};
    use crate::stat::Statistics;

    fn two_tables() -> (InMemoryCatalog, Vec<Optimizable>) {
        let mut catalog = InMemoryCatalog::new();
        let s = catalog.add_schema("APP");
        let a = catalog.add_table(s, "A", &[("X", 4.0)]);
        let b = catalog.add_table(s, "B", &[("X", 4.0)]);
        catalog.set_statistics(a, Statistics::new(10.0, 4.0));
        catalog.set_statistics(b, Statistics::new(10_000.0, 4.0));
        let schema = catalog.schema_descriptor("APP").unwrap().unwrap();
        let optimizables = vec![
            Optimizable::base_table(
                0,
                schema.clone(),
                catalog.table_descriptor(a).unwrap().unwrap(),
            ),
            Optimizable::base_table(1, schema, catalog.table_descriptor(b).unwrap().unwrap()),
        ];
        (catalog, optimizables)
    }

    fn optimizer(
        config: OptimizerConfig,
        optimizables: Vec<Optimizable>,
        catalog: &InMemoryCatalog,
    ) -> Optimizer {
        let predicates = vec![Predicate::equijoin(0, ColumnRef::new(0, 0), ColumnRef::new(1, 0))]
            .into_iter()
            .collect();
        OptimizerFactory::new(config)
            .get_optimizer(
                optimizables,
                predicates,
                catalog,
                None,
                2,
                None,
                &SessionContext::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_permutations_visit_every_order() {
        let (catalog, optimizables) = two_tables();
        let mut optimizer = optimizer(OptimizerConfig::default(), optimizables, &catalog);
        let mut complete = Vec::new();
        while optimizer.get_next_permutation().unwrap() {
            if optimizer.join_position == 1 {
                complete.push(optimizer.proposed_join_order.clone());
            }
            while optimizer.get_next_decorated_permutation().unwrap() {
                optimizer.cost_permutation().unwrap();
            }
        }
        assert_eq!(complete, vec![vec![Some(0), Some(1)], vec![Some(1), Some(0)]]);
        assert!(optimizer.found_best_plan());
        // every predicate is back in the pool
        assert_eq!(optimizer.predicates().len(), 1);
    }

    #[test]
    fn test_fixed_join_order() {
        let (catalog, optimizables) = two_tables();
        let config = OptimizerConfig::default().with_join_order_optimization(false);
        let mut optimizer = optimizer(config, optimizables, &catalog);
        optimizer.optimize().unwrap();
        assert_eq!(optimizer.best_join_order(), &[0, 1]);
    }

    #[test]
    fn test_illegal_fixed_join_order() {
        let (catalog, mut optimizables) = two_tables();
        let first = optimizables.remove(0).with_dependencies(TableSet::single(1));
        optimizables.insert(0, first);
        let config = OptimizerConfig::default().with_join_order_optimization(false);
        let mut optimizer = optimizer(config, optimizables, &catalog);
        assert!(matches!(
            optimizer.optimize(),
            Err(OptimizerError::IllegalForcedJoinOrder)
        ));
    }

    #[test]
    fn test_small_table_goes_first() {
        let (catalog, optimizables) = two_tables();
        let mut optimizer = optimizer(OptimizerConfig::default(), optimizables, &catalog);
        optimizer.optimize().unwrap();
        let plan = optimizer.modify_access_paths().unwrap();
        assert_eq!(plan.join_order(), vec![0, 1]);
        assert_eq!(plan.entries()[1].predicates, vec![0]);
        assert!(plan.entries()[0].predicates.is_empty());
    }

    #[test]
    fn test_saved_plans_round_trip() {
        let (catalog, optimizables) = two_tables();
        let mut optimizer = optimizer(OptimizerConfig::default(), optimizables, &catalog);
        optimizer.optimize().unwrap();
        let best = optimizer.best_join_order().to_vec();
        optimizer.update_best_plan_maps(PlanAction::Add, ContextId(100));

        optimizer.prep_for_next_round();
        assert!(!optimizer.found_best_plan());
        optimizer.update_best_plan_maps(PlanAction::Load, ContextId(100));
        assert!(optimizer.found_best_plan());
        assert_eq!(optimizer.best_join_order(), best.as_slice());

        optimizer.update_best_plan_maps(PlanAction::Remove, ContextId(100));
        assert!(optimizer.saved_plans.is_empty());
    }
}

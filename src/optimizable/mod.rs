//! Row sources that take part in join order search.
//!
//! An [`Optimizable`] is one entry of the optimizer's list: a base table, a subquery with its own
//! nested optimizer, or a table function. For its current join position it enumerates candidate
//! access paths (conglomerate and join strategy), costs them, and keeps three snapshots:
//!
//! * the best access path at the current position,
//! * the best access path that avoids a sort,
//! * the truly-the-best access path, committed when the whole join order becomes the best one.
//!
//! Truly-the-best paths are also saved per enclosing optimization context in a [`BestPlanMemo`],
//! so nested optimizations do not clobber each other's choices.

use std::fmt::{Display, Formatter};

use log::trace;
use smallvec::SmallVec;
use strum_macros::Display;

use crate::catalog::{
    AliasDescriptor, Catalog, ConglomerateDescriptor, SchemaDescriptor, TableDescriptor,
};
use crate::cost::CostEstimate;
use crate::error::{OptResult, OptimizerError};
use crate::operator::{AccessNode, AccessPath, JoinStrategyKind, ScanCost};
use crate::optimizer::{ContextId, Optimizer, OptimizerConfig};
use crate::plan::{OptimizerPlan, RowSource};
use crate::predicate::{ColumnRef, Predicate, PredicateList, TableSet};
use crate::properties::{RowOrdering, SortDirection};
use crate::stat::{Statistics, DEFAULT_ROW_WIDTH};
use crate::trace::Tracer;

mod hints;
pub use hints::*;
mod memo;
pub use memo::*;
mod scan;
pub use scan::ScanSelectivity;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
pub enum PlanType {
    #[strum(serialize = "normal")]
    Normal,
    #[strum(serialize = "sort avoidance")]
    SortAvoidance,
}

#[derive(Debug)]
pub struct BaseTable {
    schema: SchemaDescriptor,
    table: TableDescriptor,
    referenced_columns: SmallVec<[usize; 8]>,
    conglomerates: Vec<ConglomerateDescriptor>,
    statistics: Statistics,
}

impl BaseTable {
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn conglomerates(&self) -> &[ConglomerateDescriptor] {
        &self.conglomerates
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// An index covers the table when it holds every column the query reads.
    fn is_covering(&self, conglomerate: &ConglomerateDescriptor) -> bool {
        match &conglomerate.index {
            Some(index) => self
                .referenced_columns
                .iter()
                .all(|c| index.key_columns.contains(c)),
            None => false,
        }
    }

    fn per_row_usage(&self) -> f64 {
        self.referenced_columns
            .iter()
            .filter_map(|c| self.table.column(*c))
            .map(|c| c.width)
            .sum()
    }
}

#[derive(Debug)]
pub struct TableFunction {
    schema: SchemaDescriptor,
    alias: AliasDescriptor,
}

impl TableFunction {
    pub fn alias(&self) -> &AliasDescriptor {
        &self.alias
    }
}

#[derive(Debug)]
pub struct Subquery {
    inner: Box<Optimizer>,
    correlated: bool,
    /// Memo keys for the inner plan behind the current best and best sort-avoiding paths.
    best_key: ContextId,
    sort_avoidance_key: ContextId,
}

impl Subquery {
    pub fn inner(&self) -> &Optimizer {
        &self.inner
    }

    fn key(&self, plan_type: PlanType) -> ContextId {
        match plan_type {
            PlanType::Normal => self.best_key,
            PlanType::SortAvoidance => self.sort_avoidance_key,
        }
    }
}

#[derive(Debug)]
pub enum RowSourceKind {
    BaseTable(BaseTable),
    Subquery(Subquery),
    TableFunction(TableFunction),
}

/// Choices dictated by a plan override.
#[derive(Clone, Debug, Default, PartialEq)]
struct Forced {
    conglomerate: Option<ConglomerateDescriptor>,
    join_strategy: Option<JoinStrategyKind>,
}

#[derive(Debug)]
pub struct Optimizable {
    table_number: usize,
    name: String,
    kind: RowSourceKind,
    referenced_tables: TableSet,
    dependencies: TableSet,
    properties: Vec<(String, String)>,
    hints: TableHints,
    forced: Forced,
    strategies: SmallVec<[JoinStrategyKind; 2]>,
    candidates: SmallVec<[Option<usize>; 4]>,
    cursor: Option<(usize, usize)>,
    current_path: AccessPath,
    best_path: AccessPath,
    best_sort_avoidance_path: AccessPath,
    truly_the_best: AccessPath,
    truly_the_best_plan_type: Option<PlanType>,
    memo: BestPlanMemo,
    pushed: PredicateList,
    consider_sort_avoidance: bool,
    hash_key_columns: SmallVec<[usize; 4]>,
    memory_rows: f64,
}

impl Optimizable {
    fn new(table_number: usize, name: String, kind: RowSourceKind) -> Self {
        Self {
            table_number,
            name,
            kind,
            referenced_tables: TableSet::single(table_number),
            dependencies: TableSet::new(),
            properties: Vec::new(),
            hints: TableHints::default(),
            forced: Forced::default(),
            strategies: SmallVec::new(),
            candidates: SmallVec::new(),
            cursor: None,
            current_path: AccessPath::new(),
            best_path: AccessPath::new(),
            best_sort_avoidance_path: AccessPath::new(),
            truly_the_best: AccessPath::new(),
            truly_the_best_plan_type: None,
            memo: BestPlanMemo::default(),
            pushed: PredicateList::new(),
            consider_sort_avoidance: false,
            hash_key_columns: SmallVec::new(),
            memory_rows: 0.0,
        }
    }

    /// A base table reading every column. Conglomerates and statistics are loaded from the catalog
    /// when the optimizer is built.
    pub fn base_table(
        table_number: usize,
        schema: SchemaDescriptor,
        table: TableDescriptor,
    ) -> Self {
        let referenced_columns = (0..table.columns.len()).collect();
        let name = table.name.clone();
        Self::new(
            table_number,
            name,
            RowSourceKind::BaseTable(BaseTable {
                schema,
                table,
                referenced_columns,
                conglomerates: Vec::new(),
                statistics: Statistics::default(),
            }),
        )
    }

    pub fn table_function(
        table_number: usize,
        schema: SchemaDescriptor,
        alias: AliasDescriptor,
    ) -> Self {
        let name = alias.name.clone();
        Self::new(
            table_number,
            name,
            RowSourceKind::TableFunction(TableFunction { schema, alias }),
        )
    }

    /// A subquery optimized by `inner`. A correlated subquery must follow the tables in
    /// `correlated_with` and cannot be materialized.
    pub fn subquery(
        table_number: usize,
        name: &str,
        inner: Optimizer,
        correlated_with: TableSet,
        best_key: ContextId,
        sort_avoidance_key: ContextId,
    ) -> Self {
        let mut optimizable = Self::new(
            table_number,
            name.to_string(),
            RowSourceKind::Subquery(Subquery {
                inner: Box::new(inner),
                correlated: !correlated_with.is_empty(),
                best_key,
                sort_avoidance_key,
            }),
        );
        optimizable.dependencies = correlated_with;
        optimizable
    }

    /// Restricts the columns the query reads, which decides whether an index covers.
    pub fn with_referenced_columns<I: IntoIterator<Item = usize>>(mut self, columns: I) -> Self {
        if let RowSourceKind::BaseTable(table) = &mut self.kind {
            table.referenced_columns = columns.into_iter().collect();
        }
        self
    }

    /// Tables that must be placed before this one.
    pub fn with_dependencies(mut self, dependencies: TableSet) -> Self {
        self.dependencies = self.dependencies.union(&dependencies);
        self
    }

    /// Adds an optimizer hint; hints are validated when the optimizer is built.
    pub fn with_hint<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn table_number(&self) -> usize {
        self.table_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RowSourceKind {
        &self.kind
    }

    pub fn referenced_tables(&self) -> TableSet {
        self.referenced_tables
    }

    pub fn hints(&self) -> &TableHints {
        &self.hints
    }

    pub fn is_base_table(&self) -> bool {
        matches!(self.kind, RowSourceKind::BaseTable(_))
    }

    /// Whether the whole result can be buffered, e.g. as a hash table.
    pub fn is_materializable(&self) -> bool {
        match &self.kind {
            RowSourceKind::Subquery(sq) => !sq.correlated,
            _ => true,
        }
    }

    pub fn current_access_path(&self) -> &AccessPath {
        &self.current_path
    }

    pub fn best_access_path(&self) -> &AccessPath {
        &self.best_path
    }

    pub fn best_sort_avoidance_path(&self) -> &AccessPath {
        &self.best_sort_avoidance_path
    }

    pub fn truly_the_best_access_path(&self) -> &AccessPath {
        &self.truly_the_best
    }

    pub fn truly_the_best_plan_type(&self) -> Option<PlanType> {
        self.truly_the_best_plan_type
    }

    pub fn consider_sort_avoidance_path(&self) -> bool {
        self.consider_sort_avoidance
    }

    pub fn memo(&self) -> &BestPlanMemo {
        &self.memo
    }

    pub fn pushed_predicates(&self) -> &PredicateList {
        &self.pushed
    }

    pub fn legal_join_order(&self, assigned: &TableSet) -> bool {
        self.dependencies.is_subset(assigned)
    }

    fn user_specified_join_strategy(&self) -> Option<JoinStrategyKind> {
        self.forced.join_strategy.or(self.hints.join_strategy)
    }

    /// Validates hints against the catalog and loads what costing needs.
    pub fn verify_properties(
        &mut self,
        catalog: &dyn Catalog,
        config: &OptimizerConfig,
    ) -> OptResult<()> {
        self.hints = TableHints::parse(&self.name, &self.properties)?;
        match &mut self.kind {
            RowSourceKind::BaseTable(table) => {
                table.conglomerates = catalog.conglomerates(table.table.id)?;
                let statistics = catalog.statistics(table.table.id)?.unwrap_or_default();
                table.statistics = if config.use_statistics {
                    statistics
                } else {
                    Statistics::new(statistics.row_count(), statistics.row_width())
                };
                if let Some(IndexHint::Index(index)) = &self.hints.index {
                    let exists = table
                        .conglomerates
                        .iter()
                        .any(|c| c.is_index() && &c.name == index);
                    if !exists {
                        return Err(OptimizerError::IndexNotFound {
                            table: table.table.name.clone(),
                            index: index.clone(),
                        });
                    }
                }
            }
            _ => {
                if let Some(index) = &self.hints.index {
                    let value = match index {
                        IndexHint::TableScan => "NULL".to_string(),
                        IndexHint::Index(name) => name.clone(),
                    };
                    return Err(OptimizerError::InvalidHint {
                        table: self.name.clone(),
                        key: INDEX_HINT.to_string(),
                        value,
                    });
                }
            }
        }
        if let Some(strategy) = self.hints.join_strategy {
            if !config.join_strategies.contains(strategy) {
                return Err(OptimizerError::InvalidJoinStrategy {
                    table: self.name.clone(),
                    strategy: strategy.to_string(),
                });
            }
        }
        self.strategies = config.join_strategies.iter().collect();
        self.refresh_candidates();
        Ok(())
    }

    /// Applies choices dictated by a plan override.
    pub(crate) fn force(
        &mut self,
        conglomerate: Option<ConglomerateDescriptor>,
        join_strategy: Option<JoinStrategyKind>,
    ) {
        self.forced = Forced {
            conglomerate,
            join_strategy,
        };
        self.refresh_candidates();
    }

    fn refresh_candidates(&mut self) {
        if let Some(strategy) = self.user_specified_join_strategy() {
            self.strategies = SmallVec::from_elem(strategy, 1);
        }
        self.candidates = match &self.kind {
            RowSourceKind::BaseTable(table) => table
                .conglomerates
                .iter()
                .enumerate()
                .filter(|(_, c)| match (&self.forced.conglomerate, &self.hints.index) {
                    (Some(forced), _) => forced.id == c.id,
                    (None, Some(IndexHint::TableScan)) => !c.is_index(),
                    (None, Some(IndexHint::Index(name))) => c.is_index() && &c.name == name,
                    (None, None) => true,
                })
                .map(|(i, _)| Some(i))
                .collect(),
            _ => SmallVec::from_elem(None, 1),
        };
    }

    /// Whether a leaf of a plan override names this row source.
    pub fn matches_plan_leaf(&self, leaf: &OptimizerPlan) -> bool {
        match (leaf, &self.kind) {
            (OptimizerPlan::Conglomerate(rs), RowSourceKind::BaseTable(table)) => rs
                .descriptor()
                .map(|c| c.table_id == table.table.id)
                .unwrap_or(false),
            (OptimizerPlan::TableFunction(rs), RowSourceKind::TableFunction(tf)) => rs
                .descriptor()
                .map(|a| a.id == tf.alias.id)
                .unwrap_or(false),
            (OptimizerPlan::DeadEnd(name), _) => name == &self.name,
            _ => false,
        }
    }

    /// Resets per-position state before the optimizable is tried at a join position.
    pub fn start_optimizing(&mut self) {
        self.cursor = None;
        self.consider_sort_avoidance = false;
        self.best_path.set_cost_estimate(None);
        self.best_sort_avoidance_path.set_cost_estimate(None);
        self.current_path = AccessPath::new();
        self.hash_key_columns.clear();
        self.memory_rows = 0.0;
    }

    fn current_conglomerate(&self) -> Option<&ConglomerateDescriptor> {
        match &self.kind {
            RowSourceKind::BaseTable(table) => self
                .cursor
                .and_then(|(c, _)| self.candidates.get(c).copied().flatten())
                .and_then(|i| table.conglomerates.get(i)),
            _ => None,
        }
    }

    /// Advances to the next untried (conglomerate, join strategy) pair, recording the ordering it
    /// produces in `row_ordering`. Returns false once candidates are exhausted.
    pub fn next_access_path(&mut self, row_ordering: &mut RowOrdering, tracer: &Tracer) -> bool {
        if self.strategies.is_empty() || self.candidates.is_empty() {
            return false;
        }
        let next = match self.cursor {
            None => (0, 0),
            Some((c, s)) if s + 1 < self.strategies.len() => (c, s + 1),
            Some((c, _)) => (c + 1, 0),
        };
        self.cursor = Some(next);
        if next.0 >= self.candidates.len() {
            if self.is_base_table() {
                tracer.emit(|t| t.trace_no_more_conglomerates(self.table_number));
            }
            self.current_path.set_join_strategy(None);
            return false;
        }

        let strategy = self.strategies[next.1];
        let conglomerate = self.current_conglomerate().cloned();
        if next.1 == 0 {
            if let Some(c) = &conglomerate {
                tracer.emit(|t| t.trace_considering_conglomerate(c, self.table_number));
            }
        }
        tracer.emit(|t| t.trace_considering_join_strategy(strategy, self.table_number));
        trace!(
            "table {} considering {} using {}",
            self.table_number,
            conglomerate.as_ref().map(|c| c.name.as_str()).unwrap_or(self.name.as_str()),
            strategy
        );

        self.current_path = AccessPath::new();
        self.current_path.set_conglomerate(conglomerate.clone());
        self.current_path.set_join_strategy(Some(strategy));
        self.hash_key_columns.clear();
        self.memory_rows = 0.0;

        row_ordering.remove_optimizable(self.table_number);
        match conglomerate.as_ref().and_then(|c| c.index.as_ref()) {
            Some(index) if self.is_one_row_access(&index.key_columns, index.unique) => {
                row_ordering.optimizable_always_ordered(self.table_number);
            }
            Some(index) if strategy == JoinStrategyKind::NestedLoop => {
                for (column, ascending) in index.key_columns.iter().zip(index.ascending.iter()) {
                    let direction = if *ascending {
                        SortDirection::Ascending
                    } else {
                        SortDirection::Descending
                    };
                    row_ordering.next_order_position(direction);
                    row_ordering
                        .add_ordered_column(direction, ColumnRef::new(self.table_number, *column));
                }
            }
            _ => row_ordering.add_unordered_optimizable(self.table_number),
        }
        for predicate in self.pushed.iter() {
            if let Some(column) = predicate.constant_equality_column(self.table_number) {
                row_ordering.column_always_ordered(ColumnRef::new(self.table_number, column));
            }
        }
        true
    }

    fn is_one_row_access(&self, key_columns: &[usize], unique: bool) -> bool {
        unique
            && key_columns.iter().all(|k| {
                self.pushed.iter().any(|p| {
                    matches!(
                        p.column_comparison(self.table_number),
                        Some((c, crate::predicate::CompareOp::Eq, _)) if c == *k
                    )
                })
            })
    }

    /// Rejects join strategies that cannot apply to the current candidate.
    pub fn feasible_join_strategy(&mut self, outer_cost: &CostEstimate, tracer: &Tracer) -> bool {
        let strategy = match self.current_path.join_strategy() {
            Some(s) => s,
            None => return false,
        };
        match strategy {
            JoinStrategyKind::NestedLoop => match &self.kind {
                RowSourceKind::TableFunction(tf) => {
                    tf.alias.costing.supports_multiple_instantiations
                        || outer_cost.row_count() <= 1.0
                }
                _ => true,
            },
            JoinStrategyKind::Hash => {
                if !self.is_materializable() {
                    tracer.emit(|t| t.trace_skip_unmaterializable_hash_join(self.table_number));
                    return false;
                }
                let mut keys: SmallVec<[usize; 4]> = SmallVec::new();
                for column in self
                    .pushed
                    .iter()
                    .filter_map(|p| p.equijoin_column(self.table_number))
                {
                    if !keys.contains(&column) {
                        keys.push(column);
                    }
                }
                if keys.is_empty() {
                    tracer.emit(|t| t.trace_skip_hash_join_no_hash_keys(self.table_number));
                    return false;
                }
                tracer.emit(|t| t.trace_hash_key_columns(self.table_number, &keys));
                self.hash_key_columns = keys;
                true
            }
        }
    }

    /// Costs the current candidate given the accumulated cost of the outer tables.
    pub fn optimize_it(
        &mut self,
        outer_cost: &CostEstimate,
        tracer: &Tracer,
    ) -> OptResult<CostEstimate> {
        let strategy = self
            .current_path
            .join_strategy()
            .unwrap_or(JoinStrategyKind::NestedLoop);
        let table_number = self.table_number;
        let single_table = TableSet::single(table_number);
        let scan = match &mut self.kind {
            RowSourceKind::BaseTable(table) => {
                let conglomerate = match self
                    .cursor
                    .and_then(|(c, _)| self.candidates.get(c).copied().flatten())
                    .and_then(|i| table.conglomerates.get(i))
                {
                    Some(c) => c,
                    None => return Ok(CostEstimate::max()),
                };
                let covering = table.is_covering(conglomerate);
                let probe = scan::estimate_scan(
                    table_number,
                    conglomerate,
                    self.pushed.iter(),
                    &table.statistics,
                    covering,
                );
                let build = scan::estimate_scan(
                    table_number,
                    conglomerate,
                    self.pushed
                        .iter()
                        .filter(|p| p.referenced_tables().is_subset(&single_table)),
                    &table.statistics,
                    covering,
                );
                self.current_path
                    .set_covering_index(covering && conglomerate.is_index());
                self.current_path
                    .set_non_matching_index_scan(conglomerate.is_index() && !probe.matching);
                tracer.emit(|t| {
                    t.trace_cost_of_conglomerate_scan(
                        table_number,
                        conglomerate,
                        &probe.selectivity,
                        &CostEstimate::new(probe.cost, probe.rows, probe.rows),
                    )
                });
                ScanCost {
                    probe_cost: probe.cost,
                    probe_rows: probe.rows,
                    build_cost: build.cost,
                    build_rows: build.rows,
                }
            }
            RowSourceKind::TableFunction(tf) => {
                let costing = tf.alias.costing;
                let statistics = Statistics::new(costing.estimated_row_count, DEFAULT_ROW_WIDTH);
                ScanCost {
                    probe_cost: costing.estimated_cost,
                    probe_rows: costing.estimated_row_count
                        * selectivity(&self.pushed, table_number, &statistics, None),
                    build_cost: costing.estimated_cost,
                    build_rows: costing.estimated_row_count
                        * selectivity(&self.pushed, table_number, &statistics, Some(&single_table)),
                }
            }
            RowSourceKind::Subquery(sq) => {
                let outer_rows = outer_cost.row_count().max(1.0);
                let inner_cost = sq.inner.optimize_for_outer_rows(outer_rows)?;
                let rows = inner_cost.row_count() / outer_rows;
                let cost = inner_cost.cost() / outer_rows;
                let statistics = Statistics::new(rows, DEFAULT_ROW_WIDTH);
                ScanCost {
                    probe_cost: cost,
                    probe_rows: rows * selectivity(&self.pushed, table_number, &statistics, None),
                    build_cost: cost,
                    build_rows: rows
                        * selectivity(&self.pushed, table_number, &statistics, Some(&single_table)),
                }
            }
        };
        let estimate = strategy.estimate_cost(&scan, outer_cost);
        self.memory_rows = if strategy.materializes_inner() {
            scan.build_rows
        } else {
            scan.probe_rows
        };
        tracer.emit(|t| t.trace_cost_of_n_scans(table_number, outer_cost.row_count(), &estimate));
        self.current_path.set_cost_estimate(Some(estimate));
        Ok(estimate)
    }

    /// Rows the last costed candidate keeps in memory: the whole build side for a strategy
    /// that materializes the inner source, else one probe.
    pub fn current_memory_rows(&self) -> f64 {
        self.memory_rows
    }

    /// Estimated bytes one buffered row takes.
    pub fn per_row_usage(&self) -> f64 {
        match &self.kind {
            RowSourceKind::BaseTable(table) => table.per_row_usage(),
            _ => DEFAULT_ROW_WIDTH,
        }
    }

    /// Whether the current strategy can hold `row_count` rows within `max_memory_per_table`
    /// bytes. A user-specified join strategy is always accepted.
    pub fn memory_usage_ok(&self, row_count: f64, max_memory_per_table: usize) -> bool {
        if self.user_specified_join_strategy().is_some() {
            return true;
        }
        let strategy = self
            .current_path
            .join_strategy()
            .unwrap_or(JoinStrategyKind::NestedLoop);
        let rows = if row_count >= usize::MAX as f64 {
            usize::MAX
        } else {
            row_count.max(0.0).ceil() as usize
        };
        rows <= strategy.max_capacity(
            self.hints.hash_max_capacity,
            max_memory_per_table,
            self.per_row_usage(),
        )
    }

    /// Makes the current candidate the best (or best sort-avoiding) path at this position.
    pub fn remember_current_as(&mut self, plan_type: PlanType) {
        let path = self.current_path.clone();
        match plan_type {
            PlanType::Normal => self.best_path = path,
            PlanType::SortAvoidance => {
                self.best_sort_avoidance_path = path;
                self.consider_sort_avoidance = true;
            }
        }
        if let RowSourceKind::Subquery(sq) = &mut self.kind {
            let key = sq.key(plan_type);
            sq.inner.update_best_plan_maps(PlanAction::Add, key);
        }
    }

    /// Commits the best path of `plan_type` as truly the best, because the join order it belongs
    /// to became the best one of the optimizer identified by `context`.
    pub fn remember_as_best(&mut self, plan_type: PlanType, context: ContextId, tracer: &Tracer) {
        self.truly_the_best = match plan_type {
            PlanType::Normal => self.best_path.clone(),
            PlanType::SortAvoidance => self.best_sort_avoidance_path.clone(),
        };
        self.truly_the_best_plan_type = Some(plan_type);
        if let RowSourceKind::Subquery(sq) = &mut self.kind {
            let key = sq.key(plan_type);
            sq.inner.update_best_plan_maps(PlanAction::Load, key);
            sq.inner.update_best_plan_maps(PlanAction::Add, context);
        }
        tracer.emit(|t| {
            t.trace_remembering_best_access_path(&self.truly_the_best, self.table_number, plan_type)
        });
    }

    /// Saves, restores or forgets the truly-the-best path under `context`, recursing into a
    /// subquery's own optimizer.
    pub fn update_best_plan_map(&mut self, action: PlanAction, context: ContextId) {
        match action {
            PlanAction::Add => self.memo.insert(
                context,
                MemoEntry {
                    access_path: self.truly_the_best.clone(),
                    plan_type: self.truly_the_best_plan_type,
                },
            ),
            PlanAction::Load => {
                if let Some(entry) = self.memo.get(context) {
                    self.truly_the_best = entry.access_path.clone();
                    self.truly_the_best_plan_type = entry.plan_type;
                }
            }
            PlanAction::Remove => {
                self.memo.remove(context);
            }
        }
        if let RowSourceKind::Subquery(sq) = &mut self.kind {
            sq.inner.update_best_plan_maps(action, context);
        }
    }

    pub fn push_opt_predicate(&mut self, predicate: Predicate) {
        self.pushed.push(predicate);
    }

    /// Returns every pushed predicate to `predicates`.
    pub fn pull_opt_predicates(&mut self, predicates: &mut PredicateList) {
        self.pushed.drain_into(predicates);
    }

    /// The leaf naming this row source in a plan override.
    pub fn plan_leaf(&self, path: &AccessPath) -> OptimizerPlan {
        match &self.kind {
            RowSourceKind::BaseTable(table) => match path.conglomerate() {
                Some(c) => OptimizerPlan::Conglomerate(RowSource::bound(
                    table.schema.clone(),
                    &c.name,
                    c.clone(),
                )),
                None => OptimizerPlan::conglomerate(
                    Some(table.schema.name.as_str()),
                    &table.table.name,
                ),
            },
            RowSourceKind::TableFunction(tf) => OptimizerPlan::TableFunction(RowSource::bound(
                tf.schema.clone(),
                &tf.alias.name,
                tf.alias.clone(),
            )),
            RowSourceKind::Subquery(_) => OptimizerPlan::dead_end(self.name.clone()),
        }
    }

    /// Builds the row source node for the truly-the-best path once the join order is final and
    /// the predicates of this position are pushed. Hash keys are the equijoin columns among them.
    pub fn modify_access_path(&mut self, context: ContextId) -> OptResult<AccessNode> {
        let strategy = self
            .truly_the_best
            .join_strategy()
            .unwrap_or(JoinStrategyKind::NestedLoop);
        let node = match &mut self.kind {
            RowSourceKind::BaseTable(table) => {
                let conglomerate = self.truly_the_best.conglomerate().cloned().ok_or_else(|| {
                    OptimizerError::OverrideMismatch(format!(
                        "table {} has no chosen conglomerate",
                        table.table.name
                    ))
                })?;
                if !conglomerate.is_index() {
                    AccessNode::TableScan { heap: conglomerate }
                } else if self.truly_the_best.is_covering_index() {
                    AccessNode::IndexScan { index: conglomerate }
                } else {
                    AccessNode::IndexToBaseRow { index: conglomerate }
                }
            }
            RowSourceKind::TableFunction(tf) => AccessNode::TableFunctionScan {
                alias: tf.alias.clone(),
            },
            RowSourceKind::Subquery(sq) => {
                sq.inner.update_best_plan_maps(PlanAction::Load, context);
                AccessNode::Subquery {
                    plan: Box::new(sq.inner.modify_access_paths()?),
                }
            }
        };
        if !strategy.materializes_inner() {
            return Ok(node);
        }
        let mut key_columns: SmallVec<[usize; 4]> = SmallVec::new();
        for predicate in self.pushed.iter() {
            if let Some(column) = predicate.equijoin_column(self.table_number) {
                if !key_columns.contains(&column) {
                    key_columns.push(column);
                }
            }
        }
        Ok(AccessNode::HashScan {
            source: Box::new(node),
            key_columns,
            initial_capacity: self.hints.hash_initial_capacity,
            load_factor: self.hints.hash_load_factor,
            max_capacity: self.hints.hash_max_capacity,
        })
    }
}

/// Combined selectivity of the pushed predicates, optionally only those referencing tables in
/// `within`.
fn selectivity(
    predicates: &PredicateList,
    table_number: usize,
    statistics: &Statistics,
    within: Option<&TableSet>,
) -> f64 {
    predicates
        .iter()
        .filter(|p| within.map(|w| p.referenced_tables().is_subset(w)).unwrap_or(true))
        .map(|p| p.selectivity(table_number, statistics))
        .product()
}

impl Display for Optimizable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.table_number)
    }
}

use std::io;
use std::time::Duration;

use itertools::Itertools;
use prettytable::{format, Table};

use crate::catalog::ConglomerateDescriptor;
use crate::cost::CostEstimate;
use crate::operator::{AccessPath, JoinStrategyKind};
use crate::optimizable::{PlanType, ScanSelectivity};
use crate::optimizer::ContextId;
use crate::plan::OptimizerPlan;
use crate::predicate::TableSet;
use crate::trace::OptTrace;

/// One remembered best join order.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanSummary {
    pub context: ContextId,
    pub plan: String,
    pub plan_type: PlanType,
    pub cost: CostEstimate,
}

/// Records the search as indented text, one line per notification, and keeps a summary of every
/// best join order remembered.
#[derive(Debug, Default)]
pub struct TextOptTrace {
    lines: Vec<String>,
    depth: usize,
    summaries: Vec<PlanSummary>,
}

fn render_order(join_order: &[Option<usize>]) -> String {
    join_order
        .iter()
        .map(|t| t.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()))
        .join(" ")
}

impl TextOptTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn summaries(&self) -> &[PlanSummary] {
        &self.summaries
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    fn record(&mut self, line: String) {
        self.lines
            .push(format!("{}{}", "  ".repeat(self.depth), line));
    }
}

impl OptTrace for TextOptTrace {
    fn trace_start_query_block(&mut self, context: ContextId, num_optimizables: usize) {
        self.record(format!(
            "start query block {} with {} optimizables",
            context, num_optimizables
        ));
        self.depth += 1;
    }

    fn trace_end_query_block(&mut self, context: ContextId) {
        self.depth = self.depth.saturating_sub(1);
        self.record(format!("end query block {}", context));
    }

    fn trace_timeout(&mut self, elapsed: Duration, best_cost: &CostEstimate) {
        self.record(format!(
            "optimization time exceeded after {}ms, best cost {}",
            elapsed.as_millis(),
            best_cost
        ));
    }

    fn trace_vacuous(&mut self) {
        self.record("no tables to optimize".to_string());
    }

    fn trace_complete_join_order(&mut self, join_order: &[Option<usize>]) {
        self.record(format!("complete join order: {}", render_order(join_order)));
    }

    fn trace_sort_cost(&mut self, sort_cost: &CostEstimate, current_cost: &CostEstimate) {
        self.record(format!(
            "cost of sorting {}, total cost with sorting {}",
            sort_cost, current_cost
        ));
    }

    fn trace_no_best_plan(&mut self, context: ContextId) {
        self.record(format!("no best plan found for query block {}", context));
    }

    fn trace_modifying_access_paths(&mut self, context: ContextId) {
        self.record(format!("modifying access paths of query block {}", context));
    }

    fn trace_short_circuiting(
        &mut self,
        time_exceeded: bool,
        table_number: usize,
        join_position: usize,
    ) {
        let reason = if time_exceeded {
            "time exceeded"
        } else {
            "cost exceeded"
        };
        self.record(format!(
            "short circuiting at table {} in position {} ({})",
            table_number, join_position, reason
        ));
    }

    fn trace_skipping_join_order(
        &mut self,
        next_optimizable: usize,
        join_position: usize,
        join_order: &[Option<usize>],
        assigned: &TableSet,
    ) {
        self.record(format!(
            "skipping optimizable {} at position {}: illegal in {} with tables {}",
            next_optimizable,
            join_position,
            render_order(join_order),
            assigned
        ));
    }

    fn trace_illegal_user_join_order(&mut self) {
        self.record("user specified join order is not legal".to_string());
    }

    fn trace_user_join_order_optimized(&mut self) {
        self.record("user specified join order has been optimized".to_string());
    }

    fn trace_join_order_consideration(
        &mut self,
        join_position: usize,
        join_order: &[Option<usize>],
        assigned: &TableSet,
    ) {
        self.record(format!(
            "considering join order {} at position {}, assigned tables {}",
            render_order(join_order),
            join_position,
            assigned
        ));
    }

    fn trace_cost_without_sort_avoidance(&mut self, cost: &CostEstimate) {
        self.record(format!("total cost of non sort avoidance plan {}", cost));
    }

    fn trace_cost_with_sort_avoidance(&mut self, cost: &CostEstimate) {
        self.record(format!("total cost of sort avoidance plan {}", cost));
    }

    fn trace_current_plan_avoids_sort(
        &mut self,
        best_cost: &CostEstimate,
        sort_avoidance_cost: &CostEstimate,
    ) {
        self.record(format!(
            "current plan avoids sort: {} against best {}",
            sort_avoidance_cost, best_cost
        ));
    }

    fn trace_cheapest_plan_so_far(&mut self, plan_type: PlanType, cost: &CostEstimate) {
        self.record(format!("cheapest {} plan so far {}", plan_type, cost));
    }

    fn trace_sort_needed_for_ordering(&mut self, plan_type: PlanType, sort_needed: bool) {
        self.record(format!(
            "{} plan {}",
            plan_type,
            if sort_needed {
                "needs a sort"
            } else {
                "avoids the sort"
            }
        ));
    }

    fn trace_remembering_best_join_order(
        &mut self,
        context: ContextId,
        join_order: &[usize],
        plan: &OptimizerPlan,
        plan_type: PlanType,
        cost: &CostEstimate,
    ) {
        self.record(format!(
            "remembering join order [{}] as best: {}",
            join_order.iter().join(" "),
            plan
        ));
        self.summaries.push(PlanSummary {
            context,
            plan: plan.to_string(),
            plan_type,
            cost: *cost,
        });
    }

    fn trace_skipping_because_too_much_memory(
        &mut self,
        table_number: usize,
        row_count: f64,
        max_memory_per_table: usize,
    ) {
        self.record(format!(
            "skipping access path for table {}: {:.1} rows exceed memory per table {}",
            table_number, row_count, max_memory_per_table
        ));
    }

    fn trace_skip_unmaterializable_hash_join(&mut self, table_number: usize) {
        self.record(format!(
            "skipping hash join for table {}: not materializable",
            table_number
        ));
    }

    fn trace_skip_hash_join_no_hash_keys(&mut self, table_number: usize) {
        self.record(format!("skipping hash join for table {}: no hash keys", table_number));
    }

    fn trace_hash_key_columns(&mut self, table_number: usize, columns: &[usize]) {
        self.record(format!(
            "hash key columns of table {}: [{}]",
            table_number,
            columns.iter().join(", ")
        ));
    }

    fn trace_considering_join_strategy(&mut self, strategy: JoinStrategyKind, table_number: usize) {
        self.record(format!(
            "considering join strategy {} for table {}",
            strategy, table_number
        ));
    }

    fn trace_considering_conglomerate(
        &mut self,
        conglomerate: &ConglomerateDescriptor,
        table_number: usize,
    ) {
        self.record(format!(
            "considering {} {} for table {}",
            if conglomerate.is_index() { "index" } else { "heap" },
            conglomerate.name,
            table_number
        ));
    }

    fn trace_no_more_conglomerates(&mut self, table_number: usize) {
        self.record(format!("no more conglomerates for table {}", table_number));
    }

    fn trace_cost_of_conglomerate_scan(
        &mut self,
        table_number: usize,
        conglomerate: &ConglomerateDescriptor,
        selectivity: &ScanSelectivity,
        cost: &CostEstimate,
    ) {
        self.record(format!(
            "cost of scanning {} for table {}: {} (start/stop {:.4}, qual {:.4}, non-qual {:.4}{})",
            conglomerate.name,
            table_number,
            cost,
            selectivity.start_stop,
            selectivity.qualifier,
            selectivity.non_qualifier,
            if selectivity.one_row { ", one row" } else { "" }
        ));
    }

    fn trace_cost_of_n_scans(&mut self, table_number: usize, outer_rows: f64, cost: &CostEstimate) {
        self.record(format!(
            "cost of {:.1} scans of table {}: {}",
            outer_rows, table_number, cost
        ));
    }

    fn trace_remembering_best_access_path(
        &mut self,
        access_path: &AccessPath,
        table_number: usize,
        plan_type: PlanType,
    ) {
        self.record(format!(
            "remembering {} access path for table {}: {}",
            plan_type, table_number, access_path
        ));
    }

    fn print_to_writer(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(out, "{}", line)?;
        }
        if self.summaries.is_empty() {
            return Ok(());
        }
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(row!["query block", "plan", "type", "cost", "rows"]);
        for summary in &self.summaries {
            table.add_row(row![
                summary.context,
                summary.plan,
                summary.plan_type,
                format!("{:.4}", summary.cost.cost()),
                format!("{:.1}", summary.cost.row_count())
            ]);
        }
        write!(out, "{}", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indents_nested_blocks() {
        let mut trace = TextOptTrace::new();
        trace.trace_start_query_block(ContextId(0), 2);
        trace.trace_start_query_block(ContextId(1), 1);
        trace.trace_vacuous();
        trace.trace_end_query_block(ContextId(1));
        trace.trace_end_query_block(ContextId(0));

        assert_eq!(trace.lines()[2], "    no tables to optimize");
        assert_eq!(trace.lines()[4], "end query block 0");
    }

    #[test]
    fn test_summary_table() {
        let mut trace = TextOptTrace::new();
        let plan = OptimizerPlan::join(
            JoinStrategyKind::Hash,
            OptimizerPlan::conglomerate(Some("S"), "A"),
            OptimizerPlan::conglomerate(Some("S"), "B"),
        );
        trace.trace_remembering_best_join_order(
            ContextId(3),
            &[0, 1],
            &plan,
            PlanType::Normal,
            &CostEstimate::new(12.5, 40.0, 4.0),
        );

        let mut out = Vec::new();
        trace.print_to_writer(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("remembering join order [0 1] as best: (S.A # S.B)"));
        assert!(text.contains("12.5000"));
        assert_eq!(trace.summaries().len(), 1);
    }
}

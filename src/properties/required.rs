use crate::cost::{CostEstimate, SORT_COMPARE_COST};
use crate::predicate::{ColumnRef, TableSet};
use crate::properties::{RowOrdering, SortDirection};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortRequirement {
    NothingRequired,
    SortRequired,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OrderByColumn {
    pub column: ColumnRef,
    pub direction: SortDirection,
}

impl OrderByColumn {
    pub fn asc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: ColumnRef) -> Self {
        Self {
            column,
            direction: SortDirection::Descending,
        }
    }
}

/// An ordering the query result must have, e.g. from `ORDER BY`.
#[derive(Clone, Debug, PartialEq)]
pub struct RequiredRowOrdering {
    columns: Vec<OrderByColumn>,
    sort_needed: bool,
}

impl RequiredRowOrdering {
    pub fn new(columns: Vec<OrderByColumn>) -> Self {
        Self {
            columns,
            sort_needed: true,
        }
    }

    pub fn columns(&self) -> &[OrderByColumn] {
        &self.columns
    }

    /// Whether `ordering` already produces the required order.
    ///
    /// With `placed`, only a partial join order has been built: columns of tables not yet placed
    /// may still be ordered by later positions, unless a placed table's column follows them.
    pub fn sort_required(
        &self,
        ordering: &RowOrdering,
        placed: Option<&TableSet>,
    ) -> SortRequirement {
        let mut position = 0;
        for (i, required) in self.columns.iter().enumerate() {
            let column = required.column;
            if let Some(placed) = placed {
                if !placed.contains(column.table) {
                    let placed_later = self.columns[i + 1..]
                        .iter()
                        .any(|later| placed.contains(later.column.table));
                    return if placed_later {
                        SortRequirement::SortRequired
                    } else {
                        SortRequirement::NothingRequired
                    };
                }
            }

            if ordering.is_always_ordered(column.table) || ordering.is_column_always_ordered(column)
            {
                continue;
            }

            while position < ordering.num_positions()
                && ordering.position_is_constant(position)
                && !ordering.ordered_on_column(required.direction, position, column)
            {
                position += 1;
            }
            if !ordering.ordered_on_column(required.direction, position, column) {
                return SortRequirement::SortRequired;
            }
            position += 1;
        }
        SortRequirement::NothingRequired
    }

    /// Cost of sorting `row_count` rows.
    pub fn estimate_cost(&self, row_count: f64) -> CostEstimate {
        let rows = row_count.max(0.0);
        let comparisons = if rows > 1.0 { rows * rows.log2() } else { 0.0 };
        CostEstimate::new(comparisons * SORT_COMPARE_COST, rows, rows)
    }

    pub fn sort_needed(&mut self) {
        self.sort_needed = true;
    }

    pub fn sort_not_needed(&mut self) {
        self.sort_needed = false;
    }

    pub fn is_sort_needed(&self) -> bool {
        self.sort_needed
    }
}

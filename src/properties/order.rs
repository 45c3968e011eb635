use smallvec::SmallVec;

use crate::predicate::{ColumnRef, TableSet};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Columns that are all sorted at one position of the ordering (equal by some join predicate or
/// read in lockstep from one index key).
#[derive(Clone, Debug, PartialEq)]
struct ColumnOrdering {
    direction: SortDirection,
    columns: SmallVec<[ColumnRef; 2]>,
}

impl ColumnOrdering {
    fn ordered(&self, direction: SortDirection, column: ColumnRef) -> bool {
        self.direction == direction && self.columns.contains(&column)
    }
}

/// Orderings established by the join order built so far.
///
/// Access paths append to it left to right, one join position at a time. The search clones it to
/// save the state of a join position and removes an optimizable's contributions when that
/// optimizable is pulled out of the join order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowOrdering {
    ordering: Vec<ColumnOrdering>,
    always_ordered_columns: Vec<ColumnRef>,
    always_ordered_optimizables: TableSet,
    unordered_optimizables: TableSet,
}

impl RowOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new order position. Nothing is appended once an unordered optimizable is placed.
    pub fn next_order_position(&mut self, direction: SortDirection) {
        if self.has_unordered_optimizable() {
            return;
        }
        self.ordering.push(ColumnOrdering {
            direction,
            columns: SmallVec::new(),
        });
    }

    /// Adds a column to the current order position.
    pub fn add_ordered_column(&mut self, direction: SortDirection, column: ColumnRef) {
        if self.has_unordered_optimizable() {
            return;
        }
        match self.ordering.last_mut() {
            Some(last) if last.direction == direction => last.columns.push(column),
            _ => {
                self.next_order_position(direction);
                if let Some(last) = self.ordering.last_mut() {
                    last.columns.push(column);
                }
            }
        }
    }

    /// Marks a column as having one value in every row (equality with a constant).
    pub fn column_always_ordered(&mut self, column: ColumnRef) {
        if !self.always_ordered_columns.contains(&column) {
            self.always_ordered_columns.push(column);
        }
    }

    /// Marks an optimizable as returning at most one row.
    pub fn optimizable_always_ordered(&mut self, table: usize) {
        self.unordered_optimizables.remove(table);
        self.always_ordered_optimizables.insert(table);
    }

    /// Marks an optimizable whose rows come in no useful order.
    pub fn add_unordered_optimizable(&mut self, table: usize) {
        self.unordered_optimizables.insert(table);
    }

    /// Forgets everything `table` contributed.
    pub fn remove_optimizable(&mut self, table: usize) {
        for position in self.ordering.iter_mut() {
            position.columns.retain(|c| c.table != table);
        }
        self.ordering.retain(|p| !p.columns.is_empty());
        self.always_ordered_columns.retain(|c| c.table != table);
        self.always_ordered_optimizables.remove(table);
        self.unordered_optimizables.remove(table);
    }

    pub fn is_always_ordered(&self, table: usize) -> bool {
        self.always_ordered_optimizables.contains(table)
    }

    pub fn is_column_always_ordered(&self, column: ColumnRef) -> bool {
        self.always_ordered_columns.contains(&column)
    }

    fn has_unordered_optimizable(&self) -> bool {
        !self
            .unordered_optimizables
            .difference(&self.always_ordered_optimizables)
            .is_empty()
    }

    pub fn num_positions(&self) -> usize {
        self.ordering.len()
    }

    /// Whether rows are ordered on `column` at `position` of the ordering.
    pub fn ordered_on_column(
        &self,
        direction: SortDirection,
        position: usize,
        column: ColumnRef,
    ) -> bool {
        if self.is_always_ordered(column.table) || self.is_column_always_ordered(column) {
            return true;
        }
        self.ordering
            .get(position)
            .map(|p| p.ordered(direction, column))
            .unwrap_or(false)
    }

    /// Whether the ordering position only holds columns that are constant anyway.
    pub(crate) fn position_is_constant(&self, position: usize) -> bool {
        self.ordering
            .get(position)
            .map(|p| {
                p.columns
                    .iter()
                    .all(|c| self.is_always_ordered(c.table) || self.is_column_always_ordered(*c))
            })
            .unwrap_or(false)
    }
}

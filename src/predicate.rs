//! Predicates and the pools that own them.
//!
//! A predicate is owned by exactly one [`PredicateList`]: either the optimizer's unassigned pool
//! or the pushed-down list of one optimizable. Moving a predicate between lists is a move, so it
//! can never be in two places at once.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::error::{OptResult, OptimizerError};
use crate::stat::{Statistics, NOT_EQUAL_SELECTIVITY, RANGE_SELECTIVITY};

/// Table numbers are assigned per query and must fit this bitmap.
pub const MAX_TABLES: usize = 64;

/// Selectivity of a predicate the optimizer cannot analyze.
pub const OPAQUE_SELECTIVITY: f64 = 0.5;

/// A set of table numbers.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct TableSet(u64);

impl TableSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn single(table: usize) -> Self {
        let mut set = Self::new();
        set.insert(table);
        set
    }

    pub fn check_capacity(num_tables: usize) -> OptResult<()> {
        if num_tables > MAX_TABLES {
            return Err(OptimizerError::TooManyTables(num_tables));
        }
        Ok(())
    }

    /// Adds `table`, returning false and leaving the set unchanged if it does not fit.
    pub fn insert(&mut self, table: usize) -> bool {
        if table >= MAX_TABLES {
            return false;
        }
        self.0 |= 1 << table;
        true
    }

    pub fn remove(&mut self, table: usize) {
        if table < MAX_TABLES {
            self.0 &= !(1 << table);
        }
    }

    pub fn contains(&self, table: usize) -> bool {
        table < MAX_TABLES && self.0 & (1 << table) != 0
    }

    pub fn union(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 | other.0)
    }

    pub fn intersection(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 & other.0)
    }

    pub fn difference(&self, other: &TableSet) -> TableSet {
        TableSet(self.0 & !other.0)
    }

    pub fn is_subset(&self, other: &TableSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_TABLES).filter(move |t| self.contains(*t))
    }
}

impl FromIterator<usize> for TableSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = TableSet::new();
        for t in iter {
            set.insert(t);
        }
        set
    }
}

impl Display for TableSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.iter().join(", "))
    }
}

/// A column of the table with the given table number.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ColumnRef {
    pub table: usize,
    pub column: usize,
}

impl ColumnRef {
    pub fn new(table: usize, column: usize) -> Self {
        Self { table, column }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn is_range(&self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::LtEq | CompareOp::Gt | CompareOp::GtEq)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    /// A constant or a parameter: fixed for the duration of one scan.
    Constant,
}

#[derive(Clone, Debug, PartialEq)]
enum PredicateKind {
    Compare {
        left: ColumnRef,
        op: CompareOp,
        right: Operand,
    },
    Opaque,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    id: usize,
    kind: PredicateKind,
    referenced: TableSet,
    has_subquery: bool,
}

impl Predicate {
    pub fn compare(id: usize, left: ColumnRef, op: CompareOp, right: Operand) -> Self {
        let mut referenced = TableSet::single(left.table);
        if let Operand::Column(c) = right {
            referenced.insert(c.table);
        }
        Self {
            id,
            kind: PredicateKind::Compare { left, op, right },
            referenced,
            has_subquery: false,
        }
    }

    pub fn equijoin(id: usize, left: ColumnRef, right: ColumnRef) -> Self {
        Self::compare(id, left, CompareOp::Eq, Operand::Column(right))
    }

    pub fn constant(id: usize, column: ColumnRef, op: CompareOp) -> Self {
        Self::compare(id, column, op, Operand::Constant)
    }

    /// A predicate the optimizer cannot use for index positioning.
    pub fn opaque(id: usize, referenced: TableSet, has_subquery: bool) -> Self {
        Self {
            id,
            kind: PredicateKind::Opaque,
            referenced,
            has_subquery,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn referenced_tables(&self) -> TableSet {
        self.referenced
    }

    pub fn has_subquery(&self) -> bool {
        self.has_subquery
    }

    /// Largest table number the predicate mentions, including numbers a [`TableSet`] cannot hold.
    pub fn highest_table_number(&self) -> Option<usize> {
        match &self.kind {
            PredicateKind::Compare { left, right, .. } => match right {
                Operand::Column(r) => Some(left.table.max(r.table)),
                Operand::Constant => Some(left.table),
            },
            PredicateKind::Opaque => self.referenced.iter().max(),
        }
    }

    /// The comparison seen from `table`: its column, the operator oriented so that the column is
    /// on the left, and the other side.
    pub fn column_comparison(&self, table: usize) -> Option<(usize, CompareOp, Operand)> {
        let (left, op, right) = match &self.kind {
            PredicateKind::Compare { left, op, right } => (*left, *op, *right),
            PredicateKind::Opaque => return None,
        };
        match right {
            Operand::Column(r) if left.table == r.table => None,
            _ if left.table == table => Some((left.column, op, right)),
            Operand::Column(r) if r.table == table => {
                Some((r.column, flip(op), Operand::Column(left)))
            }
            _ => None,
        }
    }

    /// Column of `table` compared for equality with a column of another table.
    pub fn equijoin_column(&self, table: usize) -> Option<usize> {
        match self.column_comparison(table) {
            Some((column, CompareOp::Eq, Operand::Column(_))) => Some(column),
            _ => None,
        }
    }

    /// Column of `table` compared for equality with a constant.
    pub fn constant_equality_column(&self, table: usize) -> Option<usize> {
        match self.column_comparison(table) {
            Some((column, CompareOp::Eq, Operand::Constant)) => Some(column),
            _ => None,
        }
    }

    /// Independence-assumption selectivity of this predicate when restricting `table`.
    pub fn selectivity(&self, table: usize, statistics: &Statistics) -> f64 {
        match self.column_comparison(table) {
            Some((column, CompareOp::Eq, _)) => statistics.equality_selectivity(column),
            Some((_, CompareOp::NotEq, _)) => NOT_EQUAL_SELECTIVITY,
            Some((_, op, _)) if op.is_range() => RANGE_SELECTIVITY,
            _ => OPAQUE_SELECTIVITY,
        }
    }
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        other => other,
    }
}

/// An owning list of predicates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredicateList {
    predicates: Vec<Predicate>,
}

impl PredicateList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn remove(&mut self, index: usize) -> Predicate {
        self.predicates.remove(index)
    }

    pub fn get(&self, index: usize) -> &Predicate {
        &self.predicates[index]
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    /// Moves every predicate of `self` into `other`.
    pub fn drain_into(&mut self, other: &mut PredicateList) {
        other.predicates.append(&mut self.predicates);
    }
}

impl FromIterator<Predicate> for PredicateList {
    fn from_iter<T: IntoIterator<Item = Predicate>>(iter: T) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

//! Cost of one probe of a conglomerate.
//!
//! Pushed predicates are split three ways, under an independence assumption:
//!
//! * start/stop predicates: equality on a leading prefix of the index key, optionally followed by
//!   range predicates on the next key column. They limit the part of the index that is scanned.
//! * qualifiers: other comparisons on columns the conglomerate holds, evaluated on every scanned
//!   row.
//! * non-qualifiers: everything else, evaluated after the base row is fetched.
//!
//! A heap has no start/stop predicates. A unique index whose key is fully bound by equality
//! returns at most one row per probe.

use smallvec::SmallVec;

use crate::catalog::ConglomerateDescriptor;
use crate::cost::{BASE_ROW_FETCH_COST, QUALIFIER_COST, ROW_FETCH_COST, SCAN_OPEN_COST};
use crate::predicate::{CompareOp, Predicate};
use crate::stat::Statistics;

/// Selectivity factors applied to one conglomerate scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanSelectivity {
    pub start_stop: f64,
    pub qualifier: f64,
    pub non_qualifier: f64,
    pub one_row: bool,
}

impl Default for ScanSelectivity {
    fn default() -> Self {
        Self {
            start_stop: 1.0,
            qualifier: 1.0,
            non_qualifier: 1.0,
            one_row: false,
        }
    }
}

impl ScanSelectivity {
    pub fn combined(&self) -> f64 {
        self.start_stop * self.qualifier * self.non_qualifier
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ScanEstimate {
    pub cost: f64,
    pub rows: f64,
    pub selectivity: ScanSelectivity,
    /// Some start/stop predicate limits the scan.
    pub matching: bool,
}

enum Class {
    StartStop,
    Qualifier,
    NonQualifier,
}

pub(crate) fn estimate_scan<'a, I>(
    table_number: usize,
    conglomerate: &ConglomerateDescriptor,
    predicates: I,
    statistics: &Statistics,
    covering: bool,
) -> ScanEstimate
where
    I: IntoIterator<Item = &'a Predicate>,
{
    let predicates: Vec<&Predicate> = predicates.into_iter().collect();
    let mut classes: Vec<Class> = predicates.iter().map(|_| Class::NonQualifier).collect();
    let mut selectivity = ScanSelectivity::default();

    match &conglomerate.index {
        Some(index) => {
            let mut bound = 0;
            for key_column in index.key_columns.iter().copied() {
                let equality = predicates.iter().position(|p| {
                    matches!(
                        p.column_comparison(table_number),
                        Some((c, CompareOp::Eq, _)) if c == key_column
                    )
                });
                if let Some(i) = equality {
                    classes[i] = Class::StartStop;
                    selectivity.start_stop *= predicates[i].selectivity(table_number, statistics);
                    bound += 1;
                    continue;
                }
                for (i, p) in predicates.iter().enumerate() {
                    if let Some((c, op, _)) = p.column_comparison(table_number) {
                        if c == key_column && op.is_range() {
                            classes[i] = Class::StartStop;
                            selectivity.start_stop *= p.selectivity(table_number, statistics);
                        }
                    }
                }
                break;
            }
            selectivity.one_row = index.unique && bound == index.key_columns.len();
            for (i, p) in predicates.iter().enumerate() {
                if let (Class::NonQualifier, Some((c, _, _))) =
                    (&classes[i], p.column_comparison(table_number))
                {
                    if index.key_columns.contains(&c) {
                        classes[i] = Class::Qualifier;
                    }
                }
            }
        }
        None => {
            for (i, p) in predicates.iter().enumerate() {
                if p.column_comparison(table_number).is_some() {
                    classes[i] = Class::Qualifier;
                }
            }
        }
    }

    let mut qualifiers: SmallVec<[f64; 8]> = SmallVec::new();
    let mut non_qualifiers: SmallVec<[f64; 8]> = SmallVec::new();
    for (p, class) in predicates.iter().zip(classes.iter()) {
        match class {
            Class::StartStop => {}
            Class::Qualifier => qualifiers.push(p.selectivity(table_number, statistics)),
            Class::NonQualifier => non_qualifiers.push(p.selectivity(table_number, statistics)),
        }
    }
    selectivity.qualifier = qualifiers.iter().product();
    selectivity.non_qualifier = non_qualifiers.iter().product();

    let mut scanned = statistics.row_count() * selectivity.start_stop;
    if selectivity.one_row {
        scanned = scanned.min(1.0);
    }
    let qualified = scanned * selectivity.qualifier;
    let rows = qualified * selectivity.non_qualifier;

    let mut cost = SCAN_OPEN_COST
        + scanned * ROW_FETCH_COST
        + scanned * qualifiers.len() as f64 * QUALIFIER_COST
        + qualified * non_qualifiers.len() as f64 * QUALIFIER_COST;
    if conglomerate.is_index() && !covering {
        cost += qualified * BASE_ROW_FETCH_COST;
    }

    ScanEstimate {
        cost,
        rows,
        selectivity,
        matching: classes.iter().any(|c| matches!(c, Class::StartStop)),
    }
}

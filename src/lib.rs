//! ## Background
//!
//! The join order optimizer accepts the row sources of one query block (base tables, table
//! functions and subqueries), the predicates between them and an optional required ordering, and
//! chooses the order in which they are joined, the access path of each one (which conglomerate,
//! nested loop or hash join) and whether the result still needs a sort.
//!
//! Cost based join order selection goes back to [1]: enumerate join orders, cost each access path
//! given the rows produced by the tables before it, and keep the cheapest complete plan. Only left
//! deep join trees are considered, so a join order is a permutation of the row sources.
//!
//! ## Design
//!
//! ### Search
//!
//! The [`optimizer::Optimizer`] walks permutations depth first. A partial join order that is
//! already more expensive than the best complete one is abandoned, which keeps the search cheap
//! when a good order is found early. Queries with many tables first jump to the order of
//! ascending row counts and stop searching after a while (see [`optimizer::OptimizerConfig`]).
//!
//! ### Optimizables
//!
//! An [`optimizable::Optimizable`] is one row source in the join order. It enumerates its own
//! access paths, costs them against the outer rows and remembers its best path per plan type
//! (normal or sort avoiding) and per optimization context. A subquery row source owns a nested
//! optimizer, so it is reoptimized for every outer row count it is probed with.
//!
//! ### Overrides and tracing
//!
//! An [`plan::OptimizerPlan`] dictates a complete or partial join order together with
//! conglomerates and join strategies. Every search decision can be reported to an
//! [`trace::OptTrace`].
//!
//! ## Reference
//!
//! 1. Selinger, P. Griffiths, et al. "Access path selection in a relational database management
//! system." Readings in Artificial Intelligence and Databases. Morgan Kaufmann, 1989. 511-522.

#[macro_use]
extern crate prettytable;

pub mod catalog;
pub mod cost;
pub mod error;
pub mod operator;
pub mod optimizable;
pub mod optimizer;
pub mod plan;
pub mod predicate;
pub mod properties;
pub mod stat;
pub mod trace;

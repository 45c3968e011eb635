mod common;

use std::time::Duration;

use anyhow::anyhow;
use join_order_optimizer::catalog::{
    AliasDescriptor, Catalog, ConglomerateDescriptor, InMemoryCatalog, SchemaDescriptor,
    SessionContext, TableDescriptor, TableId,
};
use join_order_optimizer::cost::TieBreak;
use join_order_optimizer::error::{OptResult, OptimizerError};
use join_order_optimizer::operator::{AccessNode, JoinStrategyKind};
use join_order_optimizer::optimizable::{Optimizable, PlanAction, PlanType, RowSourceKind};
use join_order_optimizer::optimizer::{OptimizerConfig, OptimizerFactory};
use join_order_optimizer::plan::OptimizerPlan;
use join_order_optimizer::predicate::{ColumnRef, Predicate, PredicateList, TableSet};
use join_order_optimizer::properties::{OrderByColumn, RequiredRowOrdering};
use join_order_optimizer::stat::Statistics;
use join_order_optimizer::trace::OptTrace;

use common::*;

fn three_tables() -> Fixture {
    Fixture::new(&[("A", 10.0), ("B", 1000.0), ("C", 100_000.0)])
}

#[test]
fn test_three_table_join() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);

    let mut order = plan.join_order();
    assert_ne!(order[0], 2, "largest table should not drive the join: {}", plan);
    order.sort();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(plan.cost(), optimizer.best_cost());
    assert!(!plan.is_sort_needed());

    // every join predicate is evaluated exactly once
    let mut predicates: Vec<usize> = plan
        .entries()
        .iter()
        .flat_map(|e| e.predicates.iter().copied())
        .collect();
    predicates.sort();
    assert_eq!(predicates, vec![0, 1]);
    assert!(plan.entries()[0].predicates.is_empty());
}

#[test]
fn test_chosen_plan_as_override_reproduces_it() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    let text = plan.plan().unwrap().to_string();

    let mut forced = fixture.optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some(&text),
    );
    let forced_plan = optimize(&mut forced);
    assert_eq!(forced_plan.join_order(), plan.join_order());
    assert_eq!(forced_plan.plan().unwrap().to_string(), text);
    assert!((forced_plan.cost().cost() - plan.cost().cost()).abs() < 1e-6);
}

#[test]
fn test_override_prefix_and_strategy() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let mut optimizer = fixture.optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some("APP.C"),
    );
    let plan = optimize(&mut optimizer);
    assert_eq!(plan.join_order()[0], 2);

    let mut optimizer = fixture.optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some("APP.B # APP.A"),
    );
    let plan = optimize(&mut optimizer);
    assert_eq!(&plan.join_order()[..2], &[1, 0]);
    let a = plan.entry(0).unwrap();
    assert_eq!(a.access_path.join_strategy(), Some(JoinStrategyKind::Hash));
    match &a.node {
        AccessNode::HashScan { key_columns, .. } => assert_eq!(key_columns.as_slice(), &[0]),
        other => panic!("expected a hash scan, got {}", other),
    }
}

#[test]
fn test_override_errors() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let bushy = fixture.try_optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some("APP.A * (APP.B * APP.C)"),
    );
    assert!(matches!(bushy, Err(OptimizerError::NotLeftDeep(_))));

    let unknown = fixture.try_optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some("APP.A * APP.NOPE"),
    );
    assert!(matches!(unknown, Err(OptimizerError::RowSourceNotFound { .. })));

    let too_long = fixture.try_optimizer(
        &factory,
        fixture.optimizables(),
        chain_predicates(3),
        None,
        Some("APP.A * APP.B * APP.C * APP.A"),
    );
    assert!(matches!(too_long, Err(OptimizerError::OverrideMismatch(_))));
}

#[test]
fn test_forced_order_breaking_dependency() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let mut optimizables = fixture.optimizables();
    let b = optimizables.remove(1).with_dependencies(TableSet::single(0));
    optimizables.insert(1, b);

    let mut optimizer =
        fixture.optimizer(&factory, optimizables, chain_predicates(3), None, Some("APP.B"));
    assert!(matches!(
        optimizer.optimize(),
        Err(OptimizerError::IllegalForcedJoinOrder)
    ));
}

#[test]
fn test_dependencies_are_respected() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default());
    let mut optimizables = fixture.optimizables();
    // A may only follow C
    let a = optimizables.remove(0).with_dependencies(TableSet::single(2));
    optimizables.insert(0, a);
    let mut optimizer = fixture.optimizer(&factory, optimizables, chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    let order = plan.join_order();
    let position = |t: usize| order.iter().position(|x| *x == t).unwrap();
    assert!(position(2) < position(0), "{:?}", order);
}

#[test]
fn test_memory_limit_rules_out_hash_joins() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default().with_max_memory_per_table(0));
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    assert!(plan.entries().iter().all(|e| !e.node.is_hash_scan()));
    assert!(plan
        .entries()
        .iter()
        .all(|e| e.access_path.join_strategy() == Some(JoinStrategyKind::NestedLoop)));
}

#[test]
fn test_memory_limit_counts_whole_hash_build_side() {
    // 40 bytes per hashed row: at most 2000 rows fit, while each row of A matches 1000 of B.
    let fixture = Fixture::new(&[("A", 10.0), ("B", 10_000.0)]);
    let (text, sink) = text_trace();
    let factory =
        OptimizerFactory::new(OptimizerConfig::default().with_max_memory_per_table(80_000))
            .with_trace(sink);
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(2), None, None);
    let plan = optimize(&mut optimizer);
    assert!(!plan.entry(1).unwrap().node.is_hash_scan(), "{}", plan);
    assert!(text
        .borrow()
        .contains("skipping access path for table 1: 10000.0 rows exceed memory per table 80000"));
}

#[test]
fn test_user_hash_strategy_ignores_memory_limit() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default().with_max_memory_per_table(0));
    let mut optimizables = fixture.optimizables();
    let b = optimizables
        .remove(1)
        .with_hint("joinStrategy", "HASH")
        .with_hint("hashInitialCapacity", "64")
        .with_hint("hashLoadFactor", "0.75");
    optimizables.insert(1, b);
    let mut optimizer = fixture.optimizer(&factory, optimizables, chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    match &plan.entry(1).unwrap().node {
        AccessNode::HashScan {
            initial_capacity,
            load_factor,
            max_capacity,
            ..
        } => {
            assert_eq!(*initial_capacity, Some(64));
            assert_eq!(*load_factor, Some(0.75));
            assert_eq!(*max_capacity, None);
        }
        other => panic!("expected a hash scan, got {}", other),
    }
}

#[test]
fn test_index_avoids_sort() {
    init_logger();
    let mut catalog = InMemoryCatalog::new();
    let schema = catalog.add_schema(SCHEMA);
    let t = catalog.add_table(schema, "T", &[("K", 4.0), ("V", 16.0)]);
    catalog.add_index(t, "T_K", &[0], false);
    catalog.set_statistics(t, Statistics::new(10_000.0, 20.0));
    let optimizable = Optimizable::base_table(
        0,
        catalog.schema_descriptor(SCHEMA).unwrap().unwrap(),
        catalog.table_descriptor(t).unwrap().unwrap(),
    )
    .with_referenced_columns([0]);

    let required = RequiredRowOrdering::new(vec![OrderByColumn::asc(ColumnRef::new(0, 0))]);
    let mut optimizer = OptimizerFactory::default()
        .get_optimizer(
            vec![optimizable],
            PredicateList::new(),
            &catalog,
            Some(required),
            1,
            None,
            &SessionContext::default(),
        )
        .unwrap();
    let plan = optimize(&mut optimizer);

    assert!(!plan.is_sort_needed());
    let entry = &plan.entries()[0];
    assert_eq!(entry.plan_type, Some(PlanType::SortAvoidance));
    match &entry.node {
        AccessNode::IndexScan { index } => assert_eq!(index.name, "T_K"),
        other => panic!("expected a covering index scan, got {}", other),
    }
}

#[test]
fn test_sort_kept_without_usable_index() {
    let fixture = Fixture::new(&[("T", 10_000.0)]);
    let required = RequiredRowOrdering::new(vec![OrderByColumn::asc(ColumnRef::new(0, 1))]);
    let mut optimizer = fixture.optimizer(
        &OptimizerFactory::default(),
        fixture.optimizables(),
        PredicateList::new(),
        Some(required),
        None,
    );
    let plan = optimize(&mut optimizer);
    assert!(plan.is_sort_needed());
    assert_eq!(plan.entries()[0].plan_type, Some(PlanType::Normal));
    // scan plus sort
    assert!(plan.cost().cost() > 1001.0);
}

fn seven_tables() -> Fixture {
    Fixture::new(&[
        ("T0", 500.0),
        ("T1", 20.0),
        ("T2", 3000.0),
        ("T3", 70.0),
        ("T4", 10.0),
        ("T5", 900.0),
        ("T6", 200.0),
    ])
}

#[test]
fn test_time_budget_keeps_first_plan() {
    let fixture = seven_tables();
    let factory = factory(OptimizerConfig::default().with_time_budget(Duration::ZERO));
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(7), None, None);
    let plan = optimize(&mut optimizer);
    assert!(optimizer.is_time_exceeded());
    assert_eq!(plan.entries().len(), 7);
    assert!(!plan.cost().is_max());
}

#[test]
fn test_jump_search_finds_exhaustive_optimum() {
    let fixture = seven_tables();
    let exhaustive = factory(OptimizerConfig {
        jump_threshold: 100,
        ..OptimizerConfig::default().with_no_timeout(true)
    });
    let jumping = factory(OptimizerConfig::default().with_no_timeout(true));

    let predicates = chain_predicates(7);
    let mut a =
        fixture.optimizer(&exhaustive, fixture.optimizables(), predicates.clone(), None, None);
    let mut b = fixture.optimizer(&jumping, fixture.optimizables(), predicates, None, None);
    let a = optimize(&mut a);
    let b = optimize(&mut b);
    let (a, b) = (a.cost().cost(), b.cost().cost());
    assert!((a - b).abs() <= 1e-6 * a.max(1.0), "{} vs {}", a, b);
}

#[test]
fn test_fixed_join_order_is_list_order() {
    let fixture = three_tables();
    let factory = factory(OptimizerConfig::default().with_join_order_optimization(false));
    let mut optimizables = fixture.optimizables();
    optimizables.reverse();
    let mut optimizer = fixture.optimizer(&factory, optimizables, chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    assert_eq!(plan.join_order(), vec![2, 1, 0]);
}

/// Delegates to an in-memory catalog but fails every statistics lookup.
struct BrokenStatistics(InMemoryCatalog);

impl Catalog for BrokenStatistics {
    fn schema_descriptor(&self, name: &str) -> OptResult<Option<SchemaDescriptor>> {
        self.0.schema_descriptor(name)
    }

    fn table_descriptor(&self, id: TableId) -> OptResult<Option<TableDescriptor>> {
        self.0.table_descriptor(id)
    }

    fn conglomerate_by_name(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<ConglomerateDescriptor>> {
        self.0.conglomerate_by_name(schema, name)
    }

    fn conglomerates(&self, table: TableId) -> OptResult<Vec<ConglomerateDescriptor>> {
        self.0.conglomerates(table)
    }

    fn alias_descriptor(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<AliasDescriptor>> {
        self.0.alias_descriptor(schema, name)
    }

    fn statistics(&self, _table: TableId) -> OptResult<Option<Statistics>> {
        Err(anyhow!("statistics are unavailable").into())
    }
}

#[test]
fn test_catalog_errors_propagate() {
    let fixture = three_tables();
    let optimizables = fixture.optimizables();
    let catalog = BrokenStatistics(fixture.catalog);
    let result = OptimizerFactory::default().get_optimizer(
        optimizables,
        chain_predicates(3),
        &catalog,
        None,
        3,
        None,
        &SessionContext::default(),
    );
    match result {
        Err(OptimizerError::Catalog(e)) => assert!(e.to_string().contains("unavailable")),
        other => panic!("expected a catalog error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_hints() {
    let fixture = three_tables();
    let factory = OptimizerFactory::default();
    let with_hint = |key: &str, value: &str| {
        let mut optimizables = fixture.optimizables();
        let a = optimizables.remove(0).with_hint(key, value);
        optimizables.insert(0, a);
        fixture
            .try_optimizer(&factory, optimizables, chain_predicates(3), None, None)
            .map(|_| ())
    };

    assert!(matches!(
        with_hint("index", "A_MISSING"),
        Err(OptimizerError::IndexNotFound { .. })
    ));
    assert!(matches!(
        with_hint("joinStrategy", "MERGE"),
        Err(OptimizerError::InvalidJoinStrategy { .. })
    ));
    assert!(matches!(
        with_hint("hashLoadFactor", "2"),
        Err(OptimizerError::InvalidHint { .. })
    ));
    assert!(matches!(
        with_hint("noSuchHint", "1"),
        Err(OptimizerError::InvalidHint { .. })
    ));

    let nested_loop_only = OptimizerFactory::new(
        OptimizerConfig::default().with_join_strategies(JoinStrategyKind::NestedLoop.into()),
    );
    let mut optimizables = fixture.optimizables();
    let a = optimizables.remove(0).with_hint("joinStrategy", "HASH");
    optimizables.insert(0, a);
    assert!(matches!(
        fixture.try_optimizer(&nested_loop_only, optimizables, chain_predicates(3), None, None),
        Err(OptimizerError::InvalidJoinStrategy { .. })
    ));
}

#[test]
fn test_too_many_tables() {
    let fixture = three_tables();
    let result = OptimizerFactory::default().get_optimizer(
        fixture.optimizables(),
        chain_predicates(3),
        &fixture.catalog,
        None,
        65,
        None,
        &SessionContext::default(),
    );
    assert!(matches!(result, Err(OptimizerError::TooManyTables(_))));
}

#[test]
fn test_predicate_on_out_of_range_table() {
    let fixture = three_tables();
    let mut predicates = chain_predicates(3);
    predicates.push(Predicate::equijoin(
        2,
        ColumnRef::new(70, 0),
        ColumnRef::new(0, 0),
    ));
    let result = fixture.try_optimizer(
        &OptimizerFactory::default(),
        fixture.optimizables(),
        predicates,
        None,
        None,
    );
    assert!(matches!(result, Err(OptimizerError::TooManyTables(71))));
}

#[test]
fn test_equal_cost_orders_follow_tie_break() {
    let fixture = Fixture::new(&[("A", 100.0), ("B", 100.0)]);
    let join_order = |tie_break: TieBreak| {
        let factory = factory(OptimizerConfig::default().with_tie_break(tie_break));
        let mut optimizer =
            fixture.optimizer(&factory, fixture.optimizables(), PredicateList::new(), None, None);
        optimize(&mut optimizer).join_order()
    };
    assert_eq!(join_order(TieBreak::FirstFound), vec![0, 1]);
    assert_eq!(join_order(TieBreak::LastFound), vec![1, 0]);
}

#[test]
fn test_correlated_subquery() {
    // outer: A (0) and subquery Q (1); Q reads B (2) with Q.B.X = A.X
    let fixture = Fixture::new(&[("A", 10.0), ("B", 1000.0)]);
    let factory = OptimizerFactory::default();
    let inner_predicates: PredicateList =
        vec![Predicate::equijoin(0, ColumnRef::new(0, 0), ColumnRef::new(2, 0))]
            .into_iter()
            .collect();
    let inner = factory
        .get_optimizer(
            vec![fixture.base_table(1, 2)],
            inner_predicates,
            &fixture.catalog,
            None,
            3,
            None,
            &SessionContext::default(),
        )
        .unwrap();
    let subquery = factory.subquery(1, "Q", inner, TableSet::single(0));
    assert!(!subquery.is_materializable());

    // listed before the table it depends on
    let mut outer = factory
        .get_optimizer(
            vec![subquery, fixture.base_table(0, 0)],
            PredicateList::new(),
            &fixture.catalog,
            None,
            3,
            None,
            &SessionContext::default(),
        )
        .unwrap();
    let plan = optimize(&mut outer);
    assert_eq!(plan.join_order(), vec![0, 1]);
    let q = plan.entry(1).unwrap();
    assert_eq!(q.access_path.join_strategy(), Some(JoinStrategyKind::NestedLoop));
    match &q.node {
        AccessNode::Subquery { plan: inner } => {
            assert_eq!(inner.join_order(), vec![2]);
            assert_eq!(inner.entries()[0].predicates, vec![0]);
        }
        other => panic!("expected a subquery, got {}", other),
    }
    assert_eq!(factory.arena().len(), 4);

    // the nested table remembers its path per outer context; forgetting the context reaches it
    let context = outer.context();
    let nested_memo_has_context = |outer: &join_order_optimizer::optimizer::Optimizer| match outer
        .optimizable(1)
        .unwrap()
        .kind()
    {
        RowSourceKind::Subquery(sq) => sq.inner().optimizable(2).unwrap().memo().contains(context),
        _ => panic!("expected a subquery"),
    };
    assert!(nested_memo_has_context(&outer));
    outer.update_best_plan_maps(PlanAction::Remove, context);
    assert!(!nested_memo_has_context(&outer));
}

#[test]
fn test_uncorrelated_subquery_can_be_hashed() {
    let fixture = Fixture::new(&[("A", 5000.0), ("B", 1000.0)]);
    let factory = OptimizerFactory::default();
    let inner = factory
        .get_optimizer(
            vec![fixture.base_table(1, 2)],
            PredicateList::new(),
            &fixture.catalog,
            None,
            3,
            None,
            &SessionContext::default(),
        )
        .unwrap();
    let subquery = factory.subquery(1, "Q", inner, TableSet::new());
    assert!(subquery.is_materializable());
    let predicates: PredicateList =
        vec![Predicate::equijoin(0, ColumnRef::new(0, 0), ColumnRef::new(1, 0))]
            .into_iter()
            .collect();
    let mut outer = factory
        .get_optimizer(
            vec![fixture.base_table(0, 0), subquery],
            predicates,
            &fixture.catalog,
            None,
            3,
            None,
            &SessionContext::default(),
        )
        .unwrap();
    let plan = optimize(&mut outer);
    assert_eq!(plan.entries().len(), 2);
    let q = plan.entry(1).unwrap();
    assert!(matches!(q.node.source(), AccessNode::Subquery { .. }));
    assert!(plan.plan().unwrap().to_string().contains('Q'));
}

#[test]
fn test_no_feasible_strategy_is_no_best_plan() {
    let fixture = Fixture::new(&[("A", 10.0), ("B", 20.0)]);
    let (text, sink) = text_trace();
    let hash_only = enumset::EnumSet::only(JoinStrategyKind::Hash);
    let factory =
        OptimizerFactory::new(OptimizerConfig::default().with_join_strategies(hash_only))
            .with_trace(sink);
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), PredicateList::new(), None, None);
    optimizer.optimize().unwrap();
    assert!(!optimizer.found_best_plan());
    assert!(matches!(
        optimizer.modify_access_paths(),
        Err(OptimizerError::NoBestPlan(_))
    ));
    assert!(text.borrow().contains("no best plan found"));
}

#[test]
fn test_vacuous_query_block() {
    let fixture = three_tables();
    let (text, sink) = text_trace();
    let factory = OptimizerFactory::default().with_trace(sink);
    let mut optimizer = fixture.optimizer(&factory, Vec::new(), PredicateList::new(), None, None);
    let plan = optimize(&mut optimizer);
    assert!(plan.is_vacuous());
    assert!(plan.plan().is_none());
    assert_eq!(plan.to_string(), "<vacuous>");
    assert!(text.borrow().contains("no tables to optimize"));
}

#[test]
fn test_text_trace() {
    let fixture = three_tables();
    let (text, sink) = text_trace();
    let factory = OptimizerFactory::default().with_trace(sink);
    assert!(factory.supports_optimizer_trace());
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);

    let text = text.borrow();
    assert!(text.lines()[0].starts_with("start query block"));
    assert!(text.contains("considering join order"));
    assert!(text.contains("complete join order"));
    assert!(text.contains("modifying access paths"));
    let last = text.summaries().last().unwrap();
    assert_eq!(last.plan, plan.plan().unwrap().to_string());

    let mut out = Vec::new();
    text.print_to_writer(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("query block"));
    assert!(out.contains(&last.plan));
}

#[test]
fn test_properties_configure_factory() {
    let properties = [
        ("derby.optimizer.noTimeout", "true"),
        ("derby.language.maxMemoryPerTable", "0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let factory = OptimizerFactory::new(OptimizerConfig::from_properties(&properties).unwrap());
    assert_eq!(factory.max_memory_per_table(), 0);
    assert!(factory.do_join_order_optimization());

    let fixture = three_tables();
    let mut optimizer =
        fixture.optimizer(&factory, fixture.optimizables(), chain_predicates(3), None, None);
    let plan = optimize(&mut optimizer);
    assert!(plan.entries().iter().all(|e| !e.node.is_hash_scan()));
    assert!(OptimizerPlan::parse(&plan.plan().unwrap().to_string()).is_ok());
}

use crate::error::{OptResult, OptimizerError};
use crate::optimizable::Optimizable;
use crate::plan::OptimizerPlan;

/// Matches the leaves of a bound override to optimizables and forces the conglomerate and join
/// strategy each leaf names. Returns the dictated join order as optimizable indexes.
pub(crate) fn apply_override(
    plan: &OptimizerPlan,
    optimizables: &mut [Optimizable],
) -> OptResult<Vec<usize>> {
    let leaves = plan.leaves()?;
    if leaves.len() > optimizables.len() {
        return Err(OptimizerError::OverrideMismatch(format!(
            "{} names {} row sources but the query block has {}",
            plan,
            leaves.len(),
            optimizables.len()
        )));
    }

    let mut order = Vec::with_capacity(leaves.len());
    for (strategy, leaf) in leaves {
        let position = optimizables
            .iter()
            .enumerate()
            .position(|(i, o)| !order.contains(&i) && o.matches_plan_leaf(leaf))
            .ok_or_else(|| {
                OptimizerError::OverrideMismatch(format!("{} is not in the query block", leaf))
            })?;
        let conglomerate = leaf.as_conglomerate().and_then(|rs| rs.descriptor()).cloned();
        optimizables[position].force(conglomerate, strategy);
        order.push(position);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, InMemoryCatalog, SessionContext};
    use crate::operator::JoinStrategyKind;

    fn fixture() -> (InMemoryCatalog, Vec<Optimizable>) {
        let mut catalog = InMemoryCatalog::new();
        let s = catalog.add_schema("S");
        let a = catalog.add_table(s, "A", &[("X", 4.0)]);
        let b = catalog.add_table(s, "B", &[("X", 4.0)]);
        catalog.add_index(b, "B_X", &[0], false);
        let schema = catalog.schema_descriptor("S").unwrap().unwrap();
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

    #[test]
    fn test_leaves_dictate_order() {
        let (catalog, mut optimizables) = fixture();
        let mut plan = OptimizerPlan::parse("S.B_X # S.A").unwrap();
        plan.bind(&catalog, &SessionContext::default()).unwrap();
        assert_eq!(apply_override(&plan, &mut optimizables).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_unknown_and_extra_leaves() {
        let (catalog, mut optimizables) = fixture();
        let mut plan = OptimizerPlan::left_deep(
            OptimizerPlan::conglomerate(Some("S"), "A"),
            vec![(JoinStrategyKind::NestedLoop, OptimizerPlan::conglomerate(Some("S"), "A"))],
        );
        plan.bind(&catalog, &SessionContext::default()).unwrap();
        assert!(matches!(
            apply_override(&plan, &mut optimizables),
            Err(OptimizerError::OverrideMismatch(_))
        ));

        let mut plan = OptimizerPlan::parse("S.A * S.B * S.A").unwrap();
        plan.bind(&catalog, &SessionContext::default()).unwrap();
        assert!(matches!(
            apply_override(&plan, &mut optimizables),
            Err(OptimizerError::OverrideMismatch(_))
        ));
    }
}

//! User-specified plan overrides.
//!
//! An [`OptimizerPlan`] describes a complete or partial left-deep join order: every join's right
//! child is a single row source. Leaves name conglomerates (a table's heap or one of its indexes)
//! or table functions, and are resolved against the catalog by [`OptimizerPlan::bind`]. A plan
//! with fewer leaves than the query has tables is a prefix: it fixes the first join positions and
//! leaves the rest to the search.
//!
//! The textual form joins leaves with `*` (nested loop) or `#` (hash), left to right:
//!
//! ```text
//! S.ORDERS_IDX * S.CUSTOMER # S.LINEITEM_FN()
//! ```

use std::cell::OnceCell;
use std::fmt::{Debug, Display, Formatter};

use enum_as_inner::EnumAsInner;

use crate::catalog::{
    AliasDescriptor, Catalog, ConglomerateDescriptor, SchemaDescriptor, SessionContext,
};
use crate::error::{OptResult, OptimizerError};
use crate::operator::JoinStrategyKind;

mod parser;

/// A catalog object a row source leaf can resolve to.
pub trait RowSourceDescriptor: Clone + Debug + PartialEq {
    fn resolve(
        catalog: &dyn Catalog,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<Self>>;

    /// Identity used to compare bound leaves.
    fn object_id(&self) -> u32;

    fn name_suffix() -> &'static str {
        ""
    }
}

impl RowSourceDescriptor for ConglomerateDescriptor {
    fn resolve(
        catalog: &dyn Catalog,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<Self>> {
        catalog.conglomerate_by_name(schema, name)
    }

    fn object_id(&self) -> u32 {
        self.id.0
    }
}

impl RowSourceDescriptor for AliasDescriptor {
    fn resolve(
        catalog: &dyn Catalog,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<Self>> {
        catalog.alias_descriptor(schema, name)
    }

    fn object_id(&self) -> u32 {
        self.id.0
    }

    fn name_suffix() -> &'static str {
        "()"
    }
}

/// A named leaf, bound once to a catalog descriptor.
#[derive(Clone, Debug)]
pub struct RowSource<D> {
    schema_name: Option<String>,
    name: String,
    schema: Option<SchemaDescriptor>,
    descriptor: Option<D>,
}

pub type ConglomerateRS = RowSource<ConglomerateDescriptor>;
pub type TableFunctionRS = RowSource<AliasDescriptor>;

impl<D: RowSourceDescriptor> RowSource<D> {
    pub fn new<S: Into<String>>(schema_name: Option<S>, name: S) -> Self {
        Self {
            schema_name: schema_name.map(Into::into),
            name: name.into(),
            schema: None,
            descriptor: None,
        }
    }

    /// A leaf that is already bound.
    pub fn bound(schema: SchemaDescriptor, name: &str, descriptor: D) -> Self {
        Self {
            schema_name: Some(schema.name.clone()),
            name: name.to_string(),
            schema: Some(schema),
            descriptor: Some(descriptor),
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&SchemaDescriptor> {
        self.schema.as_ref()
    }

    pub fn descriptor(&self) -> Option<&D> {
        self.descriptor.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.descriptor.is_some()
    }

    pub fn bind(&mut self, catalog: &dyn Catalog, session: &SessionContext) -> OptResult<()> {
        if self.descriptor.is_some() {
            return Ok(());
        }
        let schema = match self.schema.take() {
            Some(schema) => schema,
            None => {
                let schema_name = self
                    .schema_name
                    .clone()
                    .unwrap_or_else(|| session.current_schema().to_string());
                catalog
                    .schema_descriptor(&schema_name)?
                    .ok_or(OptimizerError::SchemaNotFound(schema_name))?
            }
        };
        let descriptor = D::resolve(catalog, &schema, &self.name)?;
        let schema_name = schema.name.clone();
        self.schema = Some(schema);
        match descriptor {
            Some(d) => {
                self.descriptor = Some(d);
                Ok(())
            }
            None => Err(OptimizerError::RowSourceNotFound {
                schema: schema_name,
                name: self.name.clone(),
            }),
        }
    }
}

impl<D: RowSourceDescriptor> PartialEq for RowSource<D> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.descriptor, &other.descriptor) {
            (Some(a), Some(b)) => a.object_id() == b.object_id(),
            _ => self.schema_name == other.schema_name && self.name == other.name,
        }
    }
}

impl<D: RowSourceDescriptor> Display for RowSource<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.schema_name {
            Some(schema) => write!(f, "{}.{}{}", schema, self.name, D::name_suffix()),
            None => write!(f, "{}{}", self.name, D::name_suffix()),
        }
    }
}

/// Join of a left-deep plan with one more row source.
#[derive(Clone, Debug)]
pub struct Join {
    strategy: JoinStrategyKind,
    left: Box<OptimizerPlan>,
    right: Box<OptimizerPlan>,
    leaf_count: OnceCell<usize>,
}

impl Join {
    pub fn strategy(&self) -> JoinStrategyKind {
        self.strategy
    }

    pub fn left(&self) -> &OptimizerPlan {
        &self.left
    }

    pub fn right(&self) -> &OptimizerPlan {
        &self.right
    }
}

/// Strategies compare by symbol.
impl PartialEq for Join {
    fn eq(&self, other: &Self) -> bool {
        self.strategy.symbol() == other.strategy.symbol()
            && self.left == other.left
            && self.right == other.right
    }
}

#[derive(Clone, Debug, PartialEq, EnumAsInner)]
pub enum OptimizerPlan {
    Join(Join),
    Conglomerate(ConglomerateRS),
    TableFunction(TableFunctionRS),
    /// A row source that has no catalog name, such as a subquery. Never needs binding.
    DeadEnd(String),
}

impl OptimizerPlan {
    pub fn join(strategy: JoinStrategyKind, left: OptimizerPlan, right: OptimizerPlan) -> Self {
        OptimizerPlan::Join(Join {
            strategy,
            left: Box::new(left),
            right: Box::new(right),
            leaf_count: OnceCell::new(),
        })
    }

    pub fn conglomerate(schema: Option<&str>, name: &str) -> Self {
        OptimizerPlan::Conglomerate(RowSource::new(schema, name))
    }

    pub fn table_function(schema: Option<&str>, name: &str) -> Self {
        OptimizerPlan::TableFunction(RowSource::new(schema, name))
    }

    pub fn dead_end<S: Into<String>>(name: S) -> Self {
        OptimizerPlan::DeadEnd(name.into())
    }

    /// Builds the left-deep plan joining `first` with each `(strategy, leaf)` in turn.
    pub fn left_deep<I>(first: OptimizerPlan, rest: I) -> Self
    where
        I: IntoIterator<Item = (JoinStrategyKind, OptimizerPlan)>,
    {
        rest.into_iter().fold(first, |left, (strategy, right)| {
            OptimizerPlan::join(strategy, left, right)
        })
    }

    /// Parses the textual form.
    pub fn parse(text: &str) -> OptResult<Self> {
        parser::parse_plan(text)
    }

    pub fn is_row_source(&self) -> bool {
        matches!(
            self,
            OptimizerPlan::Conglomerate(_) | OptimizerPlan::TableFunction(_)
        )
    }

    /// Resolves every leaf against the catalog. Binding a bound plan does nothing.
    pub fn bind(&mut self, catalog: &dyn Catalog, session: &SessionContext) -> OptResult<()> {
        match self {
            OptimizerPlan::Join(join) => {
                if !join.right.is_row_source() {
                    return Err(OptimizerError::NotLeftDeep(self.to_string()));
                }
                join.left.bind(catalog, session)?;
                join.right.bind(catalog, session)
            }
            OptimizerPlan::Conglomerate(rs) => rs.bind(catalog, session),
            OptimizerPlan::TableFunction(rs) => rs.bind(catalog, session),
            OptimizerPlan::DeadEnd(_) => Ok(()),
        }
    }

    pub fn is_bound(&self) -> bool {
        match self {
            OptimizerPlan::Join(join) => join.left.is_bound() && join.right.is_bound(),
            OptimizerPlan::Conglomerate(rs) => rs.is_bound(),
            OptimizerPlan::TableFunction(rs) => rs.is_bound(),
            OptimizerPlan::DeadEnd(_) => true,
        }
    }

    pub fn count_leaf_nodes(&self) -> usize {
        match self {
            OptimizerPlan::Join(join) => *join
                .leaf_count
                .get_or_init(|| join.left.count_leaf_nodes() + join.right.count_leaf_nodes()),
            _ => 1,
        }
    }

    /// Whether `self` is `other`, or the left spine of `other` starts with `self`.
    pub fn is_left_prefix_of(&self, other: &OptimizerPlan) -> bool {
        let this_count = self.count_leaf_nodes();
        let that_count = other.count_leaf_nodes();
        if this_count > that_count {
            return false;
        }
        if this_count == that_count {
            return self == other;
        }
        match other {
            OptimizerPlan::Join(join) => self.is_left_prefix_of(&join.left),
            _ => false,
        }
    }

    pub fn leftmost_leaf(&self) -> &OptimizerPlan {
        match self {
            OptimizerPlan::Join(join) => join.left.leftmost_leaf(),
            leaf => leaf,
        }
    }

    /// Leaves in join order, each with the strategy that joins it to the leaves before it.
    pub fn leaves(&self) -> OptResult<Vec<(Option<JoinStrategyKind>, &OptimizerPlan)>> {
        let mut leaves = Vec::with_capacity(self.count_leaf_nodes());
        let mut node = self;
        while let OptimizerPlan::Join(join) = node {
            if let OptimizerPlan::Join(_) = join.right.as_ref() {
                return Err(OptimizerError::NotLeftDeep(node.to_string()));
            }
            leaves.push((Some(join.strategy), join.right.as_ref()));
            node = join.left.as_ref();
        }
        leaves.push((None, node));
        leaves.reverse();
        Ok(leaves)
    }
}

impl Display for OptimizerPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerPlan::Join(join) => write!(
                f,
                "({} {} {})",
                join.left,
                join.strategy.symbol(),
                join.right
            ),
            OptimizerPlan::Conglomerate(rs) => write!(f, "{}", rs),
            OptimizerPlan::TableFunction(rs) => write!(f, "{}", rs),
            OptimizerPlan::DeadEnd(name) => write!(f, "{}", name),
        }
    }
}

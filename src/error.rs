use thiserror::Error;

pub type OptResult<T> = Result<T, OptimizerError>;

/// Errors raised while binding a plan override, validating hints or searching join orders.
///
/// Feasibility questions (can this strategy apply, does this hash table fit) are answered with
/// `bool` and never surface here.
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("plan override is not left-deep: right child of join `{0}` is not a row source")]
    NotLeftDeep(String),
    #[error("schema `{0}` does not exist")]
    SchemaNotFound(String),
    #[error("row source `{schema}.{name}` does not exist")]
    RowSourceNotFound { schema: String, name: String },
    #[error("invalid value `{value}` for hint `{key}` on table `{table}`")]
    InvalidHint {
        table: String,
        key: String,
        value: String,
    },
    #[error("index `{index}` does not exist on table `{table}`")]
    IndexNotFound { table: String, index: String },
    #[error("join strategy `{strategy}` is not valid for table `{table}`")]
    InvalidJoinStrategy { table: String, strategy: String },
    #[error("user-specified join order is not legal")]
    IllegalForcedJoinOrder,
    #[error("no plan found for query block {0}")]
    NoBestPlan(u32),
    #[error("plan override does not match the query: {0}")]
    OverrideMismatch(String),
    #[error("query references {0} tables, more than the supported 64")]
    TooManyTables(usize),
    #[error("invalid optimizer property `{key}` = `{value}`")]
    InvalidProperty { key: String, value: String },
    #[error("cannot parse plan override at `{0}`")]
    OverrideParse(String),
    #[error(transparent)]
    Catalog(#[from] anyhow::Error),
}

//! Catalog interface.
//!
//! The optimizer never owns metadata. It resolves schema names, conglomerates (heaps and
//! indexes), table function aliases and statistics through the [`Catalog`] trait. Lookups are
//! synchronous and assumed to be cheap. A lookup that fails (as opposed to one that finds
//! nothing) is an error the optimizer propagates unchanged.

use std::collections::HashMap;

use derive_more::Display;
use smallvec::SmallVec;

use crate::error::OptResult;
use crate::stat::Statistics;

#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SchemaId(pub u32);

#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TableId(pub u32);

#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConglomerateId(pub u32);

#[derive(Clone, Copy, Debug, Display, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AliasId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub id: SchemaId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Zero based position in the table.
    pub position: usize,
    /// Estimated in-memory width of one value, in bytes.
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescriptor {
    pub id: TableId,
    pub schema_id: SchemaId,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column(&self, position: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(position)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Key columns (table column positions) in key order.
    pub key_columns: SmallVec<[usize; 4]>,
    /// Per key column: ascending when true.
    pub ascending: SmallVec<[bool; 4]>,
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new<I: IntoIterator<Item = usize>>(key_columns: I, unique: bool) -> Self {
        let key_columns: SmallVec<[usize; 4]> = key_columns.into_iter().collect();
        let ascending = key_columns.iter().map(|_| true).collect();
        Self {
            key_columns,
            ascending,
            unique,
        }
    }

    pub fn key_position(&self, column: usize) -> Option<usize> {
        self.key_columns.iter().position(|c| *c == column)
    }
}

/// A physical storage structure backing a table: its heap or one of its indexes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConglomerateDescriptor {
    pub id: ConglomerateId,
    pub name: String,
    pub table_id: TableId,
    pub schema_id: SchemaId,
    pub index: Option<IndexDescriptor>,
}

impl ConglomerateDescriptor {
    pub fn is_index(&self) -> bool {
        self.index.is_some()
    }
}

/// Costing information a table function publishes about itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TableFunctionCosting {
    pub estimated_row_count: f64,
    pub estimated_cost: f64,
    pub supports_multiple_instantiations: bool,
}

impl Default for TableFunctionCosting {
    fn default() -> Self {
        Self {
            estimated_row_count: 10_000.0,
            estimated_cost: 100_000.0,
            supports_multiple_instantiations: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasDescriptor {
    pub id: AliasId,
    pub schema_id: SchemaId,
    pub name: String,
    pub costing: TableFunctionCosting,
}

/// Metadata source consulted by the optimizer.
pub trait Catalog {
    fn schema_descriptor(&self, name: &str) -> OptResult<Option<SchemaDescriptor>>;

    fn table_descriptor(&self, id: TableId) -> OptResult<Option<TableDescriptor>>;

    fn conglomerate_by_name(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<ConglomerateDescriptor>>;

    /// All conglomerates of a table, heap first.
    fn conglomerates(&self, table: TableId) -> OptResult<Vec<ConglomerateDescriptor>>;

    fn alias_descriptor(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<AliasDescriptor>>;

    fn statistics(&self, table: TableId) -> OptResult<Option<Statistics>>;
}

/// Session state needed to resolve names.
#[derive(Clone, Debug)]
pub struct SessionContext {
    current_schema: String,
}

impl SessionContext {
    pub fn new<S: Into<String>>(current_schema: S) -> Self {
        Self {
            current_schema: current_schema.into(),
        }
    }

    pub fn current_schema(&self) -> &str {
        &self.current_schema
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new("APP")
    }
}

/// Catalog populated programmatically, for tests and embedding.
///
/// Every table gets a heap conglomerate named after the table.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    schemas: Vec<SchemaDescriptor>,
    tables: Vec<TableDescriptor>,
    conglomerates: Vec<ConglomerateDescriptor>,
    aliases: Vec<AliasDescriptor>,
    statistics: HashMap<TableId, Statistics>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_schema<S: Into<String>>(&mut self, name: S) -> SchemaId {
        let name = name.into();
        if let Some(s) = self.schemas.iter().find(|s| s.name == name) {
            return s.id;
        }
        let id = SchemaId(self.schemas.len() as u32);
        self.schemas.push(SchemaDescriptor { id, name });
        id
    }

    /// Adds a table with `(column name, width)` columns and its heap conglomerate.
    pub fn add_table(&mut self, schema: SchemaId, name: &str, columns: &[(&str, f64)]) -> TableId {
        let id = TableId(self.tables.len() as u32);
        let columns = columns
            .iter()
            .enumerate()
            .map(|(position, (column, width))| ColumnDescriptor {
                name: column.to_string(),
                position,
                width: *width,
            })
            .collect();
        self.tables.push(TableDescriptor {
            id,
            schema_id: schema,
            name: name.to_string(),
            columns,
        });
        self.push_conglomerate(schema, id, name, None);
        id
    }

    pub fn add_index(
        &mut self,
        table: TableId,
        name: &str,
        key_columns: &[usize],
        unique: bool,
    ) -> ConglomerateId {
        let schema = self.tables[table.0 as usize].schema_id;
        self.push_conglomerate(
            schema,
            table,
            name,
            Some(IndexDescriptor::new(key_columns.iter().copied(), unique)),
        )
    }

    pub fn add_table_function(
        &mut self,
        schema: SchemaId,
        name: &str,
        costing: TableFunctionCosting,
    ) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.aliases.push(AliasDescriptor {
            id,
            schema_id: schema,
            name: name.to_string(),
            costing,
        });
        id
    }

    pub fn set_statistics(&mut self, table: TableId, statistics: Statistics) {
        self.statistics.insert(table, statistics);
    }

    fn push_conglomerate(
        &mut self,
        schema: SchemaId,
        table: TableId,
        name: &str,
        index: Option<IndexDescriptor>,
    ) -> ConglomerateId {
        let id = ConglomerateId(self.conglomerates.len() as u32);
        self.conglomerates.push(ConglomerateDescriptor {
            id,
            name: name.to_string(),
            table_id: table,
            schema_id: schema,
            index,
        });
        id
    }
}

impl Catalog for InMemoryCatalog {
    fn schema_descriptor(&self, name: &str) -> OptResult<Option<SchemaDescriptor>> {
        Ok(self.schemas.iter().find(|s| s.name == name).cloned())
    }

    fn table_descriptor(&self, id: TableId) -> OptResult<Option<TableDescriptor>> {
        Ok(self.tables.get(id.0 as usize).cloned())
    }

    fn conglomerate_by_name(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<ConglomerateDescriptor>> {
        Ok(self
            .conglomerates
            .iter()
            .find(|c| c.schema_id == schema.id && c.name == name)
            .cloned())
    }

    fn conglomerates(&self, table: TableId) -> OptResult<Vec<ConglomerateDescriptor>> {
        let mut conglomerates: Vec<ConglomerateDescriptor> = self
            .conglomerates
            .iter()
            .filter(|c| c.table_id == table)
            .cloned()
            .collect();
        conglomerates.sort_by_key(|c| (c.is_index(), c.id));
        Ok(conglomerates)
    }

    fn alias_descriptor(
        &self,
        schema: &SchemaDescriptor,
        name: &str,
    ) -> OptResult<Option<AliasDescriptor>> {
        Ok(self
            .aliases
            .iter()
            .find(|a| a.schema_id == schema.id && a.name == name)
            .cloned())
    }

    fn statistics(&self, table: TableId) -> OptResult<Option<Statistics>> {
        Ok(self.statistics.get(&table).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_listed_before_indexes() {
        let mut catalog = InMemoryCatalog::new();
        let s = catalog.add_schema("S");
        let t = catalog.add_table(s, "T", &[("A", 4.0), ("B", 8.0)]);
        catalog.add_index(t, "T_B", &[1], false);

        let conglomerates = catalog.conglomerates(t).unwrap();
        assert_eq!(conglomerates.len(), 2);
        assert!(!conglomerates[0].is_index());
        assert_eq!(conglomerates[1].name, "T_B");
    }

    #[test]
    fn test_lookup_by_name_is_schema_scoped() {
        let mut catalog = InMemoryCatalog::new();
        let s1 = catalog.add_schema("S1");
        catalog.add_schema("S2");
        catalog.add_table(s1, "T", &[("A", 4.0)]);

        let s1 = catalog.schema_descriptor("S1").unwrap().unwrap();
        let s2 = catalog.schema_descriptor("S2").unwrap().unwrap();
        assert!(catalog.conglomerate_by_name(&s1, "T").unwrap().is_some());
        assert!(catalog.conglomerate_by_name(&s2, "T").unwrap().is_none());
        assert!(catalog.schema_descriptor("S3").unwrap().is_none());
    }
}

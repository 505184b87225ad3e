//! Schema Descriptor
//!
//! Structural metadata (tables, columns, keys) handed to the SQL generator as
//! context. Table names are unique within a descriptor and column names are
//! unique within a table; both are checked on construction and deserialization.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub max_length: Option<i32>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            max_length: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_keys: BTreeSet<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_keys: BTreeSet::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_keys.insert(column.into());
        self
    }

    pub fn foreign_key(
        mut self,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        });
        self
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    fn check_columns(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ChatError::Schema(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawSchemaDescriptor {
    tables: Vec<Table>,
}

impl TryFrom<RawSchemaDescriptor> for SchemaDescriptor {
    type Error = ChatError;

    fn try_from(raw: RawSchemaDescriptor) -> Result<Self> {
        SchemaDescriptor::new(raw.tables)
    }
}

/// Ordered set of tables available to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchemaDescriptor")]
pub struct SchemaDescriptor {
    tables: Vec<Table>,
}

impl SchemaDescriptor {
    pub fn new(tables: Vec<Table>) -> Result<Self> {
        let mut seen = HashSet::new();
        for table in &tables {
            if !seen.insert(table.name.as_str()) {
                return Err(ChatError::Schema(format!("Duplicate table '{}'", table.name)));
            }
            table.check_columns()?;
        }
        Ok(Self { tables })
    }

    pub fn empty() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Tables whose name (or singular form) or any column name occurs in the question.
    pub fn relevant_tables(&self, question: &str) -> Vec<&Table> {
        let question = question.to_lowercase();
        let words: HashSet<&str> = question
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        self.tables
            .iter()
            .filter(|table| {
                let name = table.name.to_lowercase();
                let singular = name.strip_suffix('s').unwrap_or(&name);
                words.contains(name.as_str())
                    || words.contains(singular)
                    || table
                        .columns
                        .iter()
                        .any(|c| words.contains(c.name.to_lowercase().as_str()))
            })
            .collect()
    }

    /// Render the schema (optionally restricted to `only` tables) for an LLM prompt.
    pub fn to_prompt_context(&self, only: Option<&[&str]>) -> String {
        let tables: Vec<&Table> = match only {
            Some(names) => names.iter().filter_map(|n| self.table(n)).collect(),
            None => self.tables.iter().collect(),
        };

        if tables.is_empty() {
            return "No schema information available.".to_string();
        }

        let mut text = String::from("Database Schema:\n\n");
        for table in tables {
            let _ = writeln!(text, "Table: {}", table.name);
            text.push_str("Columns:\n");
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let max_len = col.max_length.map(|l| format!("({})", l)).unwrap_or_default();
                let default = col
                    .default
                    .as_ref()
                    .map(|d| format!(" DEFAULT {}", d))
                    .unwrap_or_default();
                let _ = writeln!(
                    text,
                    "  - {}: {}{} {}{}",
                    col.name, col.data_type, max_len, nullable, default
                );
            }
            if !table.primary_keys.is_empty() {
                let keys: Vec<&str> = table.primary_keys.iter().map(String::as_str).collect();
                let _ = writeln!(text, "Primary Keys: {}", keys.join(", "));
            }
            if !table.foreign_keys.is_empty() {
                text.push_str("Foreign Keys:\n");
                for fk in &table.foreign_keys {
                    let _ = writeln!(
                        text,
                        "  - {} -> {}.{}",
                        fk.column, fk.references_table, fk.references_column
                    );
                }
            }
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop_schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![
            Table::new("products")
                .column(Column::new("id", "integer", false))
                .column(Column::new("name", "character varying", false).with_max_length(120))
                .column(Column::new("price", "numeric", true).with_default("0"))
                .primary_key("id"),
            Table::new("orders")
                .column(Column::new("id", "integer", false))
                .column(Column::new("product_id", "integer", false))
                .column(Column::new("quantity", "integer", false))
                .primary_key("id")
                .foreign_key("product_id", "products", "id"),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = SchemaDescriptor::new(vec![Table::new("a"), Table::new("a")]).unwrap_err();
        assert!(matches!(err, ChatError::Schema(_)));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = Table::new("a")
            .column(Column::new("id", "int", false))
            .column(Column::new("id", "int", false));
        assert!(SchemaDescriptor::new(vec![table]).is_err());
    }

    #[test]
    fn test_deserialize_enforces_invariants() {
        let json = r#"{"tables":[{"name":"t","columns":[]},{"name":"t","columns":[]}]}"#;
        assert!(serde_json::from_str::<SchemaDescriptor>(json).is_err());

        let json = r#"{"tables":[{"name":"t","columns":[{"name":"id","type":"int","nullable":false}]}]}"#;
        let schema: SchemaDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(schema.table_count(), 1);
    }

    #[test]
    fn test_prompt_context_lists_keys_and_columns() {
        let text = shop_schema().to_prompt_context(None);
        assert!(text.contains("Table: products"));
        assert!(text.contains("  - name: character varying(120) NOT NULL"));
        assert!(text.contains("  - price: numeric NULL DEFAULT 0"));
        assert!(text.contains("Primary Keys: id"));
        assert!(text.contains("  - product_id -> products.id"));
    }

    #[test]
    fn test_prompt_context_filtered() {
        let text = shop_schema().to_prompt_context(Some(&["ORDERS"]));
        assert!(text.contains("Table: orders"));
        assert!(!text.contains("Table: products"));
    }

    #[test]
    fn test_relevant_tables_matches_singular_and_columns() {
        let schema = shop_schema();
        let names: Vec<&str> = schema
            .relevant_tables("What is the most expensive product?")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["products"]);

        let names: Vec<&str> = schema
            .relevant_tables("total quantity sold")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["orders"]);
    }
}

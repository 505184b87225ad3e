//! Schema introspection from `information_schema`.

use crate::error::Result;
use crate::schema::{Column, ForeignKey, SchemaDescriptor, SchemaProvider, Table};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(sqlx::FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    nullable: bool,
    column_default: Option<String>,
    max_length: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    table_name: String,
    column_name: String,
}

#[derive(sqlx::FromRow)]
struct ForeignKeyRow {
    table_name: String,
    column_name: String,
    references_table: String,
    references_column: String,
}

/// Reads base tables of one schema together with columns and key constraints.
pub struct PostgresSchemaProvider {
    pool: PgPool,
    schema: String,
}

impl PostgresSchemaProvider {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn introspect(&self) -> Result<SchemaDescriptor> {
        let table_names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let column_rows: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT table_name::text AS table_name,
                   column_name::text AS column_name,
                   data_type::text AS data_type,
                   (is_nullable = 'YES') AS nullable,
                   column_default::text AS column_default,
                   character_maximum_length::int4 AS max_length
            FROM information_schema.columns
            WHERE table_schema = $1
            ORDER BY table_name, ordinal_position
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let pk_rows: Vec<KeyRow> = sqlx::query_as(
            r#"
            SELECT tc.table_name::text AS table_name, kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let fk_rows: Vec<ForeignKeyRow> = sqlx::query_as(
            r#"
            SELECT tc.table_name::text AS table_name,
                   kcu.column_name::text AS column_name,
                   ccu.table_name::text AS references_table,
                   ccu.column_name::text AS references_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name
             AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let mut columns: HashMap<String, Vec<Column>> = HashMap::new();
        for row in column_rows {
            let mut column = Column::new(row.column_name, row.data_type, row.nullable);
            column.default = row.column_default;
            column.max_length = row.max_length;
            columns.entry(row.table_name).or_default().push(column);
        }

        let mut tables: Vec<Table> = table_names
            .into_iter()
            .map(|(name,)| {
                let mut table = Table::new(name.clone());
                table.columns = columns.remove(&name).unwrap_or_default();
                table
            })
            .collect();

        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, t) in tables.iter().enumerate() {
            index.insert(t.name.clone(), i);
        }
        for row in pk_rows {
            if let Some(&i) = index.get(&row.table_name) {
                tables[i].primary_keys.insert(row.column_name);
            }
        }
        for row in fk_rows {
            if let Some(&i) = index.get(&row.table_name) {
                tables[i].foreign_keys.push(ForeignKey {
                    column: row.column_name,
                    references_table: row.references_table,
                    references_column: row.references_column,
                });
            }
        }

        info!(
            "Introspected {} table(s) from schema '{}'",
            tables.len(),
            self.schema
        );
        SchemaDescriptor::new(tables)
    }
}

#[async_trait]
impl SchemaProvider for PostgresSchemaProvider {
    async fn fetch(&self) -> Result<Option<Arc<SchemaDescriptor>>> {
        let schema = self.introspect().await?;
        if schema.is_empty() {
            warn!("No tables found in schema '{}'", self.schema);
            return Ok(None);
        }
        Ok(Some(Arc::new(schema)))
    }
}

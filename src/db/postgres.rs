//! Postgres Executor
//!
//! Each statement runs in its own `READ ONLY` transaction with a server-side
//! `statement_timeout`, and the transaction is always rolled back. Column
//! names come from the prepared statement so empty results still carry
//! their header.

use crate::db::executor::{Executor, QueryOutput};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Executor as _, Postgres, Row, Statement, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

pub struct PostgresExecutor {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl Executor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        let timeout_ms = self.statement_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
            .execute(&mut *tx)
            .await?;

        let statement = (&mut *tx).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        let rows: Vec<Vec<Value>> = rows.iter().map(decode_row).collect();
        debug!("Query returned {} row(s), {} column(s)", rows.len(), columns.len());

        tx.rollback().await?;

        Ok(QueryOutput::new(columns, rows))
    }
}

fn decode_row(row: &PgRow) -> Vec<Value> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    let type_name = row.column(idx).type_info().name().to_string();
    let decoded = match type_name.as_str() {
        "BOOL" => get::<bool>(row, idx).map(Value::Bool),
        "INT2" => get::<i16>(row, idx).map(|v| Value::from(i64::from(v))),
        "INT4" => get::<i32>(row, idx).map(|v| Value::from(i64::from(v))),
        "INT8" => get::<i64>(row, idx).map(Value::from),
        "FLOAT4" => get::<f32>(row, idx).map(|v| Value::from(f64::from(v))),
        "FLOAT8" => get::<f64>(row, idx).map(Value::from),
        "NUMERIC" => get::<sqlx::types::BigDecimal>(row, idx).map(|v| {
            let text = v.to_string();
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }),
        "UUID" => get::<uuid::Uuid>(row, idx).map(|v| Value::String(v.to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, idx).map(|v| Value::String(v.to_string())),
        "TIME" => get::<chrono::NaiveTime>(row, idx).map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx).map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx).map(|v| Value::String(v.to_rfc3339()))
        }
        "JSON" | "JSONB" => get::<Value>(row, idx),
        _ => get::<String>(row, idx).map(Value::String),
    };

    decoded.unwrap_or_else(|| Value::String(format!("<{}>", type_name.to_lowercase())))
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(idx).ok()
}

//! Prompt builders for the model-backed collaborators.

use crate::db::ResultSet;
use crate::generation::RepairContext;
use crate::response::render_table;
use crate::schema::SchemaDescriptor;
use crate::session::{Message, Role};

pub const SQL_SYSTEM: &str =
    "You are a PostgreSQL expert. You answer with a single read-only SELECT statement and nothing else.";
pub const CLASSIFIER_SYSTEM: &str = "You are a strict classifier. Answer with exactly one word: YES or NO.";
pub const RESPONSE_SYSTEM: &str = "You are a helpful database assistant who explains query results in plain language.";

/// Messages of history forwarded to the SQL prompt.
pub const GENERATION_HISTORY: usize = 3;
/// Rows of the result shown to the response model.
pub const RESPONSE_PREVIEW_ROWS: usize = 20;
const CLASSIFIER_TABLE_HINT: usize = 10;

pub fn history_context(history: &[Message], last: usize) -> String {
    let start = history.len().saturating_sub(last);
    let lines: Vec<String> = history[start..]
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(format!("User: {}", m.content)),
            Role::Assistant => Some(format!("Assistant: {}", m.content)),
            Role::System => None,
        })
        .collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!("Previous conversation:\n{}\n", lines.join("\n"))
    }
}

pub fn classification_prompt(query: &str, schema: Option<&SchemaDescriptor>) -> String {
    let tables = schema
        .map(|s| {
            let names: Vec<&str> = s.table_names().take(CLASSIFIER_TABLE_HINT).collect();
            if names.is_empty() {
                String::new()
            } else {
                format!("Available tables: {}\n", names.join(", "))
            }
        })
        .unwrap_or_default();

    format!(
        r#"Decide whether answering the user's message requires querying the database.

User message: {query}
{tables}
Answer YES when the message asks about data stored in the database (for example "show products", "how many orders", "list customers").
Answer NO for greetings, questions about this assistant ("what can you do", "help") and anything else that needs no database access.

Answer (YES or NO):"#
    )
}

pub fn generation_prompt(
    query: &str,
    schema: &SchemaDescriptor,
    history: &[Message],
    repair: Option<&RepairContext>,
) -> String {
    let relevant: Vec<&str> = schema
        .relevant_tables(query)
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    let hint = if relevant.is_empty() {
        String::new()
    } else {
        format!("Tables most likely involved: {}\n", relevant.join(", "))
    };
    let conversation = history_context(history, GENERATION_HISTORY);

    let repair_section = match repair {
        Some(ctx) => format!(
            r#"
The previous attempt failed and must be corrected.
Failed SQL:
{}
Error ({}):
{}
Return a corrected query that avoids this error.
"#,
            ctx.failed_sql, ctx.error.kind, ctx.error.message
        ),
        None => String::new(),
    };

    format!(
        r#"Translate the question into one PostgreSQL SELECT query.

{schema_text}
{hint}{conversation}
Question: {query}
{repair_section}
Rules:
1. Output only the SQL query, without explanations or Markdown.
2. Only SELECT is allowed; never modify data or schema.
3. Use table and column names exactly as listed in the schema.
4. Do not use SQL comments.
5. If the question cannot be answered from this schema, output "ERROR: <reason>".

SQL:"#,
        schema_text = schema.to_prompt_context(None),
    )
}

pub fn response_prompt(
    query: &str,
    result: &ResultSet,
    sql: Option<&str>,
    history: &[Message],
) -> String {
    let results_text = if result.is_empty() {
        "The query returned no rows.".to_string()
    } else {
        let mut text = format!("Query results:\n{}", render_table(result, RESPONSE_PREVIEW_ROWS));
        if result.total_rows > RESPONSE_PREVIEW_ROWS {
            text.push_str(&format!(
                "\n(showing {} of {} total rows)",
                RESPONSE_PREVIEW_ROWS.min(result.row_count()),
                result.total_rows
            ));
        }
        text
    };
    let sql_text = sql
        .map(|s| format!("SQL executed: {}\n", s))
        .unwrap_or_default();
    let conversation = history_context(history, GENERATION_HISTORY);

    format!(
        r#"The user asked a question and a database query was run to answer it.

User question: {query}
{sql_text}
{results_text}

{conversation}
Answer the question conversationally using the results. Quote the specific figures that matter.
If there are no rows, say so plainly. Do not talk about SQL unless the user asked about it.

Answer:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorDetail, ErrorKind};
    use crate::schema::{Column, Table};

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![Table::new("products")
            .column(Column::new("id", "integer", false))
            .column(Column::new("name", "text", false))])
        .unwrap()
    }

    #[test]
    fn test_history_keeps_last_messages() {
        let history = vec![
            Message::user("first"),
            Message::assistant("one"),
            Message::user("second"),
            Message::assistant("two"),
        ];
        let text = history_context(&history, 3);
        assert!(!text.contains("first"));
        assert!(text.contains("Assistant: one"));
        assert!(text.contains("User: second"));
        assert_eq!(history_context(&[], 3), "");
    }

    #[test]
    fn test_generation_prompt_includes_repair() {
        let repair = RepairContext {
            failed_sql: "SELECT nam FROM products".to_string(),
            error: ErrorDetail::new(ErrorKind::ExecutionFailure, "column \"nam\" does not exist"),
        };
        let prompt = generation_prompt("list product names", &schema(), &[], Some(&repair));
        assert!(prompt.contains("Table: products"));
        assert!(prompt.contains("Tables most likely involved: products"));
        assert!(prompt.contains("SELECT nam FROM products"));
        assert!(prompt.contains("ExecutionFailure"));
    }

    #[test]
    fn test_classification_prompt_lists_tables() {
        let prompt = classification_prompt("show products", Some(&schema()));
        assert!(prompt.contains("Available tables: products"));
    }
}

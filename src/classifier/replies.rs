//! Canned replies for turns that never reach the database.

use crate::classifier::QueryKind;

pub const GREETING_REPLY: &str =
    "Hello! I'm your database assistant. How can I help you query your database today?";
pub const HOW_ARE_YOU_REPLY: &str =
    "I'm doing great! Ready to help you query your database. What would you like to explore?";
pub const GENERAL_REPLY: &str = "I can help you query your database. \
    Ask me questions like 'Show me all products' or 'How many orders are there?'";

const CAPABILITIES_REPLY: &str = "I can help you:
- Turn natural language questions into read-only SQL queries
- Run them against your PostgreSQL database
- Summarise the results or show them as a table
- Answer questions about your database schema

Try asking things like:
- \"Show me all products\"
- \"How many orders are there?\"
- \"What are the top 5 products by price?\"";

const HOW_IT_WORKS_REPLY: &str = "Here's how it works:
1. You ask a question in plain English
2. I look at your question together with the database schema
3. I write a SELECT query and check that it is read-only and safe
4. The query runs and I explain the results
If a query fails, I try to repair it a limited number of times before giving up.";

pub fn greeting_reply(query: &str) -> String {
    let lower = query.to_lowercase();
    if lower.contains("how are you") || lower.contains("how's it going") {
        HOW_ARE_YOU_REPLY.to_string()
    } else {
        GREETING_REPLY.to_string()
    }
}

pub fn general_reply(query: &str) -> String {
    let lower = query.to_lowercase();
    let asks_for_help = lower
        .split_whitespace()
        .any(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == "help");
    if lower.contains("what can you do") || asks_for_help {
        CAPABILITIES_REPLY.to_string()
    } else if lower.contains("how does this work") || lower.contains("how do you work") {
        HOW_IT_WORKS_REPLY.to_string()
    } else {
        GENERAL_REPLY.to_string()
    }
}

/// Reply for non-SQL kinds; `None` for kinds that go down the SQL path.
pub fn canned_reply(kind: QueryKind, query: &str) -> Option<String> {
    match kind {
        QueryKind::Greeting => Some(greeting_reply(query)),
        QueryKind::GeneralQuestion => Some(general_reply(query)),
        QueryKind::SqlQuery | QueryKind::Unclassified => None,
    }
}

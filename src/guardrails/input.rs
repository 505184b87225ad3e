//! SQL Safety Validator
//!
//! Static read-only check applied to every candidate statement before it is
//! allowed near the executor. Stateless; one instance can be shared freely
//! across tasks.

use crate::error::{ErrorDetail, ErrorKind};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::fmt;

pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE", "EXEC",
    "EXECUTE", "CALL",
];

lazy_static! {
    static ref FORBIDDEN_RE: Regex = Regex::new(&format!(
        r"(?i)\b({})\b",
        FORBIDDEN_KEYWORDS.join("|")
    ))
    .unwrap();
    static ref SUSPICIOUS_UNION_RE: Regex = Regex::new(
        r"(?is)\bunion\b(?:\s+all)?\s+select\s+(?:null\b|\d+\s*,|[^;]*\b(?:information_schema|pg_catalog|pg_shadow|pg_authid|pg_user)\b)"
    )
    .unwrap();
    static ref HEX_LITERAL_RE: Regex = Regex::new(r"(?i)\b0x[0-9a-f]+\b|\bx'[0-9a-f]*'").unwrap();
    static ref VENDOR_PROCEDURE_RE: Regex = Regex::new(concat!(
        r"(?i)\b(?:xp|sp)_\w+|\bdblink\w*|\bpg_advisory_\w+",
        r"|\b(?:pg_sleep|pg_read_file|pg_ls_dir|lo_import|lo_export",
        r"|pg_terminate_backend|pg_cancel_backend|pg_reload_conf|set_config)\s*\("
    ))
    .unwrap();
}

/// Which check rejected a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    Empty,
    Syntax,
    MultipleStatements,
    NotSelect,
    SelectInto,
    ForbiddenKeyword,
    Comment,
    SuspiciousUnion,
    HexLiteral,
    VendorProcedure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlViolation {
    pub rule: ViolationRule,
    pub message: String,
}

impl SqlViolation {
    fn new(rule: ViolationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for SqlViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<SqlViolation> for ErrorDetail {
    fn from(v: SqlViolation) -> Self {
        ErrorDetail::new(ErrorKind::ValidationFailure, v.message)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Accepts only a single read-only `SELECT`. The first failing check is reported.
    pub fn validate(&self, sql: &str) -> Result<(), SqlViolation> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlViolation::new(ViolationRule::Empty, "SQL query is empty"));
        }

        let dialect = PostgreSqlDialect {};
        let statements = Parser::parse_sql(&dialect, sql).map_err(|e| {
            SqlViolation::new(ViolationRule::Syntax, format!("Invalid SQL syntax: {}", e))
        })?;
        if statements.is_empty() {
            return Err(SqlViolation::new(ViolationRule::Empty, "SQL query is empty"));
        }
        if statements.len() > 1 {
            return Err(SqlViolation::new(
                ViolationRule::MultipleStatements,
                format!("Multiple statements are not allowed ({} found)", statements.len()),
            ));
        }

        let tokens = Tokenizer::new(&dialect, sql).tokenize().map_err(|e| {
            SqlViolation::new(ViolationRule::Syntax, format!("Invalid SQL syntax: {}", e))
        })?;

        let leading = tokens.iter().find(|t| !matches!(t, Token::Whitespace(_)));
        match leading {
            Some(Token::Word(word))
                if word.quote_style.is_none() && word.value.eq_ignore_ascii_case("SELECT") => {}
            Some(token) => {
                return Err(SqlViolation::new(
                    ViolationRule::NotSelect,
                    format!("Only SELECT queries are allowed, found '{}'", leading_text(token)),
                ));
            }
            None => return Err(SqlViolation::new(ViolationRule::Empty, "SQL query is empty")),
        }

        if statements.iter().any(creates_table) {
            return Err(SqlViolation::new(
                ViolationRule::SelectInto,
                "SELECT INTO creates a table and is not allowed",
            ));
        }

        if let Some(m) = FORBIDDEN_RE.find(sql) {
            return Err(SqlViolation::new(
                ViolationRule::ForbiddenKeyword,
                format!("Forbidden keyword detected: {}", m.as_str().to_uppercase()),
            ));
        }

        let has_comment = tokens.iter().any(|t| {
            matches!(
                t,
                Token::Whitespace(Whitespace::SingleLineComment { .. })
                    | Token::Whitespace(Whitespace::MultiLineComment(_))
            )
        });
        if has_comment {
            return Err(SqlViolation::new(
                ViolationRule::Comment,
                "SQL comments are not allowed",
            ));
        }

        if SUSPICIOUS_UNION_RE.is_match(sql) {
            return Err(SqlViolation::new(
                ViolationRule::SuspiciousUnion,
                "Suspicious UNION SELECT pattern detected",
            ));
        }

        if HEX_LITERAL_RE.is_match(sql) {
            return Err(SqlViolation::new(
                ViolationRule::HexLiteral,
                "Encoded hex literals are not allowed",
            ));
        }

        if let Some(m) = VENDOR_PROCEDURE_RE.find(sql) {
            return Err(SqlViolation::new(
                ViolationRule::VendorProcedure,
                format!(
                    "Disallowed procedure call detected: {}",
                    m.as_str().trim_end_matches('(').trim()
                ),
            ));
        }

        Ok(())
    }

    /// Convenience form returning `(ok, error)`.
    pub fn check(&self, sql: &str) -> (bool, Option<ErrorDetail>) {
        match self.validate(sql) {
            Ok(()) => (true, None),
            Err(v) => (false, Some(v.into())),
        }
    }
}

/// `SELECT ... INTO t` anywhere in the statement, including set operations.
fn creates_table(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => query_creates_table(query),
        _ => false,
    }
}

fn query_creates_table(query: &Query) -> bool {
    set_expr_creates_table(&query.body)
}

fn set_expr_creates_table(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => query_creates_table(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_creates_table(left) || set_expr_creates_table(right)
        }
        _ => false,
    }
}

fn leading_text(token: &Token) -> String {
    match token {
        Token::Word(w) => w.value.to_uppercase(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(sql: &str) -> ViolationRule {
        SafetyValidator::new().validate(sql).unwrap_err().rule
    }

    #[test]
    fn test_plain_selects_pass() {
        let v = SafetyValidator::new();
        assert!(v.validate("SELECT * FROM products;").is_ok());
        assert!(v
            .validate("select name, price from products where price > 10 order by price desc limit 5")
            .is_ok());
        assert!(v.validate("SELECT created_at, updated_at FROM orders").is_ok());
        assert!(v
            .validate("SELECT name FROM products UNION SELECT name FROM archived_products")
            .is_ok());
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(rule(""), ViolationRule::Empty);
        assert_eq!(rule("   \n"), ViolationRule::Empty);
        assert_eq!(rule("SELEC * FORM products"), ViolationRule::Syntax);
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_eq!(rule("SELECT 1; SELECT 2"), ViolationRule::MultipleStatements);
        assert_eq!(rule("SELECT 1; DROP TABLE x"), ViolationRule::MultipleStatements);
    }

    #[test]
    fn test_leading_keyword_must_be_select() {
        assert_eq!(rule("DROP TABLE products;"), ViolationRule::NotSelect);
        assert_eq!(rule("update products set price = 0"), ViolationRule::NotSelect);
        assert_eq!(rule("WITH t AS (SELECT 1) SELECT * FROM t"), ViolationRule::NotSelect);
        assert_eq!(rule("DeLeTe FROM products"), ViolationRule::NotSelect);
    }

    #[test]
    fn test_forbidden_word_inside_select() {
        assert_eq!(
            rule("SELECT * FROM audit WHERE action = 'DELETE'"),
            ViolationRule::ForbiddenKeyword
        );
        let err = SafetyValidator::new()
            .validate("SELECT * FROM audit WHERE action = 'drop'")
            .unwrap_err();
        assert_eq!(err.message, "Forbidden keyword detected: DROP");
    }

    #[test]
    fn test_every_forbidden_keyword_after_select() {
        for keyword in FORBIDDEN_KEYWORDS {
            let mixed: String = keyword
                .chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c.to_ascii_lowercase() } else { c })
                .collect();
            let sql = format!("SELECT * FROM audit WHERE action = '{}'", mixed);
            assert_eq!(rule(&sql), ViolationRule::ForbiddenKeyword, "{}", sql);
        }
    }

    #[test]
    fn test_select_into_rejected() {
        assert_eq!(rule("SELECT * INTO backup_products FROM products"), ViolationRule::SelectInto);
        assert_eq!(
            rule("SELECT id FROM products UNION SELECT id INTO products_copy FROM orders"),
            ViolationRule::SelectInto
        );
    }

    #[test]
    fn test_admin_functions_rejected() {
        for sql in [
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity",
            "SELECT pg_cancel_backend(pid) FROM pg_stat_activity",
            "SELECT pg_reload_conf()",
            "SELECT set_config('search_path', 'public', false)",
            "SELECT pg_advisory_lock(42)",
        ] {
            assert_eq!(rule(sql), ViolationRule::VendorProcedure, "{}", sql);
        }
        // Plain column names sharing a prefix are fine.
        assert!(SafetyValidator::new().validate("SELECT config_name FROM settings").is_ok());
    }

    #[test]
    fn test_comments_rejected() {
        assert_eq!(rule("SELECT * FROM users -- bypass"), ViolationRule::Comment);
        assert_eq!(rule("SELECT /* hidden */ * FROM users"), ViolationRule::Comment);
    }

    #[test]
    fn test_injection_idioms_rejected() {
        assert_eq!(
            rule("SELECT name FROM products UNION SELECT NULL, NULL"),
            ViolationRule::SuspiciousUnion
        );
        assert_eq!(
            rule("SELECT name FROM products UNION ALL SELECT usename FROM pg_catalog.pg_user"),
            ViolationRule::SuspiciousUnion
        );
        assert_eq!(rule("SELECT pg_sleep(10)"), ViolationRule::VendorProcedure);
        assert!(SafetyValidator::new().validate("SELECT * FROM t WHERE id = 0x41").is_err());
        assert_eq!(rule("SELECT * FROM t WHERE data = x'4142'"), ViolationRule::HexLiteral);
    }

    #[test]
    fn test_violation_maps_to_validation_failure() {
        let (ok, err) = SafetyValidator::new().check("DROP TABLE products;");
        assert!(!ok);
        assert_eq!(err.unwrap().kind, ErrorKind::ValidationFailure);
        assert_eq!(SafetyValidator::new().check("SELECT 1"), (true, None));
    }
}

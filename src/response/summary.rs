//! Result summaries and plain-text table rendering.

use crate::db::ResultSet;
use serde_json::Value;
use std::collections::HashSet;

pub const MAX_ROWS_DISPLAY: usize = 10;

/// "I found N result(s) for your query." using the pre-truncation row count.
pub fn fallback_response(result: &ResultSet) -> String {
    format!("I found {} result(s) for your query.", result.total_rows)
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render at most `max_rows` rows as an aligned text table.
pub fn render_table(result: &ResultSet, max_rows: usize) -> String {
    if result.columns.is_empty() {
        return String::new();
    }
    let shown: Vec<Vec<String>> = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &shown {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(shown.len() + 2);
    out.push(line(&result.columns));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &shown {
        out.push(line(row));
    }
    out.join("\n")
}

/// Header line shown above a table preview.
pub fn display_message(result: &ResultSet) -> String {
    let total = result.total_rows;
    if total == 0 {
        "Query executed successfully but returned no results.".to_string()
    } else if total > MAX_ROWS_DISPLAY {
        format!("Showing first {} of {} rows. Here are the results:", MAX_ROWS_DISPLAY, total)
    } else {
        format!("Found {} row(s). Here are the results:", total)
    }
}

/// One-line summary tuned to count, top-N, average and extremum questions.
pub fn summarize(question: &str, result: &ResultSet) -> String {
    let total = result.total_rows;
    let lower = question.to_lowercase();
    let words: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let any = |candidates: &[&str]| candidates.iter().any(|c| words.contains(c));

    if lower.contains("how many") || lower.contains("number of") || any(&["count"]) {
        return format!("The query returned {} result(s).", total);
    }

    if any(&["top"]) {
        let shown = total.min(MAX_ROWS_DISPLAY);
        return if total > MAX_ROWS_DISPLAY {
            format!("Top {} results (showing {} of {} total):", shown, shown, total)
        } else {
            format!("Top {} results:", total)
        };
    }

    let numeric = numeric_columns(result);
    if any(&["average", "avg", "mean"]) && !numeric.is_empty() {
        let parts: Vec<String> = numeric
            .iter()
            .take(3)
            .filter_map(|&i| {
                let values = column_numbers(result, i);
                if values.is_empty() {
                    return None;
                }
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                Some(format!("Average {}: {:.2}", result.columns[i], avg))
            })
            .collect();
        if !parts.is_empty() {
            return format!("Summary of {} row(s): {}", total, parts.join(" | "));
        }
    }

    if any(&["maximum", "max", "highest"]) {
        if let Some(&i) = numeric.first() {
            let max = column_numbers(result, i).into_iter().fold(f64::NEG_INFINITY, f64::max);
            if max.is_finite() {
                return format!("Maximum {}: {} (from {} row(s))", result.columns[i], max, total);
            }
        }
    }

    if any(&["minimum", "min", "lowest"]) {
        if let Some(&i) = numeric.first() {
            let min = column_numbers(result, i).into_iter().fold(f64::INFINITY, f64::min);
            if min.is_finite() {
                return format!("Minimum {}: {} (from {} row(s))", result.columns[i], min, total);
            }
        }
    }

    if total > MAX_ROWS_DISPLAY {
        format!("Query returned {} result(s). Showing first {}:", total, MAX_ROWS_DISPLAY)
    } else {
        format!("Query returned {} result(s):", total)
    }
}

fn numeric_columns(result: &ResultSet) -> Vec<usize> {
    (0..result.columns.len())
        .filter(|&i| {
            let mut seen = false;
            for row in &result.rows {
                match row.get(i) {
                    Some(Value::Number(_)) => seen = true,
                    Some(Value::Null) | None => {}
                    Some(_) => return false,
                }
            }
            seen
        })
        .collect()
}

fn column_numbers(result: &ResultSet, idx: usize) -> Vec<f64> {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(idx).and_then(Value::as_f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn products() -> ResultSet {
        ResultSet {
            columns: vec!["name".into(), "price".into()],
            rows: vec![
                vec![json!("Widget"), json!(2.5)],
                vec![json!("Gadget"), json!(10)],
                vec![json!("Gizmo"), Value::Null],
            ],
            total_rows: 3,
            truncated: false,
        }
    }

    #[test]
    fn test_fallback_uses_total_rows() {
        let mut result = products();
        result.total_rows = 1500;
        assert_eq!(fallback_response(&result), "I found 1500 result(s) for your query.");
    }

    #[test]
    fn test_summaries() {
        let result = products();
        assert_eq!(summarize("How many products?", &result), "The query returned 3 result(s).");
        assert_eq!(summarize("average price", &result), "Summary of 3 row(s): Average price: 6.25");
        assert_eq!(
            summarize("highest price", &result),
            "Maximum price: 10 (from 3 row(s))"
        );
        assert_eq!(summarize("lowest price", &result), "Minimum price: 2.5 (from 3 row(s))");
        assert_eq!(summarize("list products", &result), "Query returned 3 result(s):");
    }

    #[test]
    fn test_render_table_aligns_and_limits() {
        let table = render_table(&products(), 2);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "name   | price");
        assert_eq!(lines[2], "Widget | 2.5");
        assert!(!table.contains("Gizmo"));
    }

    #[test]
    fn test_display_message() {
        assert_eq!(display_message(&products()), "Found 3 row(s). Here are the results:");
        assert_eq!(
            display_message(&ResultSet::default()),
            "Query executed successfully but returned no results."
        );
    }
}

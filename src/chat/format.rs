//! Turns tagged rows into the reply text, choosing a layout by row count.

use super::rows::ResultRow;
use super::table_image::TableRenderer;
use crate::db::values::{format_amount, Scalar};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

pub const NO_RECORDS: &str = "No records found.";
pub const NO_DATA: &str = "_No data returned._";
pub const TABLE_PREFIX: &str = "TABLE:";

static LIMIT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btop\s+(\d+)\b|\bwhich\s+(\d+)\b").unwrap());

pub fn format_zero_rows() -> String {
    NO_RECORDS.to_string()
}

/// Numbers as `1,234.56`, nulls as `None`.
pub(crate) fn display_cell(value: &Scalar) -> String {
    match value {
        v if v.is_numeric() => v.as_f64().map(format_amount).unwrap_or_default(),
        other => other.to_string(),
    }
}

pub fn format_single_row(row: &ResultRow) -> String {
    match row {
        ResultRow::Customer {
            first_name,
            last_name,
            total,
        } => format!("{} {} — {}", first_name, last_name, display_cell(total)),
        ResultRow::Product {
            name,
            category,
            value,
        } => format!("{} ({}) — {}", name, category, display_cell(value)),
        ResultRow::Generic(cells) => cells
            .iter()
            .map(display_cell)
            .collect::<Vec<_>>()
            .join(" — "),
    }
}

pub fn format_numbered_list(rows: &[ResultRow]) -> String {
    rows.iter()
        .enumerate()
        .map(|(i, row)| format!("{}. {}  ", i + 1, format_single_row(row)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One `| a | b |` line per row; only floats get thousands grouping.
pub fn format_markdown_table(rows: &[ResultRow], limit: Option<usize>) -> String {
    if rows.is_empty() {
        return NO_DATA.to_string();
    }

    let shown = limit.map_or(rows.len(), |n| n.min(rows.len()));
    let lines: Vec<String> = rows[..shown]
        .iter()
        .map(|row| {
            let cells: Vec<String> = row
                .cells()
                .iter()
                .map(|cell| match cell {
                    Scalar::Float(v) => format_amount(*v),
                    other => other.to_string(),
                })
                .collect();
            format!("| {} |", cells.join(" | "))
        })
        .collect();
    format!("{}\n", lines.join("\n"))
}

/// A leading count in questions like "top 10 ..." or "which 5 ...". Zero is no limit.
pub fn extract_limit_from_question(question: &str) -> Option<usize> {
    let caps = LIMIT_HINT.captures(question)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|n| *n > 0)
}

/// 0 rows, 1 row, 2 to 5 rows as a numbered list, more as a rendered table image.
pub fn format_result(rows: &[ResultRow], renderer: &TableRenderer, limit: Option<usize>) -> String {
    match rows.len() {
        0 => format_zero_rows(),
        1 => format_single_row(&rows[0]),
        2..=5 => format_numbered_list(rows),
        _ => {
            let shown = limit.map_or(rows.len(), |n| n.clamp(1, rows.len()));
            match renderer.render(&rows[..shown]) {
                Ok(sentinel) => sentinel,
                Err(e) => {
                    warn!("Table image rendering failed, sending markdown: {}", e);
                    format_markdown_table(rows, Some(shown))
                }
            }
        }
    }
}

/// Finds a `TABLE:<path>` line inside a longer reply.
pub fn extract_table_sentinel(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.find(TABLE_PREFIX).map(|i| &line[i..]))
        .map(|s| s.split_whitespace().next().unwrap_or(s).to_string())
        .filter(|s| s.len() > TABLE_PREFIX.len())
}

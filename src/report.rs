//! Result rendering: fixed-width text tables for the terminal, JSON for
//! scripts.

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

/// A result row that can be shown as a table line.
pub trait TableRow {
    fn headers() -> &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

/// Render rows as a `col | col | col` table with a dashed rule under the
/// header. Columns are as wide as their widest cell.
pub fn render_table<R: TableRow>(rows: &[R]) -> String {
    let headers = R::headers();
    let cells: Vec<Vec<String>> = rows.iter().map(|r| r.cells()).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    write_line(&mut out, &header, &widths);

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-|-"));

    for row in &cells {
        write_line(&mut out, row, &widths);
    }
    out
}

fn write_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let last = widths.len().saturating_sub(1);
    let mut parts = Vec::with_capacity(widths.len());
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        if i == last {
            // no trailing padding
            parts.push(cell.to_string());
        } else {
            parts.push(format!("{:<width$}", cell, width = *width));
        }
    }
    let _ = writeln!(out, "{}", parts.join(" | "));
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

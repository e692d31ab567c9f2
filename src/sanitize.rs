//! Header detection and repeated-header removal for raw exports.
//!
//! Ad-platform exports often start with report titles, date-range banners or
//! rows of bare commas before the real header line, and combined exports
//! repeat the header at file boundaries.

use crate::error::{BudgetError, Result};
use crate::schema::{CellValue, RawRow, RawTable};
use log::debug;

/// Index of the header line: the first line that is non-blank, not made of
/// commas only, and contains both a comma and a letter.
pub fn detect_header_index<S: AsRef<str>>(lines: &[S]) -> Option<usize> {
    lines.iter().position(|line| {
        let trimmed = line.as_ref().trim();
        if trimmed.is_empty() || trimmed.chars().all(|c| c == ',') {
            return false;
        }
        trimmed.contains(',') && trimmed.chars().any(|c| c.is_ascii_alphabetic())
    })
}

/// Parses one exported file into a raw table, skipping any preamble before
/// the detected header.
pub fn parse_table(text: &str, source_file: &str) -> Result<RawTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lines: Vec<&str> = text.lines().collect();

    let header_idx = detect_header_index(&lines).ok_or_else(|| BudgetError::MalformedFile {
        file: source_file.to_string(),
        details: "no header line found".to_string(),
    })?;
    debug!("{}: header detected on line {}", source_file, header_idx + 1);

    let body = lines[header_idx..].join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = unique_headers(reader.headers()?.iter());

    let mut grid: Vec<Vec<CellValue>> = Vec::new();
    for (record_idx, result) in reader.records().enumerate() {
        let record = result?;
        if record.len() > headers.len() {
            return Err(BudgetError::MalformedFile {
                file: source_file.to_string(),
                details: format!(
                    "record {} has {} fields, header has {}",
                    record_idx + 1,
                    record.len(),
                    headers.len()
                ),
            });
        }
        let mut cells: Vec<CellValue> = record.iter().map(CellValue::from_raw).collect();
        cells.resize(headers.len(), CellValue::Empty);
        grid.push(cells);
    }

    // columns that carry no value anywhere are export padding
    let keep: Vec<usize> = (0..headers.len())
        .filter(|&col| grid.iter().any(|cells| !cells[col].is_empty()))
        .collect();

    let columns: Vec<String> = keep.iter().map(|&col| headers[col].clone()).collect();
    let rows: Vec<RawRow> = grid
        .into_iter()
        .map(|mut cells| {
            let mut row = RawRow::new(source_file);
            for &col in &keep {
                let value = std::mem::replace(&mut cells[col], CellValue::Empty);
                row.cells.push((headers[col].clone(), value));
            }
            row
        })
        .filter(|row| !row.is_blank())
        .collect();

    Ok(drop_repeated_headers(RawTable::new(columns, rows)))
}

/// Trims header names, names blank headers `Unnamed: <idx>` and suffixes
/// duplicates with `.1`, `.2`, ...
fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for (idx, name) in raw.enumerate() {
        let trimmed = name.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while headers.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        headers.push(candidate);
    }
    headers
}

/// Minimum number of cells equal to their own header for a row to count as
/// a repeated header.
pub fn repeated_header_threshold(column_count: usize) -> usize {
    column_count.div_ceil(2).max(2)
}

pub fn is_repeated_header(row: &RawRow, column_count: usize) -> bool {
    let matches = row
        .cells
        .iter()
        .filter(|(column, value)| {
            let header = column.trim().to_lowercase();
            !header.is_empty() && value.to_text().trim().to_lowercase() == header
        })
        .count();
    matches >= repeated_header_threshold(column_count)
}

/// Drops rows that repeat the header. Safe to run on a single file and again
/// on the concatenation of several.
pub fn drop_repeated_headers(table: RawTable) -> RawTable {
    let column_count = table.columns.len();
    let before = table.rows.len();
    let rows: Vec<RawRow> = table
        .rows
        .into_iter()
        .filter(|row| !is_repeated_header(row, column_count))
        .collect();

    if rows.len() != before {
        debug!("Dropped {} repeated header rows", before - rows.len());
    }

    RawTable::new(table.columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_header_after_blank_and_comma_lines() {
        let lines = ["", ",,,", "Name,Budget,Spend", "A,100,50"];
        assert_eq!(detect_header_index(&lines), Some(2));

        let table = parse_table(&lines.join("\n"), "t.csv").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns, vec!["Name", "Budget", "Spend"]);
        assert_eq!(
            table.rows[0].get("Budget"),
            Some(&CellValue::Text("100".to_string()))
        );
    }

    #[test]
    fn test_report_title_without_comma_is_skipped() {
        let lines = ["Campaign report", "Jan 1 - Jan 31", "Group,Budget", "A,1"];
        assert_eq!(detect_header_index(&lines), Some(2));
    }

    #[test]
    fn test_numeric_only_line_is_not_a_header() {
        let lines = ["1,2,3", "Group,Budget"];
        assert_eq!(detect_header_index(&lines), Some(1));
    }

    #[test]
    fn test_no_header_is_malformed() {
        let err = parse_table("\n,,,\n1,2\n", "bad.csv").unwrap_err();
        assert!(matches!(err, BudgetError::MalformedFile { .. }));
    }

    #[test]
    fn test_repeated_header_row_dropped() {
        let text = "Group,Budget,Spend\nA,100,50\ngroup,BUDGET,spend\nB,10,5\n";
        let table = parse_table(text, "t.csv").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows[1].get("Group"),
            Some(&CellValue::Text("B".to_string()))
        );
    }

    #[test]
    fn test_threshold_is_at_least_two_and_rounds_up() {
        assert_eq!(repeated_header_threshold(1), 2);
        assert_eq!(repeated_header_threshold(3), 2);
        assert_eq!(repeated_header_threshold(5), 3);
        assert_eq!(repeated_header_threshold(6), 3);
    }

    #[test]
    fn test_single_matching_cell_is_kept() {
        // a campaign literally named "Budget" is not a header row
        let text = "Campaign,Budget,Spend,Status\nBudget,100,50,Active\n";
        let table = parse_table(text, "t.csv").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_columns_and_rows_dropped() {
        let text = "Group,Budget,,Notes\nA,100,,\n,,,\nB,5,,\n";
        let table = parse_table(text, "t.csv").unwrap();
        assert_eq!(table.columns, vec!["Group", "Budget"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let text = "Budget,Budget,Spend\n1,2,3\n";
        let table = parse_table(text, "t.csv").unwrap();
        assert_eq!(table.columns, vec!["Budget", "Budget.1", "Spend"]);
    }

    #[test]
    fn test_short_rows_are_padded_long_rows_fail() {
        let table = parse_table("Group,Budget,Spend\nA,1\nB,2,3\n", "t.csv").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("Spend"), Some(&CellValue::Empty));
        assert_eq!(
            table.rows[1].get("Spend"),
            Some(&CellValue::Text("3".to_string()))
        );

        let err = parse_table("Group,Budget\nA,1,2\n", "t.csv").unwrap_err();
        assert!(matches!(err, BudgetError::MalformedFile { .. }));
    }
}

use std::collections::HashMap;
use tracing::debug;

use crate::process::date_parser::to_date_value;
use crate::process::raw_table::Table;
use crate::process::utils::token_sort_ratio;
use crate::schema::FieldMapping;

/// Minimum token-sort score (0–100) for a fuzzy rename.
pub const DEFAULT_CUTOFF: f64 = 85.0;

// Absorbs float noise in the ratio so a score of exactly the cutoff passes.
const SCORE_TOLERANCE: f64 = 1e-9;

/// Best mapping key for `header`: exact match first, then the highest
/// token-sort score at or above `cutoff`. Ties keep the earlier key.
pub fn match_header<'a>(
    header: &str,
    fields: &'a [FieldMapping],
    cutoff: f64,
) -> Option<&'a FieldMapping> {
    if let Some(exact) = fields.iter().find(|f| f.vendor == header) {
        return Some(exact);
    }

    let mut best: Option<(&FieldMapping, f64)> = None;
    for f in fields {
        let score = token_sort_ratio(header, &f.vendor);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((f, score));
        }
    }
    best.filter(|(_, score)| *score + SCORE_TOLERANCE >= cutoff).map(|(f, _)| f)
}

/// Header → new name for every column of `columns`. Columns without a
/// confident match map to themselves.
pub fn build_rename_map(
    columns: &[String],
    fields: &[FieldMapping],
    cutoff: f64,
) -> HashMap<String, String> {
    columns
        .iter()
        .map(|col| {
            let target = match match_header(col, fields, cutoff) {
                Some(f) => {
                    debug!(column = %col, canonical = %f.canonical, vendor = %f.vendor, "renamed");
                    f.canonical.clone()
                }
                None => {
                    debug!(column = %col, "kept original header");
                    col.clone()
                }
            };
            (col.clone(), target)
        })
        .collect()
}

/// New table with columns renamed through `renames`; absent names pass through.
pub fn rename_columns(table: &Table, renames: &HashMap<String, String>) -> Table {
    Table::new(
        table
            .columns
            .iter()
            .map(|c| renames.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect(),
        table.rows.clone(),
    )
}

/// Parse every column whose name mentions "date" into timestamps.
/// Cells that do not parse become null.
pub fn parse_date_columns(table: &Table) -> Table {
    let date_cols: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.to_lowercase().contains("date"))
        .map(|(i, _)| i)
        .collect();
    if date_cols.is_empty() {
        return table.clone();
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            for &i in &date_cols {
                row[i] = to_date_value(&row[i]);
            }
            row
        })
        .collect();
    Table::new(table.columns.clone(), rows)
}

/// Rename a raw sheet's headers against its role mapping, then type its
/// date columns.
pub fn normalize_sheet(raw: &Table, fields: &[FieldMapping], cutoff: f64) -> Table {
    let renames = build_rename_map(&raw.columns, fields, cutoff);
    parse_date_columns(&rename_columns(raw, &renames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::raw_table::Value;
    use crate::schema::{SchemaRegistry, SheetRole};
    use chrono::NaiveDate;

    fn fm(vendor: &str, canonical: &str) -> FieldMapping {
        FieldMapping {
            vendor: vendor.into(),
            canonical: canonical.into(),
        }
    }

    #[test]
    fn test_exact_match_ignores_cutoff() {
        let fields = vec![fm("FC", "Financial Class")];
        // A cutoff no fuzzy score can reach still lets the exact key through.
        let hit = match_header("FC", &fields, 101.0).unwrap();
        assert_eq!(hit.canonical, "Financial Class");
    }

    #[test]
    fn test_cutoff_boundary() {
        // 20-char key; 17 shared chars → 200*17/40 = 85.0
        let fields = vec![fm("abcdefghijklmnopqrst", "Target")];
        let score = token_sort_ratio("abcdefghijklmnopqXYZ", "abcdefghijklmnopqrst");
        assert!((score - 85.0).abs() < 1e-9);
        assert!(match_header("abcdefghijklmnopqXYZ", &fields, DEFAULT_CUTOFF).is_some());

        // one more char, same overlap → 200*17/41 ≈ 82.9
        assert!(token_sort_ratio("abcdefghijklmnopqXYZW", "abcdefghijklmnopqrst") < 85.0);
        assert!(match_header("abcdefghijklmnopqXYZW", &fields, DEFAULT_CUTOFF).is_none());
    }

    #[test]
    fn test_reordered_tokens_match() {
        let reg = SchemaRegistry::default();
        let hit = match_header("Date Batch", reg.fields(SheetRole::Charges), DEFAULT_CUTOFF);
        assert_eq!(hit.unwrap().canonical, "Charge Entry Date");
    }

    #[test]
    fn test_ties_resolve_to_first_declared() {
        let fields = vec![fm("ab cd", "First"), fm("cd ab", "Second")];
        let hit = match_header("ab  cd", &fields, DEFAULT_CUTOFF).unwrap();
        assert_eq!(hit.canonical, "First");
        let hit = match_header("cd ab ", &fields, DEFAULT_CUTOFF).unwrap();
        assert_eq!(hit.canonical, "First");
    }

    #[test]
    fn test_normalize_keeps_unmatched_and_parses_dates() {
        let reg = SchemaRegistry::default();
        let raw = Table::new(
            vec!["Account Num".into(), "Batch Date".into(), "Remarks".into()],
            vec![
                vec![
                    Value::Number(1001.0),
                    Value::Text("2025-07-03".into()),
                    Value::Text("ok".into()),
                ],
                vec![
                    Value::Number(1002.0),
                    Value::Text("not a date".into()),
                    Value::Null,
                ],
            ],
        );
        let out = normalize_sheet(&raw, reg.fields(SheetRole::Charges), DEFAULT_CUTOFF);
        assert_eq!(out.columns, vec!["Claim No", "Charge Entry Date", "Remarks"]);
        assert_eq!(
            out.rows[0][1],
            Value::Date(
                NaiveDate::from_ymd_opt(2025, 7, 3)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
        assert_eq!(out.rows[1][1], Value::Null);
        // input untouched
        assert_eq!(raw.columns[0], "Account Num");
    }
}

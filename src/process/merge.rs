use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::EtlError;
use crate::process::raw_table::{Table, Value};
use crate::process::utils::join_key;
use crate::schema::SheetRole;

/// Left-join `right` onto `left` by `key`, after dropping every column of
/// `right` that `left` already has (other than the key). The left value is
/// authoritative and the left row count is preserved: when `right` holds
/// several rows for one key, only the first is joined.
pub fn safe_left_join(left: &Table, right: &Table, key: &str) -> Option<Table> {
    let left_key = left.column_index(key)?;
    let right_key = right.column_index(key)?;

    let collisions: Vec<String> = right
        .columns
        .iter()
        .filter(|c| c.as_str() != key && left.has_column(c))
        .cloned()
        .collect();
    if !collisions.is_empty() {
        debug!(?collisions, "dropping colliding columns before join");
    }

    // columns of `right` that survive: everything but the key and the collisions
    let carried: Vec<usize> = (0..right.columns.len())
        .filter(|&i| i != right_key && !collisions.contains(&right.columns[i]))
        .collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(k) = join_key(&row[right_key]) {
            index.entry(k).or_insert(i);
        }
    }

    let mut columns = left.columns.clone();
    columns.extend(carried.iter().map(|&i| right.columns[i].clone()));

    let rows = left
        .rows
        .iter()
        .map(|lrow| {
            let mut row = lrow.clone();
            match join_key(&lrow[left_key]).and_then(|k| index.get(&k)) {
                Some(&ri) => row.extend(carried.iter().map(|&i| right.rows[ri][i].clone())),
                None => row.extend(std::iter::repeat(Value::Null).take(carried.len())),
            }
            row
        })
        .collect();

    Some(Table::new(columns, rows))
}

/// Join Payment, Adjustment and Pending AR (in that order) onto Charges.
pub fn merge_sheets(
    sheets: &HashMap<SheetRole, Table>,
    key: &str,
) -> Result<Table, EtlError> {
    let sheet = |role: SheetRole| -> Result<&Table, EtlError> {
        sheets
            .get(&role)
            .filter(|t| t.has_column(key))
            .ok_or_else(|| EtlError::MissingJoinKey {
                role,
                column: key.to_string(),
            })
    };

    let mut merged = sheet(SheetRole::Charges)?.clone();
    for role in &SheetRole::ALL[1..] {
        let right = sheet(*role)?;
        merged = safe_left_join(&merged, right, key).ok_or_else(|| EtlError::MissingJoinKey {
            role: *role,
            column: key.to_string(),
        })?;
        debug!(role = %role, columns = merged.num_columns(), "joined");
    }
    Ok(merged)
}

/// Lower-case and trim every name, then suffix repeats `_1`, `_2`, … in
/// first-seen order. A suffix never lands on a name already taken.
pub fn make_unique_columns(columns: &[String]) -> Vec<String> {
    let lowered: Vec<String> = columns.iter().map(|c| c.trim().to_lowercase()).collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(lowered.len());

    for name in &lowered {
        if taken.insert(name.clone()) {
            out.push(name.clone());
            continue;
        }
        let n = counters.entry(name.clone()).or_insert(0);
        let candidate = loop {
            *n += 1;
            let candidate = format!("{}_{}", name, n);
            if !taken.contains(&candidate) && !lowered.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Copy of `table` with storage-ready column names.
pub fn finalize_columns(table: &Table) -> Table {
    Table::new(make_unique_columns(&table.columns), table.rows.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn table(cols: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::new(cols.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn four_sheets(charges: Table, payment: Table) -> HashMap<SheetRole, Table> {
        let mut m = HashMap::new();
        m.insert(SheetRole::Charges, charges);
        m.insert(SheetRole::Payment, payment);
        m.insert(
            SheetRole::Adjustment,
            table(&["Claim No", "Adjustment Amount"], vec![vec![text("A1"), Value::Number(5.0)]]),
        );
        m.insert(
            SheetRole::PendingAr,
            table(&["Claim No", "AR Balance"], vec![]),
        );
        m
    }

    #[test]
    fn test_row_count_preserved_with_duplicates_and_orphans() {
        let charges = table(
            &["Claim No", "Billed Amount"],
            vec![
                vec![text("A1"), Value::Number(100.0)],
                vec![text("A2"), Value::Number(200.0)],
                vec![Value::Null, Value::Number(50.0)],
            ],
        );
        let payment = table(
            &["Claim No", "Paid Amount"],
            vec![
                vec![text("A1"), Value::Number(80.0)],
                vec![text("A1"), Value::Number(10.0)],
                vec![text("ZZ"), Value::Number(1.0)],
            ],
        );
        let merged = merge_sheets(&four_sheets(charges, payment), "Claim No").unwrap();
        assert_eq!(merged.num_rows(), 3);
        assert_eq!(
            merged.columns,
            vec!["Claim No", "Billed Amount", "Paid Amount", "Adjustment Amount", "AR Balance"]
        );
        // first payment row for A1 wins
        assert_eq!(merged.rows[0][2], Value::Number(80.0));
        assert_eq!(merged.rows[0][3], Value::Number(5.0));
        // unmatched claim keeps nulls
        assert_eq!(merged.rows[1][2], Value::Null);
        assert_eq!(merged.rows[2][4], Value::Null);
    }

    #[test]
    fn test_driving_table_wins_collisions() {
        let charges = table(
            &["Claim No", "insurance"],
            vec![vec![text("A1"), text("Aetna")]],
        );
        let payment = table(
            &["Claim No", "insurance", "Paid Amount"],
            vec![vec![text("A1"), text("Cigna"), Value::Number(10.0)]],
        );
        let merged = merge_sheets(&four_sheets(charges, payment), "Claim No").unwrap();
        let idx = merged.column_index("insurance").unwrap();
        assert_eq!(merged.rows[0][idx], text("Aetna"));
        assert_eq!(
            merged.columns.iter().filter(|c| *c == "insurance").count(),
            1
        );
    }

    #[test]
    fn test_numeric_and_text_keys_join() {
        let left = table(&["Claim No"], vec![vec![Value::Number(1001.0)]]);
        let right = table(&["Claim No", "x"], vec![vec![text(" 1001 "), text("hit")]]);
        let joined = safe_left_join(&left, &right, "Claim No").unwrap();
        assert_eq!(joined.rows[0][1], text("hit"));
    }

    #[test]
    fn test_missing_key_is_schema_error() {
        let charges = table(&["Claim No"], vec![]);
        let payment = table(&["Account"], vec![]);
        let err = merge_sheets(&four_sheets(charges, payment), "Claim No").unwrap_err();
        assert!(err.is_schema_error());
        assert!(err.to_string().contains("Payment"));
    }

    #[test]
    fn test_make_unique_columns() {
        let cols: Vec<String> = ["DOS", " dos ", "Dos", "Paid Amount"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            make_unique_columns(&cols),
            vec!["dos", "dos_1", "dos_2", "paid amount"]
        );
    }

    #[test]
    fn test_make_unique_skips_existing_suffix() {
        let cols: Vec<String> = ["a", "a_1", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(make_unique_columns(&cols), vec!["a", "a_1", "a_2"]);
    }
}

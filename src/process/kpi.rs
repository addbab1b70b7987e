//! Derived claim-level KPIs.
//!
//! Every KPI is optional: if its input columns are absent it is skipped, never
//! an error. Ratio KPIs treat a zero denominator as a zero result, so nothing
//! undefined reaches persisted output except `AR Days`.

use tracing::debug;

use crate::process::date_parser::coerce_date;
use crate::process::raw_table::{Table, Value};
use crate::process::utils::{coerce_number, round_to};

pub const DOS: &str = "DOS";
pub const CHARGE_ENTRY_DATE: &str = "Charge Entry Date";
pub const PAYMENT_ENTRY_DATE: &str = "Payment Entry Date";
pub const PAID_AMOUNT: &str = "Paid Amount";
pub const BILLED_AMOUNT: &str = "Billed Amount";
pub const ADJUSTMENT_AMOUNT: &str = "Adjustment Amount";
pub const AR_BALANCE: &str = "AR Balance";
pub const AGING_RANGE: &str = "Aging Range";
pub const FINANCIAL_STATUS: &str = "Financial Status";

pub const CHARGE_LAG: &str = "Charge Lag (days)";
pub const BILLING_LAG: &str = "Billing Lag (days)";
pub const GCR: &str = "GCR (%)";
pub const NCR: &str = "NCR (%)";
pub const CCR: &str = "CCR (%)";
pub const AR_DAYS: &str = "AR Days";
pub const AR_90_PLUS: &str = "90+ AR Amount";
pub const DENIAL_RATE: &str = "Denial Rate (%)";

const AMOUNT_COLUMNS: [&str; 4] = [PAID_AMOUNT, BILLED_AMOUNT, ADJUSTMENT_AMOUNT, AR_BALANCE];

/// `numerator / denominator * 100` to two places; zero when the
/// denominator is zero or the result is not finite.
pub fn percent_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let pct = numerator / denominator * 100.0;
    if pct.is_finite() {
        round_to(pct, 2)
    } else {
        0.0
    }
}

/// Whole days from `start` to `end`, floored.
fn lag_days(start: &Value, end: &Value) -> Value {
    match (coerce_date(start), coerce_date(end)) {
        (Some(s), Some(e)) => {
            let secs = (e - s).num_seconds();
            Value::Number(secs.div_euclid(86_400) as f64)
        }
        _ => Value::Null,
    }
}

fn numbers(table: &Table, col: &str) -> Option<Vec<f64>> {
    table
        .column_values(col)
        .map(|vals| vals.map(coerce_number).collect())
}

fn texts(table: &Table, col: &str) -> Option<Vec<String>> {
    table
        .column_values(col)
        .map(|vals| vals.map(|v| v.to_string()).collect())
}

fn lag_column(table: &Table, start: &str, end: &str) -> Option<Vec<Value>> {
    let s = table.column_index(start)?;
    let e = table.column_index(end)?;
    Some(table.rows.iter().map(|r| lag_days(&r[s], &r[e])).collect())
}

/// Merged table plus KPI columns. The amount columns that feed ratios are
/// replaced by their numeric coercion.
pub fn calculate_kpis(table: &Table) -> Table {
    let mut out = table.clone();

    for col in AMOUNT_COLUMNS {
        if let Some(vals) = numbers(table, col) {
            out = out.with_column(col, vals.into_iter().map(Value::Number).collect());
        }
    }

    if let Some(lags) = lag_column(table, DOS, CHARGE_ENTRY_DATE) {
        out = out.with_column(CHARGE_LAG, lags);
    }
    if let Some(lags) = lag_column(table, CHARGE_ENTRY_DATE, PAYMENT_ENTRY_DATE) {
        out = out.with_column(BILLING_LAG, lags);
    }

    let paid = numbers(table, PAID_AMOUNT);
    let billed = numbers(table, BILLED_AMOUNT);
    let adjusted = numbers(table, ADJUSTMENT_AMOUNT);
    let ar = numbers(table, AR_BALANCE);

    if let (Some(paid), Some(billed)) = (&paid, &billed) {
        let gcr = paid
            .iter()
            .zip(billed)
            .map(|(p, b)| Value::Number(percent_or_zero(*p, *b)))
            .collect();
        out = out.with_column(GCR, gcr);
    }

    if let (Some(paid), Some(billed), Some(adjusted)) = (&paid, &billed, &adjusted) {
        // NCR and CCR share one formula; both labels are kept for reporting.
        let ncr: Vec<Value> = paid
            .iter()
            .zip(billed)
            .zip(adjusted)
            .map(|((p, b), a)| Value::Number(percent_or_zero(*p, b - a)))
            .collect();
        out = out.with_column(NCR, ncr.clone());
        out = out.with_column(CCR, ncr);
    }

    if let (Some(ar), Some(billed)) = (&ar, &billed) {
        let billed_sum: f64 = billed.iter().sum();
        let days = if billed_sum != 0.0 {
            let avg_daily = billed_sum / 30.0;
            ar.iter()
                .map(|bal| Value::from_f64(Some(round_to(bal / avg_daily, 1))))
                .collect()
        } else {
            debug!("billed total is zero; AR Days left null");
            vec![Value::Null; ar.len()]
        };
        out = out.with_column(AR_DAYS, days);
    }

    if let (Some(aging), Some(ar)) = (texts(table, AGING_RANGE), &ar) {
        let aged = aging
            .iter()
            .zip(ar)
            .map(|(bucket, bal)| Value::Number(if bucket.contains("90") { *bal } else { 0.0 }))
            .collect();
        out = out.with_column(AR_90_PLUS, aged);
    }

    if let Some(status) = texts(table, FINANCIAL_STATUS) {
        let total = status.len();
        let rate = if total == 0 {
            Value::Null
        } else {
            let denied = status
                .iter()
                .filter(|s| s.to_lowercase().contains("denied"))
                .count();
            Value::Number(percent_or_zero(denied as f64, total as f64))
        };
        out = out.with_column(DENIAL_RATE, vec![rate; total]);
    }

    out
}

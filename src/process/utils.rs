use rapidfuzz::fuzz;

use crate::process::raw_table::Value;

/// 1) Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// 2) Coerce a cell to a number; anything unparseable counts as zero.
pub fn coerce_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) if n.is_finite() => *n,
        Value::Text(s) => clean_str(s)
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// 3) Normalized join key: trimmed text, integral numbers without a fraction.
/// Blank and null cells have no key and never match.
pub fn join_key(v: &Value) -> Option<String> {
    let key = match v {
        Value::Null => return None,
        Value::Text(s) => clean_str(s),
        other => other.to_string(),
    };
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Round to `places` decimals, halves to even.
pub fn round_to(v: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (v * factor).round_ties_even() / factor
}

/// Token-order-independent similarity on a 0–100 scale.
///
/// Both inputs are split on whitespace, tokens sorted and re-joined with a
/// single space, then scored with the Indel ratio.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    fuzz::ratio(a.chars(), b.chars()) * 100.0
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_sort_ignores_order() {
        assert!((token_sort_ratio("Batch Date", "Date Batch") - 100.0).abs() < 1e-9);
        assert!((token_sort_ratio("Svc  Date", "Date Svc") - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_token_sort_known_scores() {
        // "Amount" vs "Amount Paid": 6 shared chars over 17, 200*6/17
        let s = token_sort_ratio("Amount", "Amount Paid");
        assert!((s - 1200.0 / 17.0).abs() < 1e-9);
        // case sensitive: "fc" vs "FC" share nothing
        assert!(token_sort_ratio("fc", "FC").abs() < 1e-9);
        assert_eq!(token_sort_ratio("", ""), 100.0);
        assert!(token_sort_ratio("abc", "").abs() < 1e-9);
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&Value::Number(12.5)), 12.5);
        assert_eq!(coerce_number(&Value::Text(" 40 ".into())), 40.0);
        assert_eq!(coerce_number(&Value::Text("n/a".into())), 0.0);
        assert_eq!(coerce_number(&Value::Text("NaN".into())), 0.0);
        assert_eq!(coerce_number(&Value::Null), 0.0);
    }

    #[test]
    fn test_join_key_normalizes_numbers() {
        assert_eq!(join_key(&Value::Number(1001.0)), Some("1001".into()));
        assert_eq!(join_key(&Value::Text(" 1001 ".into())), Some("1001".into()));
        assert_eq!(join_key(&Value::Text("  ".into())), None);
        assert_eq!(join_key(&Value::Null), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.33333, 2), 33.33);
        // halves go to the even neighbour
        assert_eq!(round_to(2.25, 1), 2.2);
        assert_eq!(round_to(-2.25, 1), -2.2);
        assert_eq!(round_to(2.75, 1), 2.8);
        assert_eq!(round_to(3.125, 2), 3.12);
    }
}

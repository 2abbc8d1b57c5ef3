//! Best-effort money parsing.
//!
//! The entry screens feed this layer numbers, numeric strings, currency
//! strings ("$1,234.50"), empty strings, and nulls. The contract is lossy by
//! design: anything unparseable silently becomes `0.0` and no error is ever
//! raised. Callers must not use this as input validation.

use serde_json::Value;

/// Normalize any JSON value to a finite amount, defaulting to `0.0`.
pub fn parse_money(value: &Value) -> f64 {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(0.0);
            if v.is_finite() {
                v
            } else {
                0.0
            }
        }
        Value::String(s) => parse_money_str(s),
        _ => 0.0,
    }
}

/// Normalize a string to a finite amount, defaulting to `0.0`.
///
/// Strips every character that is not a digit, sign, or decimal point before
/// parsing, so "$1,234.50" becomes 1234.50.
pub fn parse_money_str(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_pass_through() {
        assert_eq!(parse_money(&json!(45)), 45.0);
        assert_eq!(parse_money(&json!(45.5)), 45.5);
        assert_eq!(parse_money(&json!(-3.25)), -3.25);
    }

    #[test]
    fn currency_strings_are_stripped() {
        assert_eq!(parse_money_str("$1,234.50"), 1234.50);
        assert_eq!(parse_money_str("  1,234.50 USD"), 1234.50);
        assert_eq!(parse_money_str("$ -12"), -12.0);
        assert_eq!(parse_money(&json!("45")), 45.0);
    }

    #[test]
    fn unparseable_input_defaults_to_zero() {
        assert_eq!(parse_money(&Value::Null), 0.0);
        assert_eq!(parse_money(&json!("")), 0.0);
        assert_eq!(parse_money(&json!("n/a")), 0.0);
        assert_eq!(parse_money_str("1.2.3"), 0.0);
        assert_eq!(parse_money_str("--"), 0.0);
        assert_eq!(parse_money(&json!({"amount": 5})), 0.0);
    }
}

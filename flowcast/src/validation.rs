//! Request parameter coercion and validation.
//!
//! Query strings and JSON bodies both end up here as raw [`serde_json::Value`]s. Values are
//! coerced to integers the way a lenient form handler would (`"12"`, `12`, `12.0` and `true`
//! all work) and then checked against the domain: nodes are positive, times are hours of day.

use serde_json::Value;
use thiserror::Error;

use crate::model::FeatureRow;

/// Last valid hour of day.
pub const MAX_HOUR: i64 = 23;

/// Placeholder node used when only a time point needs validating.
pub const PLACEHOLDER_NODE: i64 = 1;

/// How much checking to do beyond integer coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Presence, integer coercion and domain ranges
    Full,
    /// Presence and integer coercion only
    Lenient,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("node and time parameters are required")]
    Missing,

    #[error("node and time must be integers")]
    NotInteger,

    #[error("node and time are out of range")]
    OutOfRange,

    #[error("node must be greater than 0")]
    NodeNotPositive,

    #[error("time must be between 0 and 23")]
    TimeOutOfRange,
}

/// Validate a raw node/time pair into a feature row. Never returns a partial result.
pub fn validate_parameters(node: Option<&Value>, time: Option<&Value>, strictness: Strictness) -> Result<FeatureRow, ValidationError> {
    let (Some(node), Some(time)) = (present(node), present(time)) else {
        return Err(ValidationError::Missing);
    };
    let (node, time) = match (integer_param(node), integer_param(time)) {
        (Ok(node), Ok(time)) => (node, time),
        (Err(ValidationError::NotInteger), _) | (_, Err(ValidationError::NotInteger)) => {
            return Err(ValidationError::NotInteger);
        }
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };

    if strictness == Strictness::Full {
        if node <= 0 {
            return Err(ValidationError::NodeNotPositive);
        }
        if !(0..=MAX_HOUR).contains(&time) {
            return Err(ValidationError::TimeOutOfRange);
        }
    }

    Ok(FeatureRow::new(node, time))
}

/// Validate a batch time point by running it through the pair validator with a placeholder node.
pub fn validate_time_point(time: Option<&Value>) -> Result<i64, ValidationError> {
    let placeholder = Value::from(PLACEHOLDER_NODE);
    validate_parameters(Some(&placeholder), time, Strictness::Full).map(|row| row.time)
}

/// Coerce a JSON value to an integer, or `None` if it has no integer reading.
///
/// Floats truncate toward zero, strings are trimmed and parsed in base 10, booleans are 1/0.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            let f = n.as_f64()?.trunc();
            (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
        }
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn integer_param(value: &Value) -> Result<i64, ValidationError> {
    coerce_int(value).ok_or_else(|| {
        if is_oversized_integer(value) {
            ValidationError::OutOfRange
        } else {
            ValidationError::NotInteger
        }
    })
}

/// Whether `value` reads as an integer that does not fit in `i64`.
fn is_oversized_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(node: Value, time: Value) -> Result<FeatureRow, ValidationError> {
        validate_parameters(Some(&node), Some(&time), Strictness::Full)
    }

    #[test]
    fn test_valid_integers() {
        assert_eq!(check(json!(5), json!(8)).unwrap(), FeatureRow::new(5, 8));
        assert_eq!(check(json!(1), json!(0)).unwrap(), FeatureRow::new(1, 0));
        assert_eq!(check(json!(1), json!(23)).unwrap(), FeatureRow::new(1, 23));
    }

    #[test]
    fn test_string_values_are_coerced() {
        assert_eq!(check(json!("12"), json!(" 7 ")).unwrap(), FeatureRow::new(12, 7));
        assert_eq!(check(json!("+3"), json!("0")).unwrap(), FeatureRow::new(3, 0));
    }

    #[test]
    fn test_float_values_truncate() {
        assert_eq!(check(json!(4.9), json!(22.7)).unwrap(), FeatureRow::new(4, 22));
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(validate_parameters(None, Some(&json!(3)), Strictness::Full), Err(ValidationError::Missing));
        assert_eq!(validate_parameters(Some(&json!(3)), None, Strictness::Full), Err(ValidationError::Missing));
        assert_eq!(check(json!(null), json!(3)), Err(ValidationError::Missing));
    }

    #[test]
    fn test_non_integer_values() {
        assert_eq!(check(json!("abc"), json!(3)), Err(ValidationError::NotInteger));
        assert_eq!(check(json!(3), json!("7.5")), Err(ValidationError::NotInteger));
        assert_eq!(check(json!([1]), json!(3)), Err(ValidationError::NotInteger));
        assert_eq!(check(json!(3), json!({"h": 1})), Err(ValidationError::NotInteger));
    }

    #[test]
    fn test_oversized_integers_are_out_of_range() {
        assert_eq!(check(json!("99999999999999999999"), json!(3)), Err(ValidationError::OutOfRange));
        assert_eq!(check(json!(3), json!("-99999999999999999999")), Err(ValidationError::OutOfRange));
        assert_eq!(check(json!(1e300), json!(3)), Err(ValidationError::OutOfRange));
        assert_eq!(check(json!(u64::MAX), json!(3)), Err(ValidationError::OutOfRange));

        // A non-integer on either side wins
        assert_eq!(check(json!("99999999999999999999"), json!("x")), Err(ValidationError::NotInteger));
        assert_eq!(
            validate_parameters(Some(&json!("99999999999999999999")), Some(&json!(3)), Strictness::Lenient),
            Err(ValidationError::OutOfRange)
        );
    }

    #[test]
    fn test_node_must_be_positive() {
        assert_eq!(check(json!(0), json!(3)), Err(ValidationError::NodeNotPositive));
        assert_eq!(check(json!(-4), json!(3)), Err(ValidationError::NodeNotPositive));
    }

    #[test]
    fn test_time_must_be_an_hour_of_day() {
        assert_eq!(check(json!(1), json!(24)), Err(ValidationError::TimeOutOfRange));
        assert_eq!(check(json!(1), json!(-1)), Err(ValidationError::TimeOutOfRange));
    }

    #[test]
    fn test_lenient_skips_range_checks() {
        let row = validate_parameters(Some(&json!(0)), Some(&json!(30)), Strictness::Lenient).unwrap();
        assert_eq!(row, FeatureRow::new(0, 30));

        // Coercion still applies
        assert_eq!(
            validate_parameters(Some(&json!("x")), Some(&json!(3)), Strictness::Lenient),
            Err(ValidationError::NotInteger)
        );
    }

    #[test]
    fn test_validate_time_point() {
        assert_eq!(validate_time_point(Some(&json!("9"))), Ok(9));
        assert_eq!(validate_time_point(Some(&json!(24))), Err(ValidationError::TimeOutOfRange));
        assert_eq!(validate_time_point(None), Err(ValidationError::Missing));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int(&json!(true)), Some(1));
        assert_eq!(coerce_int(&json!(-3)), Some(-3));
        assert_eq!(coerce_int(&json!("abc")), None);
        assert_eq!(coerce_int(&json!(1e300)), None);
        assert_eq!(coerce_int(&json!(null)), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ValidationError::TimeOutOfRange.to_string(), "time must be between 0 and 23");
        assert_eq!(ValidationError::Missing.to_string(), "node and time parameters are required");
    }
}

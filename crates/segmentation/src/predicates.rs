//! Comparison operators and their evaluation semantics for rule conditions.
//!
//! Operands are coerced to the attribute's declared type before comparing.
//! Anything that does not coerce fails closed. Substring and prefix/suffix
//! matches ignore case; equality does not.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::AttributeType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    /// Sentinel for a condition whose operator has not been chosen yet.
    Unset,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    /// Operator name not recognised by this build; kept verbatim.
    Unknown(String),
}

impl Operator {
    /// Every recognised operator except the `Unset` sentinel.
    pub fn known() -> Vec<Operator> {
        vec![
            Operator::Equals,
            Operator::NotEquals,
            Operator::GreaterThan,
            Operator::GreaterThanOrEqual,
            Operator::LessThan,
            Operator::LessThanOrEqual,
            Operator::Between,
            Operator::In,
            Operator::NotIn,
            Operator::Contains,
            Operator::NotContains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::IsEmpty,
            Operator::IsNotEmpty,
        ]
    }

    pub fn parse(s: &str) -> Operator {
        match s {
            "" | "unset" => Operator::Unset,
            "equals" | "=" | "==" => Operator::Equals,
            "notEquals" | "!=" => Operator::NotEquals,
            "greaterThan" | ">" => Operator::GreaterThan,
            "greaterThanOrEqual" | ">=" => Operator::GreaterThanOrEqual,
            "lessThan" | "<" => Operator::LessThan,
            "lessThanOrEqual" | "<=" => Operator::LessThanOrEqual,
            "between" => Operator::Between,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "contains" => Operator::Contains,
            "notContains" => Operator::NotContains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "isEmpty" => Operator::IsEmpty,
            "isNotEmpty" => Operator::IsNotEmpty,
            other => Operator::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Unset => "unset",
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::IsEmpty => "isEmpty",
            Operator::IsNotEmpty => "isNotEmpty",
            Operator::Unknown(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        Operator::parse(&s)
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value coerced to an attribute's declared type.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Text(String),
    /// Integral values compare exactly, beyond the range `f64` holds.
    Integer(i128),
    Number(f64),
    Date(DateTime<Utc>),
    Bool(bool),
}

impl Scalar {
    fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Integer(a), Scalar::Integer(b)) => Some(a.cmp(b)),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Integer(a), Scalar::Number(b)) => (*a as f64).partial_cmp(b),
            (Scalar::Number(a), Scalar::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn coerce(value: &Value, ty: AttributeType) -> Option<Scalar> {
    match ty {
        AttributeType::String | AttributeType::Enum | AttributeType::Array => {
            coerce_text(value).map(Scalar::Text)
        }
        AttributeType::Number => match value {
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(Scalar::Integer)
                .or_else(|| n.as_f64().map(Scalar::Number)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i128>().ok().map(Scalar::Integer).or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite())
                        .map(Scalar::Number)
                })
            }
            _ => None,
        },
        AttributeType::Date => parse_date(value).map(Scalar::Date),
        AttributeType::Boolean => match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Scalar::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Scalar::Bool(false)),
            _ => None,
        },
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// RFC 3339 timestamps, plain `YYYY-MM-DD` dates (midnight UTC), or epoch
/// milliseconds.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Null, blank strings, and empty collections count as empty.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Apply `operator` to a resolved attribute value. `actual` is `None` when
/// the attribute is missing or null.
#[allow(clippy::unnecessary_map_or)]
pub fn compare_values(
    actual: Option<&Value>,
    operator: &Operator,
    expected: &Value,
    ty: AttributeType,
) -> bool {
    let actual = match actual.filter(|v| !v.is_null()) {
        Some(v) => v,
        None => return matches!(operator, Operator::IsEmpty),
    };

    match operator {
        Operator::IsEmpty => is_blank(actual),
        Operator::IsNotEmpty => !is_blank(actual),
        Operator::Unset | Operator::Unknown(_) => false,
        _ if ty == AttributeType::Array => compare_array(actual, operator, expected),
        Operator::Equals => ordering(actual, expected, ty) == Some(Ordering::Equal),
        Operator::NotEquals => {
            ordering(actual, expected, ty).map_or(false, |o| o != Ordering::Equal)
        }
        Operator::GreaterThan => ordering(actual, expected, ty) == Some(Ordering::Greater),
        Operator::GreaterThanOrEqual => {
            ordering(actual, expected, ty).map_or(false, |o| o != Ordering::Less)
        }
        Operator::LessThan => ordering(actual, expected, ty) == Some(Ordering::Less),
        Operator::LessThanOrEqual => {
            ordering(actual, expected, ty).map_or(false, |o| o != Ordering::Greater)
        }
        Operator::Between => between(actual, expected, ty).unwrap_or(false),
        Operator::In => in_list(actual, expected, ty).unwrap_or(false),
        Operator::NotIn => in_list(actual, expected, ty).map_or(false, |found| !found),
        Operator::Contains => {
            folded_pair(actual, expected).map_or(false, |(a, e)| a.contains(&e))
        }
        Operator::NotContains => {
            folded_pair(actual, expected).map_or(false, |(a, e)| !a.contains(&e))
        }
        Operator::StartsWith => {
            folded_pair(actual, expected).map_or(false, |(a, e)| a.starts_with(&e))
        }
        Operator::EndsWith => {
            folded_pair(actual, expected).map_or(false, |(a, e)| a.ends_with(&e))
        }
    }
}

fn ordering(actual: &Value, expected: &Value, ty: AttributeType) -> Option<Ordering> {
    let a = coerce(actual, ty)?;
    let e = coerce(expected, ty)?;
    a.compare(&e)
}

/// Inclusive range check against a `[low, high]` pair.
fn between(actual: &Value, expected: &Value, ty: AttributeType) -> Option<bool> {
    let bounds = expected.as_array().filter(|b| b.len() == 2)?;
    let a = coerce(actual, ty)?;
    let low = coerce(&bounds[0], ty)?;
    let high = coerce(&bounds[1], ty)?;
    Some(a.compare(&low)? != Ordering::Less && a.compare(&high)? != Ordering::Greater)
}

fn in_list(actual: &Value, expected: &Value, ty: AttributeType) -> Option<bool> {
    let list = expected.as_array()?;
    let a = coerce(actual, ty)?;
    Some(
        list.iter()
            .filter_map(|v| coerce(v, ty))
            .any(|candidate| candidate.compare(&a) == Some(Ordering::Equal)),
    )
}

fn folded_pair(actual: &Value, expected: &Value) -> Option<(String, String)> {
    let a = coerce_text(actual)?;
    let e = coerce_text(expected)?;
    Some((a.to_lowercase(), e.to_lowercase()))
}

/// Array attributes: element membership. Elements compare as exact text.
fn compare_array(actual: &Value, operator: &Operator, expected: &Value) -> bool {
    let elements: Vec<String> = match actual.as_array() {
        Some(items) => items.iter().filter_map(coerce_text).collect(),
        None => return false,
    };
    match operator {
        Operator::Contains => coerce_text(expected).map_or(false, |e| elements.contains(&e)),
        Operator::NotContains => coerce_text(expected).map_or(false, |e| !elements.contains(&e)),
        Operator::In | Operator::NotIn => {
            let list: Vec<String> = match expected.as_array() {
                Some(items) => items.iter().filter_map(coerce_text).collect(),
                None => return false,
            };
            let any = elements.iter().any(|e| list.contains(e));
            if *operator == Operator::In {
                any
            } else {
                !any
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_names_and_aliases() {
        assert_eq!(Operator::parse(">="), Operator::GreaterThanOrEqual);
        assert_eq!(Operator::parse("=="), Operator::Equals);
        assert_eq!(Operator::parse("notIn").as_str(), "notIn");
        let custom = Operator::parse("withinRadius");
        assert_eq!(custom, Operator::Unknown("withinRadius".into()));
        assert_eq!(custom.to_string(), "withinRadius");
        assert_eq!(serde_json::to_value(Operator::IsEmpty).unwrap(), json!("isEmpty"));
    }

    #[test]
    fn test_missing_value_is_false_except_is_empty() {
        for op in Operator::known() {
            let expected = op == Operator::IsEmpty;
            assert_eq!(
                compare_values(None, &op, &json!("x"), AttributeType::String),
                expected,
                "{op}"
            );
            assert_eq!(
                compare_values(Some(&Value::Null), &op, &json!(1), AttributeType::Number),
                expected,
                "{op}"
            );
        }
    }

    #[test]
    fn test_numeric_coercion() {
        let ty = AttributeType::Number;
        assert!(compare_values(Some(&json!(72)), &Operator::GreaterThanOrEqual, &json!(50), ty));
        assert!(compare_values(Some(&json!("72")), &Operator::GreaterThan, &json!("50.5"), ty));
        assert!(compare_values(Some(&json!(50)), &Operator::Equals, &json!("50"), ty));
        // Not coercible: every comparison fails closed.
        assert!(!compare_values(Some(&json!("high")), &Operator::GreaterThan, &json!(1), ty));
        assert!(!compare_values(Some(&json!("high")), &Operator::LessThan, &json!(1), ty));
        assert!(!compare_values(Some(&json!("high")), &Operator::NotEquals, &json!(1), ty));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let ty = AttributeType::Number;
        let big = json!(9007199254740993u64);
        assert!(!compare_values(Some(&big), &Operator::Equals, &json!(9007199254740992u64), ty));
        assert!(compare_values(Some(&big), &Operator::NotEquals, &json!(9007199254740992u64), ty));
        assert!(compare_values(Some(&big), &Operator::GreaterThan, &json!("9007199254740992"), ty));
        assert!(compare_values(Some(&big), &Operator::Equals, &json!("9007199254740993"), ty));
        assert!(!compare_values(Some(&big), &Operator::In, &json!([9007199254740992u64]), ty));
        assert!(compare_values(Some(&json!(u64::MAX)), &Operator::GreaterThan, &json!(i64::MAX), ty));
        // Mixed integer and fractional operands still compare numerically.
        assert!(compare_values(Some(&json!(50)), &Operator::LessThan, &json!(50.5), ty));
        assert!(compare_values(Some(&json!(50.0)), &Operator::Equals, &json!(50), ty));
    }

    #[test]
    fn test_between_is_inclusive() {
        let ty = AttributeType::Number;
        let range = json!([10, 20]);
        assert!(compare_values(Some(&json!(10)), &Operator::Between, &range, ty));
        assert!(compare_values(Some(&json!(20)), &Operator::Between, &range, ty));
        assert!(!compare_values(Some(&json!(21)), &Operator::Between, &range, ty));
        assert!(!compare_values(Some(&json!(15)), &Operator::Between, &json!([10]), ty));
        assert!(!compare_values(Some(&json!(15)), &Operator::Between, &json!([10, null]), ty));
    }

    #[test]
    fn test_dates() {
        let ty = AttributeType::Date;
        let hired = json!("2023-04-01T09:30:00Z");
        assert!(compare_values(Some(&hired), &Operator::GreaterThan, &json!("2023-01-01"), ty));
        assert!(compare_values(
            Some(&hired),
            &Operator::Between,
            &json!(["2023-01-01", "2023-12-31"]),
            ty
        ));
        assert!(compare_values(
            Some(&json!("2024-02-29")),
            &Operator::Equals,
            &json!("2024-02-29T00:00:00+00:00"),
            ty
        ));
        assert!(!compare_values(Some(&json!("last week")), &Operator::LessThan, &json!("2023-01-01"), ty));
    }

    #[test]
    fn test_string_matching_ignores_case_but_equality_does_not() {
        let ty = AttributeType::String;
        let title = json!("Senior Warehouse Associate");
        assert!(compare_values(Some(&title), &Operator::Contains, &json!("warehouse"), ty));
        assert!(compare_values(Some(&title), &Operator::StartsWith, &json!("SENIOR"), ty));
        assert!(compare_values(Some(&title), &Operator::EndsWith, &json!("associate"), ty));
        assert!(!compare_values(Some(&title), &Operator::NotContains, &json!("WAREHOUSE"), ty));
        assert!(!compare_values(Some(&title), &Operator::Equals, &json!("senior warehouse associate"), ty));

        // Numbers stored on a string attribute match as their text.
        let phone = json!(447700900123u64);
        assert!(compare_values(Some(&phone), &Operator::Equals, &json!("447700900123"), ty));
        assert!(compare_values(Some(&phone), &Operator::StartsWith, &json!("4477"), ty));
        assert!(compare_values(Some(&phone), &Operator::EndsWith, &json!(123), ty));
        assert!(compare_values(Some(&phone), &Operator::Contains, &json!("7009"), ty));
        assert!(!compare_values(Some(&json!({"n": 1})), &Operator::Contains, &json!("n"), ty));
    }

    #[test]
    fn test_set_membership() {
        let ty = AttributeType::Enum;
        let list = json!(["active", "on_leave"]);
        assert!(compare_values(Some(&json!("active")), &Operator::In, &list, ty));
        assert!(!compare_values(Some(&json!("terminated")), &Operator::In, &list, ty));
        assert!(compare_values(Some(&json!("terminated")), &Operator::NotIn, &list, ty));
        assert!(!compare_values(Some(&json!("active")), &Operator::In, &json!("active"), ty));
    }

    #[test]
    fn test_boolean_coercion() {
        let ty = AttributeType::Boolean;
        assert!(compare_values(Some(&json!(true)), &Operator::Equals, &json!("true"), ty));
        assert!(compare_values(Some(&json!("FALSE")), &Operator::NotEquals, &json!(true), ty));
        assert!(!compare_values(Some(&json!("yes")), &Operator::Equals, &json!(true), ty));
    }

    #[test]
    fn test_array_attributes() {
        let ty = AttributeType::Array;
        let tags = json!(["forklift", "night_shift"]);
        assert!(compare_values(Some(&tags), &Operator::Contains, &json!("forklift"), ty));
        assert!(compare_values(Some(&tags), &Operator::NotContains, &json!("driver"), ty));
        assert!(compare_values(Some(&tags), &Operator::In, &json!(["driver", "night_shift"]), ty));
        assert!(compare_values(Some(&tags), &Operator::NotIn, &json!(["driver"]), ty));
        assert!(!compare_values(Some(&json!("forklift")), &Operator::Contains, &json!("forklift"), ty));
        assert!(compare_values(Some(&json!([])), &Operator::IsEmpty, &Value::Null, ty));
    }
}

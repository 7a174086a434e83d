//! Request matching logic.
//!
//! Evaluates a stub's input rule against the data of an incoming find
//! request. Values are plain `serde_json::Value`s, so every rule kind
//! dispatches on the concrete JSON variant.

use crate::error::MatchError;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// The three ways a rule mapping can be compared with request data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Every listed field is deep-equal
    Equals,
    /// Every listed field contains the rule value
    Contains,
    /// Every listed field matches the rule value as a regex
    Matches,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Equals => "equals",
            RuleKind::Contains => "contains",
            RuleKind::Matches => "matches",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate one rule against request data.
///
/// An empty rule matches any data. Errors are reserved for rules that
/// cannot be evaluated at all; a plain mismatch is `Ok(false)`.
pub fn evaluate(
    kind: RuleKind,
    rule: &Map<String, Value>,
    data: &Map<String, Value>,
) -> Result<bool, MatchError> {
    match kind {
        RuleKind::Equals => Ok(equals(rule, data)),
        RuleKind::Contains => Ok(contains(rule, data)),
        RuleKind::Matches => matches(rule, data),
    }
}

fn equals(rule: &Map<String, Value>, data: &Map<String, Value>) -> bool {
    rule.iter().all(|(field, expected)| {
        data.get(field).is_some_and(|actual| values_equal(expected, actual))
    })
}

fn contains(rule: &Map<String, Value>, data: &Map<String, Value>) -> bool {
    rule.iter().all(|(field, expected)| {
        data.get(field).is_some_and(|actual| value_contains(actual, expected))
    })
}

fn matches(rule: &Map<String, Value>, data: &Map<String, Value>) -> Result<bool, MatchError> {
    for (field, expected) in rule {
        // Pattern errors surface even when the field is absent.
        let pattern = match expected {
            Value::String(pattern) => pattern,
            other => {
                return Err(MatchError::NonStringPattern {
                    field: field.clone(),
                    value: other.clone(),
                })
            }
        };
        let regex = Regex::new(pattern).map_err(|source| MatchError::InvalidPattern {
            field: field.clone(),
            pattern: pattern.clone(),
            source,
        })?;

        match data.get(field) {
            Some(actual) if regex.is_match(&string_form(actual)) => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

/// Containment by variant: substring for strings, membership for arrays,
/// subset for objects. Anything else does not contain anything.
fn value_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, expected)),
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .is_some_and(|candidate| values_equal(value, candidate))
        }),
        _ => false,
    }
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// String form used for regex matching: strings as-is, everything else
/// as compact JSON.
fn string_form(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

/// Upper-case the first character of every whitespace-separated word.
///
/// The rest of each word and all whitespace are left untouched, so
/// `sayHello` becomes `SayHello` and `get user` becomes `Get User`.
pub fn normalize_method(method: &str) -> String {
    let mut normalized = String::with_capacity(method.len());
    let mut word_start = true;

    for ch in method.chars() {
        if ch.is_whitespace() {
            word_start = true;
            normalized.push(ch);
        } else if word_start {
            normalized.extend(ch.to_uppercase());
            word_start = false;
        } else {
            normalized.push(ch);
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_equals_ignores_extra_keys() {
        let rule = map(json!({"name": "bob"}));
        let data = map(json!({"name": "bob", "age": 42}));
        assert!(evaluate(RuleKind::Equals, &rule, &data).unwrap());
    }

    #[test]
    fn test_equals_requires_every_key() {
        let rule = map(json!({"name": "bob", "age": 42}));
        let data = map(json!({"name": "bob"}));
        assert!(!evaluate(RuleKind::Equals, &rule, &data).unwrap());

        let data = map(json!({"name": "bob", "age": 43}));
        assert!(!evaluate(RuleKind::Equals, &rule, &data).unwrap());
    }

    #[test]
    fn test_equals_deep_values() {
        let rule = map(json!({"user": {"tags": ["a", "b"], "id": 1}}));
        let data = map(json!({"user": {"id": 1.0, "tags": ["a", "b"]}}));
        assert!(evaluate(RuleKind::Equals, &rule, &data).unwrap());

        // Nested objects compare as a whole, not as a subset
        let data = map(json!({"user": {"id": 1, "tags": ["a", "b"], "extra": true}}));
        assert!(!evaluate(RuleKind::Equals, &rule, &data).unwrap());
    }

    #[test]
    fn test_empty_rule_matches_anything() {
        let rule = Map::new();
        let data = map(json!({"anything": [1, 2, 3]}));
        for kind in [RuleKind::Equals, RuleKind::Contains, RuleKind::Matches] {
            assert!(evaluate(kind, &rule, &data).unwrap(), "{kind}");
            assert!(evaluate(kind, &rule, &Map::new()).unwrap(), "{kind}");
        }
    }

    #[test]
    fn test_contains_substring() {
        let rule = map(json!({"greeting": "ell"}));
        assert!(evaluate(RuleKind::Contains, &rule, &map(json!({"greeting": "hello"}))).unwrap());
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"greeting": "howdy"}))).unwrap());
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"other": "hello"}))).unwrap());
    }

    #[test]
    fn test_contains_array_element() {
        let rule = map(json!({"ids": 2}));
        assert!(evaluate(RuleKind::Contains, &rule, &map(json!({"ids": [1, 2, 3]}))).unwrap());
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"ids": [4, 5]}))).unwrap());

        let rule = map(json!({"pairs": ["a", 1]}));
        assert!(
            evaluate(RuleKind::Contains, &rule, &map(json!({"pairs": [["a", 1], ["b", 2]]})))
                .unwrap()
        );
    }

    #[test]
    fn test_contains_object_subset() {
        let rule = map(json!({"user": {"name": "bob"}}));
        let data = map(json!({"user": {"name": "bob", "age": 42}}));
        assert!(evaluate(RuleKind::Contains, &rule, &data).unwrap());

        let data = map(json!({"user": {"name": "alice", "age": 42}}));
        assert!(!evaluate(RuleKind::Contains, &rule, &data).unwrap());
    }

    #[test]
    fn test_contains_mismatched_types_is_no_match() {
        let rule = map(json!({"count": 4}));
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"count": 4}))).unwrap());
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"count": "4"}))).unwrap());

        let rule = map(json!({"user": "bob"}));
        assert!(!evaluate(RuleKind::Contains, &rule, &map(json!({"user": {"bob": 1}}))).unwrap());
    }

    #[test]
    fn test_matches_regex() {
        let rule = map(json!({"email": "^[a-z]+@example\\.com$"}));
        assert!(
            evaluate(RuleKind::Matches, &rule, &map(json!({"email": "bob@example.com"}))).unwrap()
        );
        assert!(
            !evaluate(RuleKind::Matches, &rule, &map(json!({"email": "bob@example.org"}))).unwrap()
        );
        assert!(!evaluate(RuleKind::Matches, &rule, &map(json!({}))).unwrap());
    }

    #[test]
    fn test_matches_uses_string_form_of_non_strings() {
        let rule = map(json!({"age": "^4\\d$", "active": "true"}));
        let data = map(json!({"age": 42, "active": true}));
        assert!(evaluate(RuleKind::Matches, &rule, &data).unwrap());

        let data = map(json!({"age": 52, "active": true}));
        assert!(!evaluate(RuleKind::Matches, &rule, &data).unwrap());
    }

    #[test]
    fn test_matches_invalid_pattern_is_error() {
        let rule = map(json!({"name": "(unclosed"}));
        let err = evaluate(RuleKind::Matches, &rule, &map(json!({"name": "x"}))).unwrap_err();
        assert!(matches!(err, MatchError::InvalidPattern { ref field, .. } if field == "name"));

        // Missing data does not mask the broken pattern
        assert!(evaluate(RuleKind::Matches, &rule, &Map::new()).is_err());
    }

    #[test]
    fn test_matches_non_string_pattern_is_error() {
        let rule = map(json!({"age": 42}));
        let err = evaluate(RuleKind::Matches, &rule, &map(json!({"age": 42}))).unwrap_err();
        assert!(matches!(err, MatchError::NonStringPattern { .. }));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(1), &json!(2)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert!(values_equal(&json!(null), &json!(null)));
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("sayHello"), "SayHello");
        assert_eq!(normalize_method("SayHello"), "SayHello");
        assert_eq!(normalize_method("get user"), "Get User");
        assert_eq!(normalize_method("  two  spaces"), "  Two  Spaces");
        assert_eq!(normalize_method("v2Call"), "V2Call");
        assert_eq!(normalize_method("2fa"), "2fa");
        assert_eq!(normalize_method("éclair"), "Éclair");
        assert_eq!(normalize_method(""), "");
    }

    #[test]
    fn test_rule_kind_display() {
        assert_eq!(RuleKind::Equals.to_string(), "equals");
        assert_eq!(RuleKind::Contains.as_str(), "contains");
        assert_eq!(RuleKind::Matches.to_string(), "matches");
    }
}

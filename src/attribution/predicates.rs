//! Predicates that pick the right entry among same-kind candidates.

use serde_json::Value;

use super::lookup::Predicate;
use crate::models::audit::AuditEntry;
use crate::models::Snowflake;

/// Entry must record `key` changing from `before` to `after`.
///
/// Absent and `null` values compare equal to `None`. Numbers and numeric
/// strings compare by value, since permission bit sets are sent as strings.
#[must_use]
pub fn match_attr(key: &str, before: Option<Value>, after: Option<Value>) -> Predicate {
    let key = key.to_owned();
    Box::new(move |entry: &AuditEntry| {
        values_equal(entry.before(&key), before.as_ref())
            && values_equal(entry.after(&key), after.as_ref())
    })
}

/// Entry must add `role_id` to the member.
#[must_use]
pub fn role_added(role_id: Snowflake) -> Predicate {
    Box::new(move |entry: &AuditEntry| lists_role(entry.after("$add"), role_id))
}

/// Entry must remove `role_id` from the member.
#[must_use]
pub fn role_removed(role_id: Snowflake) -> Predicate {
    Box::new(move |entry: &AuditEntry| lists_role(entry.after("$remove"), role_id))
}

fn lists_role(roles: Option<&Value>, role_id: Snowflake) -> bool {
    roles
        .and_then(Value::as_array)
        .is_some_and(|roles| {
            roles.iter().any(|role| {
                role.get("id")
                    .and_then(as_u64)
                    .is_some_and(|id| id == role_id.0)
            })
        })
}

fn values_equal(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let expected = expected.filter(|value| !value.is_null());
    match (actual, expected) {
        (None, None) => true,
        (Some(actual), Some(expected)) => {
            actual == expected
                || matches!((as_u64(actual), as_u64(expected)), (Some(a), Some(b)) if a == b)
        }
        _ => false,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

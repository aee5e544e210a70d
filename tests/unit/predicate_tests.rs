use serde_json::json;

use modwatch::attribution::predicates::{match_attr, role_added, role_removed};
use modwatch::models::audit::AuditAction;
use modwatch::models::Snowflake;

use super::test_helpers::entry;

#[test]
fn match_attr_requires_both_values() {
    let check = match_attr("name", Some(json!("old")), Some(json!("new")));

    let exact = entry(AuditAction::RoleUpdate, 1, 2).with_change("name", Some(json!("old")), Some(json!("new")));
    let wrong_after = entry(AuditAction::RoleUpdate, 1, 2).with_change("name", Some(json!("old")), Some(json!("other")));
    let other_key = entry(AuditAction::RoleUpdate, 1, 2).with_change("color", Some(json!("old")), Some(json!("new")));

    assert!(check(&exact));
    assert!(!check(&wrong_after));
    assert!(!check(&other_key));
}

#[test]
fn match_attr_treats_null_as_absent() {
    let cleared = match_attr("nick", Some(json!("bob")), None);

    assert!(cleared(&entry(AuditAction::MemberUpdate, 1, 2).with_change("nick", Some(json!("bob")), None)));
    assert!(cleared(&entry(AuditAction::MemberUpdate, 1, 2).with_change(
        "nick",
        Some(json!("bob")),
        Some(json!(null))
    )));

    let null_expected = match_attr("nick", Some(json!(null)), Some(json!("bob")));
    assert!(null_expected(&entry(AuditAction::MemberUpdate, 1, 2).with_change("nick", None, Some(json!("bob")))));
}

#[test]
fn match_attr_compares_numeric_strings_by_value() {
    let check = match_attr("permissions", Some(json!(8)), Some(json!(2_048)));

    let stringly = entry(AuditAction::RoleUpdate, 1, 2).with_change(
        "permissions",
        Some(json!("8")),
        Some(json!("2048")),
    );
    assert!(check(&stringly));
}

#[test]
fn role_added_inspects_add_list() {
    let role = Snowflake(77);
    let added = entry(AuditAction::MemberRoleUpdate, 1, 2).with_change(
        "$add",
        None,
        Some(json!([{ "id": "77", "name": "muted" }, { "id": "78", "name": "vip" }])),
    );
    let removed = entry(AuditAction::MemberRoleUpdate, 1, 2).with_change(
        "$remove",
        None,
        Some(json!([{ "id": "77", "name": "muted" }])),
    );

    assert!(role_added(role)(&added));
    assert!(!role_added(Snowflake(79))(&added));
    assert!(!role_added(role)(&removed));
    assert!(role_removed(role)(&removed));
    assert!(!role_removed(role)(&added));
}

#[test]
fn role_predicates_reject_malformed_lists() {
    let malformed = entry(AuditAction::MemberRoleUpdate, 1, 2).with_change("$add", None, Some(json!("77")));
    assert!(!role_added(Snowflake(77))(&malformed));
}

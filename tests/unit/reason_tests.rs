use modwatch::attribution::ReasonParser;
use modwatch::models::audit::{AuditAction, AuditEntry, UserRef};
use modwatch::models::Snowflake;

const HUMAN: u64 = 123_456_789_012_345_678;

fn by_bot(reason: &str) -> AuditEntry {
    AuditEntry::new(Snowflake(1), AuditAction::MemberKick)
        .with_target(Snowflake(42))
        .with_user(UserRef {
            id: Snowflake(9),
            name: "helper".into(),
            bot: true,
        })
        .with_reason(reason)
}

#[test]
fn parses_action_by_format() {
    let parser = ReasonParser::new().unwrap();
    let entry = parser.reattribute(by_bot("Action by Alice#0001 (123456789012345678): spamming links"));

    let user = entry.user.unwrap();
    assert_eq!(user.id, Snowflake(HUMAN));
    assert_eq!(user.name, "Alice#0001");
    assert!(!user.bot);
    assert_eq!(entry.reason.as_deref(), Some("spamming links"));
}

#[test]
fn parses_bracketed_moderator_format() {
    let parser = ReasonParser::new().unwrap();
    let entry = parser.reattribute(by_bot("[Moderator: Bob (123456789012345678)] being rude"));

    assert_eq!(entry.user.unwrap().name, "Bob");
    assert_eq!(entry.reason.as_deref(), Some("being rude"));
}

#[test]
fn parses_plain_name_and_id_format() {
    let parser = ReasonParser::new().unwrap();
    let entry = parser.reattribute(by_bot("Carol (123456789012345678)"));

    assert_eq!(entry.user.unwrap().id, Snowflake(HUMAN));
    assert_eq!(entry.reason, None, "empty reason reads as absent");
}

#[test]
fn leaves_human_entries_alone() {
    let parser = ReasonParser::new().unwrap();
    let mut entry = by_bot("Action by Alice#0001 (123456789012345678): spam");
    entry.user = Some(UserRef {
        id: Snowflake(5),
        name: "dave".into(),
        bot: false,
    });

    assert_eq!(parser.reattribute(entry.clone()), entry);
}

#[test]
fn leaves_unrecognised_reasons_alone() {
    let parser = ReasonParser::new().unwrap();
    let entry = by_bot("automatic raid protection");

    assert_eq!(parser.reattribute(entry.clone()), entry);
}

#[test]
fn leaves_entries_without_reason_alone() {
    let parser = ReasonParser::new().unwrap();
    let mut entry = by_bot("x");
    entry.reason = None;

    assert_eq!(parser.reattribute(entry.clone()), entry);
}

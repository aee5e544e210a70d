//! End-to-end attribution of raw notifications through the driver.

use serde_json::json;

use modwatch::models::audit::{AuditAction, UserRef};
use modwatch::models::event::{ChannelChange, EventKind, EventPayload, RoleChange};
use modwatch::models::raw::{ChannelSnapshot, MemberSnapshot, RawEvent};
use modwatch::models::Snowflake;
use modwatch::platform::GuildDirectory;

use super::test_helpers::{entry, harness, member, moderator, role, user, GUILD};

#[tokio::test(start_paused = true)]
async fn ban_is_attributed_to_moderator() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberBan {
        guild_id: GUILD,
        user: user(42),
    });
    h.feed.push(entry(AuditAction::MemberBanAdd, Snowflake(42)).with_reason("raiding"));

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberBan);
    assert_eq!(event.attribution.moderator, Some(moderator()));
    assert_eq!(event.attribution.reason.as_deref(), Some("raiding"));
}

#[tokio::test(start_paused = true)]
async fn unban_without_entry_is_dispatched_unattributed() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberUnban {
        guild_id: GUILD,
        user: user(42),
    });

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberUnban);
    assert!(!event.attribution.is_known());
    assert!(h.feed.fetch_count() >= 1);
}

#[tokio::test(start_paused = true)]
async fn confirmed_kick_is_dispatched() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: user(42),
    });
    h.feed.push(entry(AuditAction::MemberKick, Snowflake(42)));

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberKick);
    assert!(event.attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn voluntary_leave_is_not_reported_as_kick() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: user(42),
    });

    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn removal_of_the_bot_itself_is_ignored() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: UserRef::from_id(super::test_helpers::BOT),
    });
    h.feed.push(entry(AuditAction::MemberKick, super::test_helpers::BOT));

    h.assert_quiet().await;
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn nick_change_matches_on_values() {
    let mut h = harness();
    let before = member(42, Vec::new());
    let after = MemberSnapshot {
        nick: Some("shiny".into()),
        ..member(42, Vec::new())
    };
    h.driver.handle(RawEvent::MemberUpdate {
        guild_id: GUILD,
        before,
        after,
    });
    h.feed.push(
        entry(AuditAction::MemberUpdate, Snowflake(42)).with_change("nick", None, Some(json!("shiny"))),
    );

    let event = h.next_event().await.unwrap();
    assert!(matches!(
        &event.payload,
        EventPayload::NickChange { before: None, after: Some(after), .. } if after == "shiny"
    ));
    assert!(event.attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn role_update_fans_out_per_attribute() {
    let mut h = harness();
    let before = role(Snowflake(55), "a");
    let after = modwatch::models::raw::RoleSnapshot {
        name: "b".into(),
        color: 255,
        ..role(Snowflake(55), "a")
    };
    h.driver.handle(RawEvent::RoleUpdate {
        guild_id: GUILD,
        before,
        after,
    });
    h.feed.push(
        entry(AuditAction::RoleUpdate, Snowflake(55))
            .with_change("name", Some(json!("a")), Some(json!("b")))
            .with_change("color", Some(json!(0)), Some(json!(255))),
    );

    let mut events = h.events(2).await;
    events.sort_by_key(|event| event.kind().as_str());

    assert_eq!(events[0].kind(), EventKind::RoleColorUpdate);
    assert_eq!(events[1].kind(), EventKind::RoleNameUpdate);
    assert!(events.iter().all(|event| event.attribution.moderator == Some(moderator())));
    assert!(matches!(
        &events[1].payload,
        EventPayload::RoleUpdate { change: RoleChange::Name { after, .. }, .. } if after == "b"
    ));
    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn channel_slowmode_uses_platform_key() {
    let mut h = harness();
    let before = ChannelSnapshot {
        id: Snowflake(9),
        name: "general".into(),
        slowmode_delay: 0,
    };
    let after = ChannelSnapshot {
        slowmode_delay: 30,
        ..before.clone()
    };
    h.driver.handle(RawEvent::ChannelUpdate {
        guild_id: GUILD,
        before,
        after,
    });
    h.feed.push(
        entry(AuditAction::ChannelUpdate, Snowflake(9))
            .with_change("rate_limit_per_user", Some(json!(0)), Some(json!(30))),
    );

    let event = h.next_event().await.unwrap();
    assert!(matches!(
        event.payload,
        EventPayload::ChannelUpdate {
            change: ChannelChange::SlowmodeDelay { before: 0, after: 30 },
            ..
        }
    ));
    assert!(event.attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn managed_role_changes_skip_the_audit_log() {
    let mut h = harness();
    let managed = modwatch::models::raw::RoleSnapshot {
        managed: true,
        ..role(Snowflake(88), "Booster")
    };
    h.driver.handle(RawEvent::MemberUpdate {
        guild_id: GUILD,
        before: member(42, Vec::new()),
        after: member(42, vec![managed]),
    });

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::RoleAdd);
    assert!(!event.attribution.is_known());
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn mute_role_add_derives_attributed_mute() {
    let mut h = harness();
    let mute = role(super::test_helpers::MUTE_ROLE, "muted");
    h.driver.handle(RawEvent::MemberUpdate {
        guild_id: GUILD,
        before: member(42, Vec::new()),
        after: member(42, vec![mute]),
    });
    h.feed.push(entry(AuditAction::MemberRoleUpdate, Snowflake(42)).with_change(
        "$add",
        None,
        Some(json!([{ "id": "66", "name": "muted" }])),
    ));

    let events = h.events(2).await;
    assert_eq!(events[0].kind(), EventKind::RoleAdd);
    assert_eq!(events[1].kind(), EventKind::MemberMute);
    assert_eq!(events[1].key(), vec![GUILD.0, 42]);
    assert_eq!(events[1].attribution, events[0].attribution);
    assert!(events[1].attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn mute_role_removal_derives_unmute() {
    let mut h = harness();
    let mute = role(super::test_helpers::MUTE_ROLE, "muted");
    h.driver.handle(RawEvent::MemberUpdate {
        guild_id: GUILD,
        before: member(42, vec![mute]),
        after: member(42, Vec::new()),
    });
    h.feed.push(entry(AuditAction::MemberRoleUpdate, Snowflake(42)).with_change(
        "$remove",
        None,
        Some(json!([{ "id": "66", "name": "muted" }])),
    ));

    let events = h.events(2).await;
    assert_eq!(events[0].kind(), EventKind::RoleRemove);
    assert_eq!(events[1].kind(), EventKind::MemberUnmute);
}

#[tokio::test(start_paused = true)]
async fn human_join_needs_no_lookup() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberJoin {
        guild_id: GUILD,
        member: member(42, Vec::new()),
    });

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberJoin);
    assert!(!event.attribution.is_known());
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn bot_join_is_attributed_with_its_roles() {
    let mut h = harness();
    let bot = MemberSnapshot {
        user: UserRef {
            id: Snowflake(500),
            name: "helper".into(),
            bot: true,
        },
        nick: None,
        roles: vec![role(GUILD, "@everyone"), role(Snowflake(77), "helper")],
    };
    h.driver.handle(RawEvent::MemberJoin {
        guild_id: GUILD,
        member: bot,
    });
    h.feed.push(entry(AuditAction::BotAdd, Snowflake(500)));

    let events = h.events(2).await;
    assert_eq!(events[0].kind(), EventKind::MemberJoin);
    assert_eq!(events[1].kind(), EventKind::RoleAdd);
    assert_eq!(events[1].key(), vec![500, 77], "default role is skipped");
    assert!(events.iter().all(|event| event.attribution.is_known()));
    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn guild_without_audit_access_dispatches_unattributed() {
    let mut h = harness();
    h.driver.handle(RawEvent::GuildAvailable {
        guild_id: GUILD,
        audit_log_access: false,
    });
    h.driver.handle(RawEvent::ChannelCreate {
        guild_id: GUILD,
        channel: ChannelSnapshot {
            id: Snowflake(9),
            name: "new".into(),
            slowmode_delay: 0,
        },
    });

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::ChannelCreate);
    assert!(!event.attribution.is_known());
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn guild_removal_cancels_outstanding_lookups() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberBan {
        guild_id: GUILD,
        user: user(42),
    });
    h.driver.handle(RawEvent::GuildRemove { guild_id: GUILD });

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberBan);
    assert!(!event.attribution.is_known());
    assert!(!h.guilds.is_available(GUILD));
    assert_eq!(h.feed.fetch_count(), 0);
}

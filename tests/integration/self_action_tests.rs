//! Echo suppression of the bot's own actions and the kick/ban race.

use std::time::Duration;

use modwatch::dispatch::SelfAction;
use modwatch::emitter::format_event;
use modwatch::models::audit::AuditAction;
use modwatch::models::event::{EventKind, EventPayload, Infraction};
use modwatch::models::raw::RawEvent;
use modwatch::models::Snowflake;

use super::test_helpers::{entry, harness, member, moderator, role, user, GUILD, MUTE_ROLE};

fn self_action(infraction: Infraction) -> SelfAction {
    SelfAction {
        guild_id: GUILD,
        infraction,
        user: user(42),
        moderator: moderator(),
        reason: Some("rule 3".into()),
    }
}

#[tokio::test(start_paused = true)]
async fn self_ban_is_reported_once_with_known_moderator() {
    let mut h = harness();
    let action = self_action(Infraction::Ban);

    h.driver.prepare_self_action(&action);
    // The platform echoes the ban and the accompanying removal.
    h.driver.handle(RawEvent::MemberBan {
        guild_id: GUILD,
        user: user(42),
    });
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: user(42),
    });
    h.feed.push(entry(AuditAction::MemberBanAdd, Snowflake(42)));
    h.driver.complete_self_action(action).await;

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberBan);
    assert_eq!(event.attribution.moderator, Some(moderator()));
    assert_eq!(event.attribution.reason.as_deref(), Some("rule 3"));

    h.assert_quiet().await;
    assert_eq!(h.feed.fetch_count(), 0, "suppressed echoes never query the audit log");
}

#[tokio::test(start_paused = true)]
async fn self_mute_reports_role_and_mute_once() {
    let mut h = harness();
    let action = self_action(Infraction::Mute);

    h.driver.prepare_self_action(&action);
    h.driver.handle(RawEvent::MemberUpdate {
        guild_id: GUILD,
        before: member(42, Vec::new()),
        after: member(42, vec![role(MUTE_ROLE, "muted")]),
    });
    h.driver.complete_self_action(action).await;

    let events = h.events(2).await;
    assert_eq!(events[0].kind(), EventKind::RoleAdd);
    assert_eq!(events[1].kind(), EventKind::MemberMute);
    assert!(events.iter().all(|event| event.attribution.moderator == Some(moderator())));

    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn markers_expire_after_the_window() {
    let mut h = harness();
    h.driver.prepare_self_action(&self_action(Infraction::Unban));
    assert!(h.driver.is_self_caused(GUILD, EventKind::MemberUnban, &[GUILD.0, 42]));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!h.driver.is_self_caused(GUILD, EventKind::MemberUnban, &[GUILD.0, 42]));

    // A later unban by someone else is attributed normally.
    h.driver.handle(RawEvent::MemberUnban {
        guild_id: GUILD,
        user: user(42),
    });
    h.feed.push(entry(AuditAction::MemberBanRemove, Snowflake(42)));

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberUnban);
    assert!(event.attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn marked_event_is_dropped_without_lookup() {
    let mut h = harness();
    h.driver.mark_self_caused(GUILD, EventKind::ChannelDelete, vec![9]);
    h.driver.handle(RawEvent::ChannelDelete {
        guild_id: GUILD,
        channel: modwatch::models::raw::ChannelSnapshot {
            id: Snowflake(9),
            name: "old".into(),
            slowmode_delay: 0,
        },
    });

    h.assert_quiet().await;
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn ban_after_removal_supersedes_kick() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: user(42),
    });
    h.driver.handle(RawEvent::MemberBan {
        guild_id: GUILD,
        user: user(42),
    });
    h.feed.push(entry(AuditAction::MemberBanAdd, Snowflake(42)));

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberBan);
    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn ban_before_removal_suppresses_kick() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberBan {
        guild_id: GUILD,
        user: user(42),
    });
    h.driver.handle(RawEvent::MemberRemove {
        guild_id: GUILD,
        user: user(42),
    });
    // A stray kick entry for the same member must not surface a kick.
    h.feed.push(entry(AuditAction::MemberKick, Snowflake(42)));
    h.feed.push(entry(AuditAction::MemberBanAdd, Snowflake(42)));

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberBan);
    h.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_resolves_pending_lookups() {
    let mut h = harness();
    h.driver.handle(RawEvent::MemberUnban {
        guild_id: GUILD,
        user: user(42),
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.driver.correlator().pending_count(GUILD), 1);

    h.driver.shutdown();

    let event = h.next_event().await.unwrap();
    assert_eq!(event.kind(), EventKind::MemberUnban);
    assert!(!event.attribution.is_known());
}

#[tokio::test(start_paused = true)]
async fn self_mute_names_the_mute_role_once_seen() {
    let mut h = harness();
    // Any snapshot carrying the mute role teaches its name.
    h.driver.handle(RawEvent::RoleUpdate {
        guild_id: GUILD,
        before: role(MUTE_ROLE, "muted"),
        after: role(MUTE_ROLE, "silenced"),
    });
    tokio::time::sleep(Duration::from_secs(30)).await;
    while h.events.try_recv().is_ok() {}

    let action = self_action(Infraction::Mute);
    h.driver.prepare_self_action(&action);
    h.driver.complete_self_action(action).await;

    let event = h.next_event().await.unwrap();
    assert!(matches!(
        &event.payload,
        EventPayload::RoleAdd { role, .. } if role.id == MUTE_ROLE && role.name == "silenced"
    ));
    assert_eq!(
        format_event(&event),
        "role_add: user42 (42) +@silenced (66) by alice (7): rule 3"
    );
}

#[tokio::test(start_paused = true)]
async fn self_mute_before_any_snapshot_renders_role_id() {
    let mut h = harness();
    let action = self_action(Infraction::Mute);
    h.driver.prepare_self_action(&action);
    h.driver.complete_self_action(action).await;

    let event = h.next_event().await.unwrap();
    assert_eq!(format_event(&event), "role_add: user42 (42) +@66 by alice (7): rule 3");
}

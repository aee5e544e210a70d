//! One-line plain text rendering of attributed events.

use crate::models::audit::UserRef;
use crate::models::event::{
    ChannelChange, ChannelRef, DomainEvent, EventPayload, RoleChange, RoleRef,
};

/// Render `event` as a single log line.
///
/// ```text
/// member_ban: spammer (42) by alice (7): raiding
/// ```
#[must_use]
pub fn format_event(event: &DomainEvent) -> String {
    let mut line = format!("{}: {}", event.kind().as_str(), describe(&event.payload));

    if let Some(moderator) = &event.attribution.moderator {
        line.push_str(" by ");
        line.push_str(&user(moderator));
    }
    if let Some(reason) = event.attribution.reason.as_deref().filter(|r| !r.is_empty()) {
        line.push_str(": ");
        line.push_str(reason);
    }

    // Keep multi-line reasons from splitting the entry.
    line.replace('\n', " ")
}

fn describe(payload: &EventPayload) -> String {
    match payload {
        EventPayload::MemberJoin { member } => user(member),
        EventPayload::NickChange {
            member,
            before,
            after,
        } => format!(
            "{} {} -> {}",
            user(member),
            nick(before.as_deref()),
            nick(after.as_deref())
        ),
        EventPayload::RoleAdd { member, role } => format!("{} +{}", user(member), role_name(role)),
        EventPayload::RoleRemove { member, role } => {
            format!("{} -{}", user(member), role_name(role))
        }
        EventPayload::Infraction { user: target, .. } => user(target),
        EventPayload::RoleCreate { role } | EventPayload::RoleDelete { role } => role_name(role),
        EventPayload::RoleUpdate { role, change } => {
            format!("{} {}", role_name(role), role_change(change))
        }
        EventPayload::ChannelCreate { channel } | EventPayload::ChannelDelete { channel } => {
            channel_name(channel)
        }
        EventPayload::ChannelUpdate { channel, change } => {
            format!("{} {}", channel_name(channel), channel_change(change))
        }
    }
}

fn role_change(change: &RoleChange) -> String {
    match change {
        RoleChange::Name { before, after } => format!("\"{before}\" -> \"{after}\""),
        RoleChange::Color { before, after } => format!("#{before:06x} -> #{after:06x}"),
        RoleChange::Permissions { before, after } => format!("{before:#x} -> {after:#x}"),
        RoleChange::Mentionable { before, after } => format!("{before} -> {after}"),
    }
}

fn channel_change(change: &ChannelChange) -> String {
    match change {
        ChannelChange::Name { before, after } => format!("#{before} -> #{after}"),
        ChannelChange::SlowmodeDelay { before, after } => format!("{before}s -> {after}s"),
    }
}

fn user(user: &UserRef) -> String {
    if user.name.is_empty() {
        user.id.to_string()
    } else {
        format!("{} ({})", user.name, user.id)
    }
}

fn role_name(role: &RoleRef) -> String {
    if role.name.is_empty() {
        format!("@{}", role.id)
    } else {
        format!("@{} ({})", role.name, role.id)
    }
}

fn channel_name(channel: &ChannelRef) -> String {
    if channel.name.is_empty() {
        format!("#{}", channel.id)
    } else {
        format!("#{} ({})", channel.name, channel.id)
    }
}

fn nick(nick: Option<&str>) -> &str {
    nick.unwrap_or("(none)")
}

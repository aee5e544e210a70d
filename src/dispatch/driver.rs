//! Bridges raw gateway notifications to attributed domain events.
//!
//! [`AttributionDriver::handle`] never blocks: bookkeeping (guild
//! availability, ban/kick racing, echo markers) happens inline so it keeps
//! notification order, and every audit log lookup runs on its own task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::listeners::ListenerRegistry;
use crate::attribution::{predicates, AttributionRequest, AuditCorrelator, EchoSuppressor, Predicate};
use crate::config::AttributionConfig;
use crate::models::audit::{AuditAction, UserRef};
use crate::models::event::{
    Attribution, ChannelChange, DomainEvent, EventKind, EventPayload, Infraction, RoleChange,
};
use crate::models::raw::{ChannelSnapshot, MemberSnapshot, RawEvent, RoleSnapshot};
use crate::models::{GuildId, Snowflake};
use crate::platform::{GuildCache, GuildDirectory};
use crate::tasks;

/// Driver tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// The bot's own user ID; its own removal is not reported.
    pub bot_user_id: Snowflake,
    /// Lookup timeout for most actions.
    pub default_timeout: Duration,
    /// Lookup timeout for kicks, which race with bans.
    pub kick_timeout: Duration,
}

impl DriverSettings {
    /// Settings derived from the attribution config section.
    #[must_use]
    pub fn from_config(bot_user_id: Snowflake, config: &AttributionConfig) -> Self {
        Self {
            bot_user_id,
            default_timeout: config.default_timeout(),
            kick_timeout: config.kick_timeout(),
        }
    }
}

/// An action the bot performs itself, with a known moderator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfAction {
    /// Guild the action applies in.
    pub guild_id: GuildId,
    /// What is done.
    pub infraction: Infraction,
    /// Who it is done to.
    pub user: UserRef,
    /// Who asked for it.
    pub moderator: UserRef,
    /// Why.
    pub reason: Option<String>,
}

type KickKey = (GuildId, Snowflake);

struct PendingKick {
    ticket: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct KickTracker {
    next_ticket: u64,
    pending: HashMap<KickKey, PendingKick>,
}

struct Inner {
    correlator: AuditCorrelator,
    suppressor: EchoSuppressor,
    listeners: ListenerRegistry,
    guilds: Arc<GuildCache>,
    settings: DriverSettings,
    kicks: Mutex<KickTracker>,
}

/// Turns raw notifications into attributed events.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AttributionDriver {
    inner: Arc<Inner>,
}

impl AttributionDriver {
    /// Construct a driver over its collaborators.
    #[must_use]
    pub fn new(
        correlator: AuditCorrelator,
        suppressor: EchoSuppressor,
        listeners: ListenerRegistry,
        guilds: Arc<GuildCache>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                correlator,
                suppressor,
                listeners,
                guilds,
                settings,
                kicks: Mutex::new(KickTracker::default()),
            }),
        }
    }

    /// Listener registry events are dispatched to.
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    /// Underlying correlator.
    #[must_use]
    pub fn correlator(&self) -> &AuditCorrelator {
        &self.inner.correlator
    }

    /// Record that the notification identified by `kind` and `key` is
    /// about to be caused by the bot itself.
    pub fn mark_self_caused(&self, guild_id: GuildId, kind: EventKind, key: Vec<u64>) {
        self.inner.suppressor.mark(guild_id, kind, key);
    }

    /// Whether a notification is marked as self-caused.
    #[must_use]
    pub fn is_self_caused(&self, guild_id: GuildId, kind: EventKind, key: &[u64]) -> bool {
        self.inner.suppressor.is_marked(guild_id, kind, key)
    }

    /// Process one raw notification.
    ///
    /// Returns immediately; lookups and dispatch continue on background
    /// tasks.
    pub fn handle(&self, event: RawEvent) {
        self.note_role_names(&event);

        match event {
            RawEvent::GuildAvailable {
                guild_id,
                audit_log_access,
            } => self.inner.guilds.set_available(guild_id, audit_log_access),
            RawEvent::GuildRemove { guild_id } => self.on_guild_remove(guild_id),
            RawEvent::MemberJoin { guild_id, member } => self.on_member_join(guild_id, member),
            RawEvent::MemberUpdate {
                guild_id,
                before,
                after,
            } => {
                self.on_nick_update(guild_id, &before, &after);
                self.on_roles_update(guild_id, &before, &after);
            }
            RawEvent::MemberRemove { guild_id, user } => self.on_member_remove(guild_id, user),
            RawEvent::MemberBan { guild_id, user } => self.on_member_ban(guild_id, user),
            RawEvent::MemberUnban { guild_id, user } => {
                let event = infraction(guild_id, Infraction::Unban, user);
                self.spawn_fetch(event, AuditAction::MemberBanRemove, None, false);
            }
            RawEvent::RoleCreate { guild_id, role } => {
                let event = DomainEvent::new(guild_id, EventPayload::RoleCreate { role: role.to_ref() });
                self.on_role_lifecycle(event, &role, AuditAction::RoleCreate);
            }
            RawEvent::RoleDelete { guild_id, role } => {
                let event = DomainEvent::new(guild_id, EventPayload::RoleDelete { role: role.to_ref() });
                self.on_role_lifecycle(event, &role, AuditAction::RoleDelete);
            }
            RawEvent::RoleUpdate {
                guild_id,
                before,
                after,
            } => self.on_role_update(guild_id, &before, &after),
            RawEvent::ChannelCreate { guild_id, channel } => {
                let event = DomainEvent::new(
                    guild_id,
                    EventPayload::ChannelCreate {
                        channel: channel.to_ref(),
                    },
                );
                self.spawn_fetch(event, AuditAction::ChannelCreate, None, false);
            }
            RawEvent::ChannelDelete { guild_id, channel } => {
                let event = DomainEvent::new(
                    guild_id,
                    EventPayload::ChannelDelete {
                        channel: channel.to_ref(),
                    },
                );
                self.spawn_fetch(event, AuditAction::ChannelDelete, None, false);
            }
            RawEvent::ChannelUpdate {
                guild_id,
                before,
                after,
            } => self.on_channel_update(guild_id, &before, &after),
        }
    }

    /// Mark every notification `action` will echo. Call before performing
    /// the action on the platform.
    pub fn prepare_self_action(&self, action: &SelfAction) {
        let guild_id = action.guild_id;
        let infraction_key = vec![guild_id.0, action.user.id.0];

        self.mark_self_caused(guild_id, action.infraction.kind(), infraction_key.clone());

        match action.infraction {
            Infraction::Ban => {
                self.mark_self_caused(guild_id, EventKind::MemberKick, infraction_key);
            }
            Infraction::Mute | Infraction::Unmute => {
                if let Some(role_id) = self.inner.guilds.mute_role(guild_id) {
                    let kind = if action.infraction == Infraction::Mute {
                        EventKind::RoleAdd
                    } else {
                        EventKind::RoleRemove
                    };
                    self.mark_self_caused(guild_id, kind, vec![action.user.id.0, role_id.0]);
                }
            }
            Infraction::Kick | Infraction::Unban => {}
        }
    }

    /// Report a completed self action with its known moderator; no audit
    /// log lookup is made.
    pub async fn complete_self_action(&self, action: SelfAction) {
        let attribution = Attribution::known(action.moderator.clone(), action.reason.clone());

        if matches!(action.infraction, Infraction::Mute | Infraction::Unmute) {
            if let Some(role) = self.inner.guilds.mute_role_ref(action.guild_id) {
                let payload = if action.infraction == Infraction::Mute {
                    EventPayload::RoleAdd {
                        member: action.user.clone(),
                        role,
                    }
                } else {
                    EventPayload::RoleRemove {
                        member: action.user.clone(),
                        role,
                    }
                };
                self.dispatch(DomainEvent::new(action.guild_id, payload).attributed(attribution.clone()))
                    .await;
            }
        }

        let event = infraction(action.guild_id, action.infraction, action.user).attributed(attribution);
        self.dispatch(event).await;
    }

    /// Cancel all outstanding lookups and pending kick checks.
    pub fn shutdown(&self) {
        let pending: Vec<PendingKick> = self.kicks().pending.drain().map(|(_, kick)| kick).collect();
        for kick in pending {
            kick.handle.abort();
        }
        self.inner.correlator.shutdown();
    }

    /// Dispatch `event` and any mute/unmute it implies.
    pub async fn dispatch(&self, event: DomainEvent) {
        let derived = self.derive_mute(&event);
        self.inner.listeners.dispatch(event).await;
        if let Some(derived) = derived {
            self.inner.listeners.dispatch(derived).await;
        }
    }

    /// Attribute `event` via the audit log and dispatch it.
    ///
    /// Skips entirely if marked self-caused. When nothing is found the
    /// event goes out unattributed, unless `required` is set.
    pub async fn fetch_and_dispatch(
        &self,
        event: DomainEvent,
        request: AttributionRequest,
        required: bool,
    ) {
        let guild_id = event.guild_id;
        let kind = event.kind();

        if self.is_self_caused(guild_id, kind, &event.key()) {
            debug!(%guild_id, kind = kind.as_str(), "self-caused event suppressed");
            return;
        }

        let entry = self
            .inner
            .correlator
            .request_attribution(guild_id, request)
            .await;

        match entry {
            Some(entry) => {
                let attribution = Attribution::from_entry(Some(&entry));
                self.dispatch(event.attributed(attribution)).await;
            }
            None if required => {
                debug!(%guild_id, kind = kind.as_str(), "no audit log entry; dropping unconfirmed event");
            }
            None => self.dispatch(event).await,
        }
    }

    fn kicks(&self) -> MutexGuard<'_, KickTracker> {
        self.inner.kicks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, action: AuditAction, target: Option<Snowflake>) -> AttributionRequest {
        let timeout = if action == AuditAction::MemberKick {
            self.inner.settings.kick_timeout
        } else {
            self.inner.settings.default_timeout
        };

        let request = AttributionRequest::new(action).timeout(timeout);
        match target {
            Some(target) => request.target(target),
            None => request,
        }
    }

    /// Spawn a lookup for `event`, targeting the event's subject.
    fn spawn_fetch(
        &self,
        event: DomainEvent,
        action: AuditAction,
        predicate: Option<Predicate>,
        required: bool,
    ) {
        let mut request = self.request(action, subject_id(&event));
        if let Some(predicate) = predicate {
            request = request.predicate(predicate);
        }

        let driver = self.clone();
        tasks::spawn_supervised("attribution", async move {
            driver.fetch_and_dispatch(event, request, required).await;
        });
    }

    fn spawn_dispatch(&self, event: DomainEvent) {
        let driver = self.clone();
        tasks::spawn_supervised("dispatch", async move {
            driver.dispatch(event).await;
        });
    }

    /// Keep the cached mute role name current from role snapshots.
    fn note_role_names(&self, event: &RawEvent) {
        let guild_id = event.guild_id();
        let roles: Box<dyn Iterator<Item = &RoleSnapshot> + '_> = match event {
            RawEvent::MemberJoin { member, .. } => Box::new(member.roles.iter()),
            RawEvent::MemberUpdate { after, .. } => Box::new(after.roles.iter()),
            RawEvent::RoleCreate { role, .. } => Box::new(std::iter::once(role)),
            RawEvent::RoleUpdate { after, .. } => Box::new(std::iter::once(after)),
            _ => return,
        };
        for role in roles {
            self.inner.guilds.note_role_name(guild_id, role.id, &role.name);
        }
    }

    fn on_guild_remove(&self, guild_id: GuildId) {
        info!(%guild_id, "guild removed");
        self.inner.guilds.set_unavailable(guild_id);
        self.inner.correlator.cancel_guild(guild_id);

        let mut kicks = self.kicks();
        kicks.pending.retain(|(guild, _), kick| {
            if *guild == guild_id {
                kick.handle.abort();
                false
            } else {
                true
            }
        });
    }

    fn on_member_join(&self, guild_id: GuildId, member: MemberSnapshot) {
        // Bots and members joining through authorization may come with roles.
        let roles: Vec<RoleSnapshot> = member
            .roles
            .into_iter()
            .filter(|role| !role.is_default(guild_id))
            .collect();
        let user = member.user;

        let driver = self.clone();
        tasks::spawn_supervised("member_join", async move {
            let attribution = if user.bot {
                let request = driver.request(AuditAction::BotAdd, Some(user.id));
                let entry = driver
                    .inner
                    .correlator
                    .request_attribution(guild_id, request)
                    .await;
                Attribution::from_entry(entry.as_ref())
            } else {
                Attribution::default()
            };

            let join = DomainEvent::new(guild_id, EventPayload::MemberJoin { member: user.clone() });
            driver.dispatch(join.attributed(attribution.clone())).await;

            for role in roles {
                let payload = EventPayload::RoleAdd {
                    member: user.clone(),
                    role: role.to_ref(),
                };
                driver
                    .dispatch(DomainEvent::new(guild_id, payload).attributed(attribution.clone()))
                    .await;
            }
        });
    }

    fn on_nick_update(&self, guild_id: GuildId, before: &MemberSnapshot, after: &MemberSnapshot) {
        if before.nick == after.nick {
            return;
        }

        let check = predicates::match_attr(
            "nick",
            before.nick.clone().map(Value::String),
            after.nick.clone().map(Value::String),
        );
        let event = DomainEvent::new(
            guild_id,
            EventPayload::NickChange {
                member: after.user.clone(),
                before: before.nick.clone(),
                after: after.nick.clone(),
            },
        );
        self.spawn_fetch(event, AuditAction::MemberUpdate, Some(check), false);
    }

    fn on_roles_update(&self, guild_id: GuildId, before: &MemberSnapshot, after: &MemberSnapshot) {
        let held_before = |role: &RoleSnapshot| before.roles.iter().any(|r| r.id == role.id);
        let held_after = |role: &RoleSnapshot| after.roles.iter().any(|r| r.id == role.id);

        let added = after.roles.iter().filter(|role| !held_before(role)).map(|role| (role, true));
        let removed = before.roles.iter().filter(|role| !held_after(role)).map(|role| (role, false));

        // One lookup per role; a single entry may well cover all of them.
        for (role, was_added) in added.chain(removed) {
            let member = after.user.clone();
            let (payload, check) = if was_added {
                (
                    EventPayload::RoleAdd {
                        member,
                        role: role.to_ref(),
                    },
                    predicates::role_added(role.id),
                )
            } else {
                (
                    EventPayload::RoleRemove {
                        member,
                        role: role.to_ref(),
                    },
                    predicates::role_removed(role.id),
                )
            };
            let event = DomainEvent::new(guild_id, payload);

            if role.managed {
                self.spawn_dispatch(event);
            } else {
                self.spawn_fetch(event, AuditAction::MemberRoleUpdate, Some(check), false);
            }
        }
    }

    fn on_member_remove(&self, guild_id: GuildId, user: UserRef) {
        if user.id == self.inner.settings.bot_user_id {
            return;
        }

        let key = (guild_id, user.id);
        let event = infraction(guild_id, Infraction::Kick, user);

        // Held across spawn so the task cannot clear its slot before it exists.
        let mut kicks = self.kicks();
        let ticket = kicks.next_ticket;
        kicks.next_ticket += 1;

        if let Some(previous) = kicks.pending.remove(&key) {
            previous.handle.abort();
        }

        let driver = self.clone();
        let request = self.request(AuditAction::MemberKick, Some(key.1));
        let handle = tasks::spawn_supervised("member_kick", async move {
            driver.fetch_and_dispatch(event, request, true).await;

            let mut kicks = driver.kicks();
            if kicks.pending.get(&key).is_some_and(|kick| kick.ticket == ticket) {
                kicks.pending.remove(&key);
            }
        });
        kicks.pending.insert(key, PendingKick { ticket, handle });
    }

    fn on_member_ban(&self, guild_id: GuildId, user: UserRef) {
        if user.id == self.inner.settings.bot_user_id {
            return;
        }

        let key = vec![guild_id.0, user.id.0];
        // The ban usually arrives before the member removal; either way the
        // removal is not a kick.
        self.mark_self_caused(guild_id, EventKind::MemberKick, key);
        if let Some(kick) = self.kicks().pending.remove(&(guild_id, user.id)) {
            debug!(%guild_id, user_id = %user.id, "ban supersedes pending kick lookup");
            kick.handle.abort();
        }

        let event = infraction(guild_id, Infraction::Ban, user);
        self.spawn_fetch(event, AuditAction::MemberBanAdd, None, false);
    }

    fn on_role_lifecycle(&self, event: DomainEvent, role: &RoleSnapshot, action: AuditAction) {
        if role.managed {
            self.spawn_dispatch(event);
        } else {
            self.spawn_fetch(event, action, None, false);
        }
    }

    fn on_role_update(&self, guild_id: GuildId, before: &RoleSnapshot, after: &RoleSnapshot) {
        let mut changes = Vec::new();

        if before.color != after.color {
            changes.push((
                "color",
                json!(before.color),
                json!(after.color),
                RoleChange::Color {
                    before: before.color,
                    after: after.color,
                },
            ));
        }
        if before.mentionable != after.mentionable {
            changes.push((
                "mentionable",
                json!(before.mentionable),
                json!(after.mentionable),
                RoleChange::Mentionable {
                    before: before.mentionable,
                    after: after.mentionable,
                },
            ));
        }
        if before.name != after.name {
            changes.push((
                "name",
                json!(before.name),
                json!(after.name),
                RoleChange::Name {
                    before: before.name.clone(),
                    after: after.name.clone(),
                },
            ));
        }
        if before.permissions != after.permissions {
            changes.push((
                "permissions",
                json!(before.permissions),
                json!(after.permissions),
                RoleChange::Permissions {
                    before: before.permissions,
                    after: after.permissions,
                },
            ));
        }

        for (key, old, new, change) in changes {
            let event = DomainEvent::new(
                guild_id,
                EventPayload::RoleUpdate {
                    role: after.to_ref(),
                    change,
                },
            );
            let check = predicates::match_attr(key, Some(old), Some(new));
            self.spawn_fetch(event, AuditAction::RoleUpdate, Some(check), false);
        }
    }

    fn on_channel_update(
        &self,
        guild_id: GuildId,
        before: &ChannelSnapshot,
        after: &ChannelSnapshot,
    ) {
        let mut changes = Vec::new();

        if before.name != after.name {
            changes.push((
                "name",
                json!(before.name),
                json!(after.name),
                ChannelChange::Name {
                    before: before.name.clone(),
                    after: after.name.clone(),
                },
            ));
        }
        if before.slowmode_delay != after.slowmode_delay {
            changes.push((
                "rate_limit_per_user",
                json!(before.slowmode_delay),
                json!(after.slowmode_delay),
                ChannelChange::SlowmodeDelay {
                    before: before.slowmode_delay,
                    after: after.slowmode_delay,
                },
            ));
        }

        for (key, old, new, change) in changes {
            let event = DomainEvent::new(
                guild_id,
                EventPayload::ChannelUpdate {
                    channel: after.to_ref(),
                    change,
                },
            );
            let check = predicates::match_attr(key, Some(old), Some(new));
            self.spawn_fetch(event, AuditAction::ChannelUpdate, Some(check), false);
        }
    }

    /// Mute or unmute implied by a role change to the guild's mute role.
    fn derive_mute(&self, event: &DomainEvent) -> Option<DomainEvent> {
        let (member, role, infraction_kind) = match &event.payload {
            EventPayload::RoleAdd { member, role } => (member, role, Infraction::Mute),
            EventPayload::RoleRemove { member, role } => (member, role, Infraction::Unmute),
            _ => return None,
        };

        if self.inner.guilds.mute_role(event.guild_id) != Some(role.id) {
            return None;
        }

        let guild_id = event.guild_id;
        let derived = infraction(guild_id, infraction_kind, member.clone())
            .attributed(event.attribution.clone());

        if self.is_self_caused(guild_id, event.kind(), &event.key())
            || self.is_self_caused(guild_id, derived.kind(), &derived.key())
        {
            return None;
        }

        Some(derived)
    }
}

fn infraction(guild_id: GuildId, infraction: Infraction, user: UserRef) -> DomainEvent {
    DomainEvent::new(guild_id, EventPayload::Infraction { infraction, user })
}

/// Audit target of an event: the member, user, role, or channel.
fn subject_id(event: &DomainEvent) -> Option<Snowflake> {
    match &event.payload {
        EventPayload::MemberJoin { member }
        | EventPayload::NickChange { member, .. }
        | EventPayload::RoleAdd { member, .. }
        | EventPayload::RoleRemove { member, .. } => Some(member.id),
        EventPayload::Infraction { user, .. } => Some(user.id),
        EventPayload::RoleCreate { role }
        | EventPayload::RoleDelete { role }
        | EventPayload::RoleUpdate { role, .. } => Some(role.id),
        EventPayload::ChannelCreate { channel }
        | EventPayload::ChannelDelete { channel }
        | EventPayload::ChannelUpdate { channel, .. } => Some(channel.id),
    }
}

//! Per-guild audit log polling and lookup resolution.
//!
//! Instead of fetching the audit log once per event, lookups are queued
//! per guild and a single poll task serves all of them. Another bot
//! executing fifty bans costs one fetch every poll interval, not fifty.
//!
//! ## Poll loop
//!
//! Each iteration sleeps for the poll interval, resolves expired lookups
//! to `None`, and, if any remain, fetches entries newer than the lookback
//! window. Entries are matched oldest-first against pending lookups in
//! creation order, so equivalent actions pair up in the order they
//! happened. The task exits once nothing is pending; the next request
//! starts a new one.
//!
//! Every pass refetches the whole lookback window, so an entry taken by a
//! lookup without a predicate is remembered until it ages out of the
//! window. Later equivalent lookups skip it and pair with the next entry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::lookup::{Lookup, LookupWaiter, Predicate};
use super::reason::ReasonParser;
use crate::config::AttributionConfig;
use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::{GuildId, Snowflake};
use crate::platform::{AuditFeed, GuildDirectory};
use crate::tasks;

/// Timing and sizing knobs for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatorSettings {
    /// Delay between fetches for one guild.
    pub poll_interval: Duration,
    /// Oldest entry age considered during a fetch.
    pub lookback: Duration,
    /// Upper bound on entries read per fetch.
    pub fetch_limit: usize,
    /// Timeout used when a request does not set its own.
    pub default_timeout: Duration,
    /// Re-attribute bot entries from their reason text.
    pub reason_attribution: bool,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self::from(&AttributionConfig::default())
    }
}

impl From<&AttributionConfig> for CorrelatorSettings {
    fn from(config: &AttributionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            lookback: config.lookback(),
            fetch_limit: config.fetch_limit,
            default_timeout: config.default_timeout(),
            reason_attribution: config.reason_attribution,
        }
    }
}

/// Parameters of one attribution request.
pub struct AttributionRequest {
    action: AuditAction,
    target: Option<Snowflake>,
    predicate: Option<Predicate>,
    timeout: Option<Duration>,
}

impl AttributionRequest {
    /// Request for the given audit action, with no target restriction.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            target: None,
            predicate: None,
            timeout: None,
        }
    }

    /// Only accept entries targeting `target`.
    #[must_use]
    pub fn target(mut self, target: Snowflake) -> Self {
        self.target = Some(target);
        self
    }

    /// Only accept entries satisfying `predicate`.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Give up after `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct PollTask {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct PendingSet {
    lookups: Vec<Lookup>,
    task: Option<PollTask>,
    /// Entries already taken by a lookup without a predicate.
    consumed: HashSet<Snowflake>,
}

impl PendingSet {
    fn is_idle(&self) -> bool {
        self.lookups.is_empty() && self.consumed.is_empty()
    }
}

struct Inner {
    feed: Arc<dyn AuditFeed>,
    guilds: Arc<dyn GuildDirectory>,
    settings: CorrelatorSettings,
    reasons: Option<ReasonParser>,
    generation: AtomicU64,
    pending: Mutex<HashMap<GuildId, PendingSet>>,
}

/// Queues attribution lookups per guild and resolves them from the
/// audit log.
///
/// Cheap to clone; clones share the same pending sets.
#[derive(Clone)]
pub struct AuditCorrelator {
    inner: Arc<Inner>,
}

impl AuditCorrelator {
    /// Construct a correlator with no pending lookups.
    #[must_use]
    pub fn new(
        feed: Arc<dyn AuditFeed>,
        guilds: Arc<dyn GuildDirectory>,
        settings: CorrelatorSettings,
    ) -> Self {
        Self::with_reason_parser(feed, guilds, settings, None)
    }

    /// Construct a correlator that re-attributes bot entries with `parser`
    /// when `settings.reason_attribution` is set.
    #[must_use]
    pub fn with_reason_parser(
        feed: Arc<dyn AuditFeed>,
        guilds: Arc<dyn GuildDirectory>,
        settings: CorrelatorSettings,
        parser: Option<ReasonParser>,
    ) -> Self {
        let reasons = parser.filter(|_| settings.reason_attribution);
        Self {
            inner: Arc::new(Inner {
                feed,
                guilds,
                settings,
                reasons,
                generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &CorrelatorSettings {
        &self.inner.settings
    }

    /// Queue a lookup and return a future for its result.
    ///
    /// Resolves immediately to `None` without any fetch when the bot
    /// cannot read the guild's audit log.
    #[must_use]
    pub fn request_attribution(
        &self,
        guild_id: GuildId,
        request: AttributionRequest,
    ) -> LookupWaiter {
        if !self.inner.guilds.has_audit_log_access(guild_id) {
            debug!(%guild_id, action = ?request.action, "no audit log access; skipping lookup");
            return LookupWaiter::ready(None);
        }

        let timeout = request
            .timeout
            .unwrap_or(self.inner.settings.default_timeout);
        let (lookup, waiter) =
            Lookup::new(request.action, request.target, request.predicate, timeout);

        Inner::queue(&self.inner, guild_id, lookup);
        waiter
    }

    /// Stop polling a guild and resolve all its lookups to `None`.
    pub fn cancel_guild(&self, guild_id: GuildId) {
        let removed = self.inner.lock().remove(&guild_id);
        if let Some(set) = removed {
            info!(%guild_id, pending = set.lookups.len(), "cancelling audit log lookups");
            Inner::cancel_set(set);
        }
    }

    /// Cancel every guild. Outstanding waiters resolve to `None`.
    pub fn shutdown(&self) {
        let drained: Vec<PendingSet> = self.inner.lock().drain().map(|(_, set)| set).collect();
        let pending: usize = drained.iter().map(|set| set.lookups.len()).sum();
        for set in drained {
            Inner::cancel_set(set);
        }
        info!(pending, "audit correlator shut down");
    }

    /// Number of unresolved lookups for a guild.
    #[must_use]
    pub fn pending_count(&self, guild_id: GuildId) -> usize {
        self.inner
            .lock()
            .get(&guild_id)
            .map_or(0, |set| set.lookups.len())
    }

    /// Whether a poll task is currently active for a guild.
    #[must_use]
    pub fn is_polling(&self, guild_id: GuildId) -> bool {
        self.inner
            .lock()
            .get(&guild_id)
            .is_some_and(|set| set.task.is_some())
    }
}

enum PassState {
    Fetch,
    Done,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<GuildId, PendingSet>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(this: &Arc<Self>, guild_id: GuildId, lookup: Lookup) {
        let mut pending = this.lock();
        let set = pending.entry(guild_id).or_default();
        set.lookups.push(lookup);

        if set.task.is_none() {
            let generation = this.generation.fetch_add(1, Ordering::Relaxed);
            let handle = tasks::spawn_supervised(
                "audit_log_poll",
                Self::poll(Arc::clone(this), guild_id, generation),
            );
            set.task = Some(PollTask { generation, handle });
            debug!(%guild_id, generation, "started audit log poll task");
        }
    }

    fn cancel_set(set: PendingSet) {
        if let Some(task) = set.task {
            task.handle.abort();
        }
        for mut lookup in set.lookups {
            lookup.set_result(None);
        }
    }

    async fn poll(this: Arc<Self>, guild_id: GuildId, generation: u64) {
        loop {
            tokio::time::sleep(this.settings.poll_interval).await;

            match this.prepare_pass(guild_id, generation) {
                PassState::Fetch => this.fetch_and_match(guild_id).await,
                PassState::Done => break,
            }

            if this.release_if_idle(guild_id, generation) {
                break;
            }
        }
        debug!(%guild_id, generation, "audit log poll task finished");
    }

    /// Expire stale lookups and decide whether a fetch is needed.
    fn prepare_pass(&self, guild_id: GuildId, generation: u64) -> PassState {
        let mut pending = self.lock();
        let Some(set) = pending.get_mut(&guild_id) else {
            return PassState::Done;
        };
        if !set.task.as_ref().is_some_and(|task| task.generation == generation) {
            return PassState::Done;
        }

        let mut expired = 0usize;
        set.lookups.retain_mut(|lookup| {
            if lookup.is_expired() {
                lookup.set_result(None);
                expired += 1;
                false
            } else {
                true
            }
        });
        if expired > 0 {
            debug!(%guild_id, expired, "expired audit log lookups");
        }

        if !self.guilds.is_available(guild_id) {
            if let Some(set) = pending.remove(&guild_id) {
                info!(%guild_id, pending = set.lookups.len(), "guild unavailable; cancelling lookups");
                for mut lookup in set.lookups {
                    lookup.set_result(None);
                }
            }
            return PassState::Done;
        }

        if set.lookups.is_empty() {
            Self::retire(&mut pending, guild_id);
            return PassState::Done;
        }

        PassState::Fetch
    }

    /// Release the guild's task slot if nothing is pending. Returns whether
    /// the calling task should exit.
    fn release_if_idle(&self, guild_id: GuildId, generation: u64) -> bool {
        let mut pending = self.lock();
        let Some(set) = pending.get(&guild_id) else {
            return true;
        };
        if !set.task.as_ref().is_some_and(|task| task.generation == generation) {
            return true;
        }
        if set.lookups.is_empty() {
            Self::retire(&mut pending, guild_id);
            return true;
        }
        false
    }

    /// Clear the task slot; the consumed ids outlive the task until they
    /// fall out of the lookback window.
    fn retire(pending: &mut HashMap<GuildId, PendingSet>, guild_id: GuildId) {
        if let Some(set) = pending.get_mut(&guild_id) {
            set.task = None;
            if set.is_idle() {
                pending.remove(&guild_id);
            }
        }
    }

    fn prune_consumed(&self, guild_id: GuildId, cutoff: DateTime<Utc>) {
        if let Some(set) = self.lock().get_mut(&guild_id) {
            set.consumed.retain(|id| id.created_at() >= cutoff);
        }
    }

    async fn fetch_and_match(&self, guild_id: GuildId) {
        let cutoff = chrono::Duration::from_std(self.settings.lookback)
            .ok()
            .and_then(|lookback| Utc::now().checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_consumed(guild_id, cutoff);

        let mut entries: Vec<AuditEntry> = Vec::new();
        {
            let mut stream = self
                .feed
                .fetch_recent_entries(guild_id, self.settings.fetch_limit);

            while let Some(item) = stream.next().await {
                match item {
                    Ok(entry) if entry.created_at() < cutoff => break,
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        debug!(%guild_id, %err, "audit log fetch failed; retrying next interval");
                        return;
                    }
                }
            }
        }

        debug!(%guild_id, entries = entries.len(), "matching audit log entries");

        // Oldest first, in the order the actions happened.
        for entry in entries.into_iter().rev() {
            let entry = match &self.reasons {
                Some(parser) => parser.reattribute(entry),
                None => entry,
            };

            for mut lookup in self.take_matches(guild_id, &entry) {
                lookup.set_result(Some(entry.clone()));
                // Let the woken waiter run before resolving the next one.
                tokio::task::yield_now().await;
            }
        }
    }

    /// Remove every lookup `entry` resolves, in creation order.
    ///
    /// A lookup without a predicate consumes the entry, also for later
    /// passes; lookups with a predicate check a specific attribute and may
    /// share one entry.
    fn take_matches(&self, guild_id: GuildId, entry: &AuditEntry) -> Vec<Lookup> {
        let mut pending = self.lock();
        let Some(set) = pending.get_mut(&guild_id) else {
            return Vec::new();
        };

        let mut consumed = set.consumed.contains(&entry.id);
        let mut matched = Vec::new();
        let mut index = 0;
        while index < set.lookups.len() {
            let lookup = &set.lookups[index];
            let eligible = lookup.has_predicate() || !consumed;
            if eligible && lookup.matches(entry) {
                let lookup = set.lookups.remove(index);
                if !lookup.has_predicate() {
                    consumed = true;
                    set.consumed.insert(entry.id);
                }
                matched.push(lookup);
            } else {
                index += 1;
            }
        }

        if !matched.is_empty() {
            debug!(
                %guild_id,
                entry_id = %entry.id,
                action = ?entry.action,
                resolved = matched.len(),
                "audit log entry matched"
            );
        }
        matched
    }
}

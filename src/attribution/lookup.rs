//! A single pending audit log lookup.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::Snowflake;

/// Extra condition an entry must satisfy, used to tell apart several
/// entries of the same action and target.
pub type Predicate = Box<dyn Fn(&AuditEntry) -> bool + Send + Sync>;

/// Outcome delivered to the waiter. `None` means no attribution available.
pub type LookupResult = Option<AuditEntry>;

/// An unfulfilled audit log lookup.
///
/// The result slot can be filled once; later calls to
/// [`set_result`](Self::set_result) are ignored.
pub struct Lookup {
    action: AuditAction,
    target: Option<Snowflake>,
    predicate: Option<Predicate>,
    deadline: Instant,
    slot: Option<oneshot::Sender<LookupResult>>,
}

impl Lookup {
    /// Create a lookup expiring `timeout` from now, paired with its waiter.
    #[must_use]
    pub fn new(
        action: AuditAction,
        target: Option<Snowflake>,
        predicate: Option<Predicate>,
        timeout: Duration,
    ) -> (Self, LookupWaiter) {
        let (tx, rx) = oneshot::channel();
        let lookup = Self {
            action,
            target,
            predicate,
            deadline: super::deadline_after(timeout),
            slot: Some(tx),
        };
        (lookup, LookupWaiter { rx })
    }

    /// Audit action this lookup waits for.
    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Entity the action must target, if restricted.
    #[must_use]
    pub fn target(&self) -> Option<Snowflake> {
        self.target
    }

    /// Whether an extra predicate narrows the match.
    #[must_use]
    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Absolute expiry instant, fixed at construction.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Whether the deadline has strictly passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.deadline
    }

    /// Whether a result was already delivered.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.is_none()
    }

    /// Whether `entry` satisfies action, target, and predicate.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if entry.action != self.action {
            return false;
        }

        if let Some(target) = self.target {
            if entry.target_id != Some(target) {
                return false;
            }
        }

        self.predicate.as_ref().is_none_or(|check| check(entry))
    }

    /// Deliver a result. Returns `true` only for the first call.
    ///
    /// A waiter that has been dropped makes this a silent no-op.
    pub fn set_result(&mut self, result: LookupResult) -> bool {
        match self.slot.take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

impl Debug for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lookup")
            .field("action", &self.action)
            .field("target", &self.target)
            .field("has_predicate", &self.predicate.is_some())
            .field("deadline", &self.deadline)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Future completing with a [`Lookup`]'s result.
///
/// Resolves to `None` if the lookup is dropped unresolved, e.g. when the
/// correlator shuts down. Dropping the waiter leaves the lookup untouched.
#[derive(Debug)]
pub struct LookupWaiter {
    rx: oneshot::Receiver<LookupResult>,
}

impl LookupWaiter {
    /// A waiter that is already resolved to `result`.
    #[must_use]
    pub fn ready(result: LookupResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for LookupWaiter {
    type Output = LookupResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(std::result::Result::unwrap_or_default)
    }
}

//! Event attribution engine.
//!
//! Correlates actor-less change notifications with audit log entries to
//! find out who did what and why. See [`correlator`] for the polling
//! protocol and [`suppressor`] for self-action echo suppression.

pub mod correlator;
pub mod lookup;
pub mod predicates;
pub mod reason;
pub mod suppressor;

use std::time::Duration;

use tokio::time::Instant;

/// Roughly thirty years; stands in for "never" when a deadline overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Instant `timeout` from now, saturating instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

pub use correlator::{AttributionRequest, AuditCorrelator, CorrelatorSettings};
pub use lookup::{Lookup, LookupResult, LookupWaiter, Predicate};
pub use reason::ReasonParser;
pub use suppressor::EchoSuppressor;

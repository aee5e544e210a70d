//! Short-lived markers for notifications the bot caused itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::models::event::EventKind;
use crate::models::GuildId;
use crate::tasks;

/// Identity of a self-caused notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    /// Guild the notification will arrive for.
    pub guild_id: GuildId,
    /// Domain event the notification would produce.
    pub kind: EventKind,
    /// Identity tuple of that event.
    pub key: Vec<u64>,
}

/// Remembers actions the bot is about to perform so the resulting
/// notifications are not attributed and reported a second time.
///
/// Markers are not consumed by [`is_marked`](Self::is_marked) since one
/// action may echo more than once. Each marker expires after the window.
#[derive(Debug, Clone)]
pub struct EchoSuppressor {
    markers: Arc<Mutex<HashMap<Marker, Instant>>>,
    window: Duration,
}

impl EchoSuppressor {
    /// Create a suppressor whose markers live for `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            markers: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Marker lifetime.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Mark a notification as self-caused for the next `window`.
    ///
    /// Marking an already marked identity extends its lifetime.
    pub fn mark(&self, guild_id: GuildId, kind: EventKind, key: Vec<u64>) {
        let expires_at = super::deadline_after(self.window);
        let marker = Marker {
            guild_id,
            kind,
            key,
        };

        debug!(%guild_id, kind = kind.as_str(), key = ?marker.key, "marking self-caused event");
        self.lock().insert(marker.clone(), expires_at);

        let markers = Arc::clone(&self.markers);
        tasks::spawn_supervised("suppression_expiry", async move {
            tokio::time::sleep_until(expires_at).await;
            let mut markers = markers.lock().unwrap_or_else(PoisonError::into_inner);
            // A later mark of the same identity owns the entry now.
            if markers.get(&marker).is_some_and(|expiry| *expiry <= expires_at) {
                markers.remove(&marker);
            }
        });
    }

    /// Whether a live marker exists. Does not remove it.
    #[must_use]
    pub fn is_marked(&self, guild_id: GuildId, kind: EventKind, key: &[u64]) -> bool {
        let marker = Marker {
            guild_id,
            kind,
            key: key.to_vec(),
        };
        self.lock()
            .get(&marker)
            .is_some_and(|expires_at| Instant::now() < *expires_at)
    }

    /// Number of stored markers, including ones awaiting removal.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no markers are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Marker, Instant>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

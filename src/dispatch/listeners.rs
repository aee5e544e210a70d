//! Fan-out of attributed events to registered listeners.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::models::event::{DomainEvent, EventKind};
use crate::tasks;
use crate::Result;

const SUBSCRIPTION_CAPACITY: usize = 256;

/// Consumer of attributed events.
///
/// Each registered listener runs on its own task and sees events in the
/// order they were dispatched.
pub trait EventListener: Send + Sync {
    /// Handle one event. Errors are logged and do not stop the listener.
    ///
    /// # Errors
    ///
    /// Implementations return any failure that should be logged.
    fn on_event<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Which event kinds a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only the listed kinds.
    Kinds(HashSet<EventKind>),
}

impl EventFilter {
    /// Filter accepting only `kinds`.
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::Kinds(kinds.into_iter().collect())
    }

    /// Whether events of `kind` pass.
    #[must_use]
    pub fn accepts(&self, kind: EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

struct Subscription {
    filter: EventFilter,
    tx: mpsc::Sender<Arc<DomainEvent>>,
}

/// Registry of subscriptions keyed by event kind filter.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
}

impl ListenerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events passing `filter`.
    ///
    /// Dropping the receiver unsubscribes on the next dispatch.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> mpsc::Receiver<Arc<DomainEvent>> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { filter, tx });
        rx
    }

    /// Run `listener` on a supervised task for events passing `filter`.
    pub fn register(&self, filter: EventFilter, listener: Arc<dyn EventListener>) -> AbortHandle {
        let mut rx = self.subscribe(filter);
        tasks::spawn_supervised("event_listener", async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = listener.on_event(&event).await {
                    warn!(%err, kind = event.kind().as_str(), "event listener failed");
                }
            }
        })
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscription whose filter accepts it.
    pub async fn dispatch(&self, event: DomainEvent) {
        let kind = event.kind();
        let targets: Vec<mpsc::Sender<Arc<DomainEvent>>> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscription| subscription.filter.accepts(kind))
            .map(|subscription| subscription.tx.clone())
            .collect();

        debug!(
            guild_id = %event.guild_id,
            kind = kind.as_str(),
            attributed = event.attribution.is_known(),
            listeners = targets.len(),
            "dispatching event"
        );

        let event = Arc::new(event);
        let mut closed = false;
        for tx in targets {
            if tx.send(Arc::clone(&event)).await.is_err() {
                closed = true;
            }
        }

        if closed {
            self.subscriptions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|subscription| !subscription.tx.is_closed());
        }
    }
}

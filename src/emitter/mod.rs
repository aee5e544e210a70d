//! Buffered, paced delivery of event log lines.
//!
//! Lines queue up in a bounded channel. A single worker packs them into
//! messages no longer than the platform limit and paces sends: after a
//! quiet period it waits briefly so a burst lands in one message, and
//! otherwise it keeps at least [`MIN_SEND_INTERVAL`] between sends.

pub mod format;
pub mod sink;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatch::EventListener;
use crate::models::event::DomainEvent;
use crate::{AppError, Result};

pub use format::format_event;
pub use sink::{ChannelSink, LogSink, StdoutSink};

const QUEUE_CAPACITY: usize = 256;

/// Longest message the platform accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;
/// Delay before the first send after a quiet period.
pub const COALESCE_DELAY: Duration = Duration::from_millis(100);
/// Minimum spacing between consecutive sends.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(1);

/// Handle for enqueueing log lines. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LogEmitter {
    queue_tx: mpsc::Sender<String>,
}

impl LogEmitter {
    /// Start the delivery worker for `sink`.
    ///
    /// The worker flushes what is queued and exits once every handle is
    /// dropped, or as soon as the sink reports the destination gone.
    #[must_use]
    pub fn start(sink: Arc<dyn LogSink>) -> (Self, JoinHandle<()>) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(sink, queue_rx));
        info!("log emitter started");
        (Self { queue_tx }, worker)
    }

    /// Queue one line for delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the emitter has stopped.
    pub async fn enqueue(&self, line: String) -> Result<()> {
        self.queue_tx
            .send(line)
            .await
            .map_err(|_| AppError::NotFound("log emitter stopped".into()))
    }

    /// Whether the worker still accepts lines.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.queue_tx.is_closed()
    }
}

impl EventListener for LogEmitter {
    fn on_event<'a>(
        &'a self,
        event: &'a DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !self.is_running() {
                return Ok(());
            }
            self.enqueue(format_event(event)).await
        })
    }
}

async fn run_worker(sink: Arc<dyn LogSink>, mut queue_rx: mpsc::Receiver<String>) {
    let mut pending: VecDeque<String> = VecDeque::new();
    let mut last_send: Option<Instant> = None;

    loop {
        if pending.is_empty() {
            match queue_rx.recv().await {
                Some(line) => pending.push_back(line),
                None => break,
            }
        }

        tokio::time::sleep_until(next_send_at(last_send, Instant::now())).await;
        while let Ok(line) = queue_rx.try_recv() {
            pending.push_back(line);
        }

        let message = take_batch(&mut pending, MAX_MESSAGE_CHARS);
        last_send = Some(Instant::now());

        match sink.send(&message).await {
            Ok(()) => debug!(chars = message.chars().count(), "log message sent"),
            Err(AppError::NotFound(msg)) => {
                warn!(%msg, dropped = pending.len(), "log destination gone; stopping emitter");
                break;
            }
            Err(err) => warn!(%err, "failed to deliver log message; dropping"),
        }
    }

    info!("log emitter exiting");
}

/// When the next send may happen, given the previous one.
#[must_use]
pub fn next_send_at(last_send: Option<Instant>, now: Instant) -> Instant {
    match last_send {
        Some(last) if now < last + MIN_SEND_INTERVAL => last + MIN_SEND_INTERVAL,
        _ => now + COALESCE_DELAY,
    }
}

/// Pop as many whole lines off `pending` as fit into one message of at
/// most `max_chars`, joined by newlines.
///
/// The first line is always taken; an oversized one is truncated.
pub fn take_batch(pending: &mut VecDeque<String>, max_chars: usize) -> String {
    let mut message = String::new();
    let mut used = 0usize;

    while let Some(line) = pending.front() {
        let len = line.chars().count();
        if message.is_empty() {
            if len > max_chars {
                message = line.chars().take(max_chars).collect();
                pending.pop_front();
                break;
            }
        } else if used + 1 + len > max_chars {
            break;
        } else {
            message.push('\n');
            used += 1;
        }

        message.push_str(line);
        used += len;
        pending.pop_front();
    }

    message
}

//! Event handler registry and the per-connection dispatch worker
//!
//! Handlers are keyed by a set of normalized `NAME:VALUE` pairs. An event
//! matches a handler when the handler's pairs are a subset of the event's
//! headers; among matches the largest key wins, so a handler bound to
//! `{event-name:BACKGROUND_JOB, job-uuid:X}` beats one bound to
//! `{event-name:BACKGROUND_JOB}`, which beats the empty-key catch-all.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::event::EslEvent;

static SILENCE_STRAY_EVENTS: AtomicBool = AtomicBool::new(false);

/// Silence the warning logged when an event arrives with no matching
/// handler. Off by default.
pub fn silence_stray_events(silence: bool) {
    SILENCE_STRAY_EVENTS.store(silence, Ordering::Relaxed);
}

/// Handler invoked by the dispatch worker for each matched event.
///
/// Handlers run synchronously on the connection's dispatch worker; long
/// work should be moved to its own task so event delivery keeps up.
pub type EventHandler = Arc<dyn Fn(EslEvent) + Send + Sync>;

/// How the per-connection dispatch worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum DispatchMode {
    /// A dedicated OS thread draining the event queue (default). Handlers
    /// may block briefly without stalling the async runtime.
    #[default]
    Thread,
    /// A cooperative tokio task. Handlers must not block.
    Task,
}

/// A handler's match criteria: normalized `NAME:VALUE` pairs.
///
/// Both sides are uppercased and trimmed, so
/// `HandlerKey::new(&[("Event-Name", "background_job")])` and
/// `HandlerKey::new(&[("EVENT-NAME", "BACKGROUND_JOB")])` are the same
/// key. The empty key is the catch-all, matched only when nothing more
/// specific does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerKey {
    pairs: BTreeSet<String>,
}

fn normalize_pair(name: &str, value: &str) -> String {
    format!(
        "{}:{}",
        name.trim()
            .to_ascii_uppercase(),
        value
            .trim()
            .to_ascii_uppercase()
    )
}

impl HandlerKey {
    /// Build a key from header/value pairs.
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            pairs: pairs
                .iter()
                .map(|(name, value)| normalize_pair(name, value))
                .collect(),
        }
    }

    /// The catch-all key: matches every event.
    pub fn catch_all() -> Self {
        Self {
            pairs: BTreeSet::new(),
        }
    }

    /// Number of pairs — the key's specificity.
    pub fn len(&self) -> usize {
        self.pairs
            .len()
    }

    /// `true` for the catch-all key.
    pub fn is_empty(&self) -> bool {
        self.pairs
            .is_empty()
    }

    fn matches(&self, event_pairs: &BTreeSet<String>) -> bool {
        self.pairs
            .is_subset(event_pairs)
    }

    /// Sort rank: most specific first, ties broken by the sorted pair
    /// tuples so lookup order is deterministic.
    fn rank(&self) -> (Reverse<usize>, &BTreeSet<String>) {
        (Reverse(self.len()), &self.pairs)
    }
}

fn event_pair_set(event: &EslEvent) -> BTreeSet<String> {
    event
        .headers()
        .iter()
        .map(|(name, value)| normalize_pair(name, value))
        .collect()
}

/// Per-connection handler registry, kept sorted most-specific-first so a
/// lookup is the first subset match. Transient per-request handlers come
/// and go constantly on busy connections; the sorted scan keeps lookup at
/// first-match instead of scoring every entry.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: Vec<(HandlerKey, EventHandler)>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind a handler, replacing any existing handler for the same key.
    pub(crate) fn bind(&mut self, key: HandlerKey, handler: EventHandler) {
        self.unbind(&key);
        let at = self
            .entries
            .partition_point(|(existing, _)| existing.rank() <= key.rank());
        self.entries
            .insert(at, (key, handler));
    }

    /// Remove the handler for a key. Returns `true` when one was bound.
    pub(crate) fn unbind(&mut self, key: &HandlerKey) -> bool {
        let before = self
            .entries
            .len();
        self.entries
            .retain(|(existing, _)| existing != key);
        before
            != self
                .entries
                .len()
    }

    /// Drop every handler.
    pub(crate) fn clear(&mut self) {
        self.entries
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .len()
    }

    /// The most specific handler matching the event, if any.
    pub(crate) fn find(&self, event: &EslEvent) -> Option<EventHandler> {
        let event_pairs = event_pair_set(event);
        self.entries
            .iter()
            .find(|(key, _)| key.matches(&event_pairs))
            .map(|(_, handler)| Arc::clone(handler))
    }
}

/// Spawn the dispatch worker draining `events` until the channel closes.
///
/// The worker is single-threaded per connection so handler invocation
/// order matches event arrival order.
pub(crate) fn spawn_dispatcher(
    mode: DispatchMode,
    mut events: mpsc::Receiver<EslEvent>,
    registry: Arc<Mutex<HandlerRegistry>>,
) {
    match mode {
        DispatchMode::Task => {
            tokio::spawn(async move {
                while let Some(event) = events
                    .recv()
                    .await
                {
                    dispatch_one(&registry, event);
                }
                debug!("event dispatch task exiting");
            });
        }
        DispatchMode::Thread => {
            let spawned = std::thread::Builder::new()
                .name("eslmux-dispatch".to_string())
                .spawn(move || {
                    while let Some(event) = events.blocking_recv() {
                        dispatch_one(&registry, event);
                    }
                    debug!("event dispatch thread exiting");
                });
            if let Err(e) = spawned {
                error!("failed to spawn dispatch thread: {}", e);
            }
        }
    }
}

/// Match and invoke one handler. A panicking handler is caught and logged;
/// the dispatch loop must survive arbitrary user code.
fn dispatch_one(registry: &Mutex<HandlerRegistry>, event: EslEvent) {
    let handler = registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .find(&event);

    match handler {
        Some(handler) => {
            let name = event
                .event_name()
                .unwrap_or("<unnamed>")
                .to_string();
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("event handler panicked while handling {}", name);
            }
        }
        None => {
            if !SILENCE_STRAY_EVENTS.load(Ordering::Relaxed) {
                warn!(
                    "dropping event with no matching handler: {}",
                    event
                        .event_name()
                        .unwrap_or("<unnamed>")
                );
            }
        }
    }
}

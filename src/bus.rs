//! Named-signal publish/subscribe.
//!
//! Subscribers register interest in a set of [`Signal`]s with either a
//! synchronous handler or an unbounded channel. Publishing delivers to every
//! current subscriber whose set contains the signal; a signal nobody listens
//! for is dropped without error.

use crate::signal::Signal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Callback invoked for each delivered signal.
pub type SignalHandler = Arc<dyn Fn(Signal) + Send + Sync>;

/// Identifies one subscription for [`SignalBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
enum Sink {
    Handler(SignalHandler),
    Channel(mpsc::UnboundedSender<Signal>),
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    signals: HashSet<Signal>,
    sink: Sink,
}

/// Cloneable handle to a shared signal bus.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SignalBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every signal in `signals`.
    ///
    /// The handler runs on the publishing thread, outside the bus lock, so it
    /// may publish further signals.
    pub fn subscribe(
        &self,
        signals: impl IntoIterator<Item = Signal>,
        handler: SignalHandler,
    ) -> SubscriptionId {
        self.add(signals.into_iter().collect(), Sink::Handler(handler))
    }

    /// Register an unbounded channel for every signal in `signals`.
    ///
    /// Dropping the receiver ends the subscription; it is pruned on the next
    /// publish.
    pub fn subscribe_channel(
        &self,
        signals: impl IntoIterator<Item = Signal>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add(signals.into_iter().collect(), Sink::Channel(tx));
        (id, rx)
    }

    /// Remove a subscription. Returns `true` when it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Publish `signal` to all interested subscribers.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub fn publish(&self, signal: Signal) -> usize {
        let targets: Vec<Subscriber> = self
            .lock()
            .iter()
            .filter(|s| s.signals.contains(&signal))
            .cloned()
            .collect();

        if targets.is_empty() {
            trace!(%signal, "no subscribers, signal dropped");
            return 0;
        }

        let mut delivered = 0;
        let mut closed = Vec::new();
        for subscriber in targets {
            match &subscriber.sink {
                Sink::Handler(handler) => {
                    handler(signal);
                    delivered += 1;
                }
                Sink::Channel(tx) => {
                    if tx.send(signal).is_ok() {
                        delivered += 1;
                    } else {
                        closed.push(subscriber.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            debug!(count = closed.len(), "pruning closed signal subscribers");
            self.lock().retain(|s| !closed.contains(&s.id));
        }

        delivered
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn add(&self, signals: HashSet<Signal>, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscriber { id, signals, sink });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

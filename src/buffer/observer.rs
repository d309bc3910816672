//! Subscriber registry for buffer change notifications.
//!
//! Subscribers hand in a crossbeam `Sender` and get back a `SubscriberId`.
//! Delivery is a non-blocking channel send, so a mutating call never waits
//! on a consumer. Subscribers whose receiving side has been dropped are
//! pruned on the next delivery.

use crate::pipeline::id::SubscriberId;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Opaque version marker of a buffer's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl StateToken {
    /// Mint a token that no other buffer state has ever carried.
    pub fn fresh() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Notification sent to buffer subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// Contents changed through a mutating call.
    Updated { buffer: Arc<str>, token: StateToken },
}

impl BufferEvent {
    pub fn buffer_name(&self) -> &str {
        match self {
            BufferEvent::Updated { buffer, .. } => buffer,
        }
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: Sender<BufferEvent>,
    always_notify: bool,
}

/// Registration-ordered list of subscribers for one buffer.
#[derive(Default)]
pub struct ObserverRegistry {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. With `always_notify` set it also hears about
    /// mutations while the buffer is closed.
    pub fn subscribe(&self, sender: Sender<BufferEvent>, always_notify: bool) -> SubscriberId {
        let id = SubscriberId::next();
        self.lock().push(Subscriber {
            id,
            sender,
            always_notify,
        });
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every eligible subscriber in registration order.
    pub fn notify(&self, event: &BufferEvent, buffer_open: bool) {
        let mut subscribers = self.lock();
        subscribers.retain(|s| {
            if !buffer_open && !s.always_notify {
                return true;
            }
            match s.sender.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!(
                        "Dropping disconnected subscriber {:?} of '{}'",
                        s.id,
                        event.buffer_name()
                    );
                    false
                }
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

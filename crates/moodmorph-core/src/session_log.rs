//! Bounded, ordered message log with change notifications.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::message::{Message, MessageId, MessageKind};

/// Capacity of the change notification channel.
const EVENT_CHANNEL: usize = 1024;

/// A change to the log, delivered to subscribers in mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A message was appended at the end.
    Appended(Message),
    /// The oldest message was dropped to respect the capacity bound.
    Evicted(MessageId),
    /// The URL of a media message was swapped in place.
    MediaReplaced { id: MessageId, url: String },
    /// The log was replaced wholesale (rehydration).
    Restored { len: usize },
    /// The log was emptied.
    Cleared,
}

struct Inner {
    messages: VecDeque<Message>,
    capacity: usize,
}

/// Ordered message log holding at most `capacity` messages.
///
/// Appending past the bound evicts from the front, never the message being
/// appended. Renderers follow changes through [`SessionLog::subscribe`] or
/// [`SessionLog::history_plus_stream`].
pub struct SessionLog {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<LogEvent>,
}

impl SessionLog {
    /// Create an empty log. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(EVENT_CHANNEL);
        Self {
            inner: RwLock::new(Inner {
                messages: VecDeque::with_capacity(capacity),
                capacity,
            }),
            sender,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: LogEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Append a message, evicting the oldest entries if the log is full.
    ///
    /// Returns the ids of evicted messages, oldest first.
    pub fn push(&self, msg: Message) -> Vec<MessageId> {
        let mut inner = self.write();
        let mut evicted = Vec::new();
        while inner.messages.len() >= inner.capacity {
            match inner.messages.pop_front() {
                Some(front) => {
                    evicted.push(front.id());
                    self.notify(LogEvent::Evicted(front.id()));
                }
                None => break,
            }
        }
        inner.messages.push_back(msg.clone());
        self.notify(LogEvent::Appended(msg));
        drop(inner);

        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted oldest messages");
        }
        evicted
    }

    /// Replace the whole log, keeping only the newest `capacity` messages.
    pub fn restore(&self, messages: Vec<Message>) {
        let mut inner = self.write();
        let skip = messages.len().saturating_sub(inner.capacity);
        inner.messages = messages.into_iter().skip(skip).collect();
        let len = inner.messages.len();
        self.notify(LogEvent::Restored { len });
    }

    /// Swap the URL of the media message `id`, if it is still in the log.
    pub fn replace_media(&self, id: MessageId, url: impl Into<String>) -> bool {
        let url = url.into();
        let mut inner = self.write();
        let Some(msg) = inner.messages.iter_mut().find(|m| m.id() == id) else {
            return false;
        };
        if !msg.set_media_url(url.clone()) {
            return false;
        }
        self.notify(LogEvent::MediaReplaced { id, url });
        true
    }

    /// Id of the most recent media message.
    #[must_use]
    pub fn latest_media(&self) -> Option<MessageId> {
        self.read()
            .messages
            .iter()
            .rev()
            .find(|m| m.kind() == MessageKind::Media)
            .map(Message::id)
    }

    /// Remove every message.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.messages.clear();
        self.notify(LogEvent::Cleared);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().messages.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.read().capacity
    }

    /// Copy of the whole log, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.read().messages.iter().cloned().collect()
    }

    /// Copy of the newest `n` messages, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<Message> {
        let inner = self.read();
        let skip = inner.messages.len().saturating_sub(n);
        inner.messages.iter().skip(skip).cloned().collect()
    }

    /// Get a receiver for live changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    /// Stream that yields the current contents as `Appended` events, then
    /// live changes. Lagged receivers skip the missed events.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, LogEvent> {
        // Subscribe under the read lock so no change falls between the two.
        let (history, rx) = {
            let inner = self.read();
            (
                inner.messages.iter().cloned().collect::<Vec<_>>(),
                self.subscribe(),
            )
        };

        let hist = futures::stream::iter(history.into_iter().map(LogEvent::Appended));
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}

//! Session manager for a single chat conversation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use moodmorph_core::{
    EmotionAnalysis, HistoryRecord, LogEvent, Message, MessageId, Reply, SessionConfig, SessionLog,
    ValidationError,
    traits::{KeyValueStore, PersistenceError, Responder},
    validate_input,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::record;

/// What an outstanding exchange is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// A reply to the user message with this id.
    Reply { user_message: MessageId },
    /// A replacement URL for the media message with this id.
    AlternateMedia { target: MessageId },
}

/// The single exchange in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: ExchangeKind,
    pub started_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// How a `submit` exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The responder answered and its reply was appended.
    Replied,
    /// The responder failed; an error message was appended.
    Failed { reason: String },
    /// The session was reset or the request cancelled before the reply
    /// arrived; nothing was appended.
    Discarded,
}

/// Result of an accepted `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// The optimistically appended user message.
    pub user_message: MessageId,
    /// Assistant messages appended for this exchange, in order.
    pub replies: Vec<MessageId>,
    pub outcome: ExchangeOutcome,
}

/// Result of an accepted `request_alternate_media`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRefresh {
    /// The media message `id` now points at `url`.
    Replaced { id: MessageId, url: String },
    /// Nothing changed (no new media, responder failure, or a reset).
    Unchanged,
    /// The log holds no media message to refresh.
    NoMedia,
}

/// Whether log changes are still written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    Enabled,
    /// A store operation failed; the session continues in memory only.
    MemoryOnly,
}

/// Snapshot handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub messages: Vec<Message>,
    pub busy: bool,
    /// Welcome text, present only while the log is empty.
    pub greeting: Option<String>,
}

struct State {
    busy: bool,
    epoch: u64,
    next_id: u64,
    pending: Option<PendingRequest>,
    persistence: Persistence,
    latest_analysis: Option<EmotionAnalysis>,
}

impl State {
    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.pending.as_ref().is_some_and(|p| !p.cancelled)
    }
}

/// Assistant turns that follow the reply text.
enum FollowUp {
    Media { url: String, caption: Option<String> },
    Suggestion(String),
}

/// Clears `busy` when an exchange ends, including when its future is dropped.
struct BusyGuard<'a> {
    state: &'a Mutex<State>,
    epoch: u64,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.epoch == self.epoch {
            state.busy = false;
            state.pending = None;
        }
    }
}

/// Owns the message log of one conversation and mediates every exchange
/// with the responder.
///
/// At most one exchange is outstanding at a time: `submit` and
/// `request_alternate_media` are rejected while `busy`. `reset` bumps an
/// epoch so replies to exchanges started before it are dropped on arrival.
pub struct SessionManager<R, S>
where
    R: Responder,
    S: KeyValueStore,
{
    responder: R,
    store: S,
    config: SessionConfig,
    log: SessionLog,
    state: Mutex<State>,
    session_id: Uuid,
}

impl<R, S> SessionManager<R, S>
where
    R: Responder,
    S: KeyValueStore,
{
    /// Create a session manager with an empty log.
    ///
    /// Call [`SessionManager::rehydrate`] to load persisted history.
    #[must_use]
    pub fn new(responder: R, store: S, config: SessionConfig) -> Self {
        let log = SessionLog::new(config.capacity);
        Self {
            responder,
            store,
            config,
            log,
            state: Mutex::new(State {
                busy: false,
                epoch: 0,
                next_id: 1,
                pending: None,
                persistence: Persistence::Enabled,
                latest_analysis: None,
            }),
            session_id: Uuid::new_v4(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load persisted history and return the messages for the initial paint.
    ///
    /// A missing, unreadable or malformed blob yields an empty log; this
    /// never fails. The full bounded log is kept for append accounting, but
    /// only the newest `initial_view` messages are returned.
    pub fn rehydrate(&self) -> Vec<Message> {
        let mut state = self.lock();

        let blob = match self.store.get(&self.config.storage_key) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "history unavailable, continuing in memory: {e}");
                state.persistence = Persistence::MemoryOnly;
                None
            }
        };

        let messages = match blob.as_deref().map(|b| record::decode(b, state.next_id)) {
            Some(Ok(messages)) => messages,
            Some(Err(e)) => {
                tracing::warn!(session_id = %self.session_id, "ignoring malformed history: {e}");
                Vec::new()
            }
            None => Vec::new(),
        };

        if let Some(last) = messages.last() {
            state.next_id = last.id().0 + 1;
        }
        tracing::debug!(session_id = %self.session_id, count = messages.len(), "rehydrated history");
        self.log.restore(messages);
        drop(state);

        self.initial_view()
    }

    /// Newest messages for the initial paint.
    #[must_use]
    pub fn initial_view(&self) -> Vec<Message> {
        self.log.tail(self.config.initial_view)
    }

    /// Send a user message and append the reply.
    ///
    /// The user message is appended before the responder is contacted.
    /// Responder failures become a single error message in the log; they
    /// are reported in the returned [`ExchangeOutcome`], never as `Err`.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] without touching the log when the input
    /// is blank, too long, or another exchange is outstanding.
    pub async fn submit(&self, raw: &str) -> Result<Exchange, ValidationError> {
        let text = validate_input(raw, self.config.max_input_chars)?.to_string();

        let (user_message, epoch) = {
            let mut state = self.lock();
            if state.busy {
                return Err(ValidationError::Busy);
            }
            let id = state.allocate_id();
            state.busy = true;
            state.pending = Some(PendingRequest {
                kind: ExchangeKind::Reply { user_message: id },
                started_at: Utc::now(),
                cancelled: false,
            });
            self.append_locked(&mut state, Message::user(id, text.as_str()));
            (id, state.epoch)
        };
        let _guard = BusyGuard {
            state: &self.state,
            epoch,
        };
        tracing::debug!(session_id = %self.session_id, message_id = %user_message, epoch, "submitted");

        let result = self.responder.respond(&text).await;

        let (replies, outcome) = match result {
            Ok(reply) => self.append_reply(epoch, reply).await,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, message_id = %user_message, "responder failed: {e}");
                let appended = self.append_current(epoch, |id| {
                    Message::error(id, self.config.fallback_text.as_str())
                });
                match appended {
                    Some(id) => (vec![id], ExchangeOutcome::Failed { reason: e.to_string() }),
                    None => (Vec::new(), ExchangeOutcome::Discarded),
                }
            }
        };

        Ok(Exchange {
            user_message,
            replies,
            outcome,
        })
    }

    /// Append text, then media, then suggestion, pacing between them.
    async fn append_reply(&self, epoch: u64, reply: Reply) -> (Vec<MessageId>, ExchangeOutcome) {
        let Reply {
            text,
            media_url,
            suggestion,
            analysis,
        } = reply;
        let caption = analysis.topic().map(str::to_string);

        let Some(first) = self.append_current(epoch, |id| Message::assistant(id, text.as_str()))
        else {
            return (Vec::new(), ExchangeOutcome::Discarded);
        };
        {
            let mut state = self.lock();
            if state.epoch == epoch {
                state.latest_analysis = Some(analysis);
            }
        }
        let mut replies = vec![first];

        let mut follow_ups = Vec::with_capacity(2);
        if let Some(url) = media_url {
            follow_ups.push(FollowUp::Media { url, caption });
        }
        if let Some(text) = suggestion {
            follow_ups.push(FollowUp::Suggestion(text));
        }

        for follow_up in follow_ups {
            let pacing = self.config.reply_pacing();
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            let appended = self.append_current(epoch, |id| match follow_up {
                FollowUp::Media { url, caption } => Message::media(id, url, caption),
                FollowUp::Suggestion(text) => Message::assistant(id, text),
            });
            match appended {
                Some(id) => replies.push(id),
                None => break,
            }
        }

        tracing::debug!(session_id = %self.session_id, count = replies.len(), "reply appended");
        (replies, ExchangeOutcome::Replied)
    }

    /// Append a message if the exchange started at `epoch` is still live.
    fn append_current(
        &self,
        epoch: u64,
        build: impl FnOnce(MessageId) -> Message,
    ) -> Option<MessageId> {
        let mut state = self.lock();
        if !state.is_current(epoch) {
            tracing::debug!(session_id = %self.session_id, epoch, "dropping reply to a stale exchange");
            return None;
        }
        let id = state.allocate_id();
        self.append_locked(&mut state, build(id));
        Some(id)
    }

    fn append_locked(&self, state: &mut State, msg: Message) {
        self.log.push(msg);
        self.persist_locked(state);
    }

    fn persist_locked(&self, state: &mut State) {
        if state.persistence == Persistence::MemoryOnly {
            return;
        }
        let result = record::encode(&self.log.snapshot())
            .map_err(PersistenceError::from)
            .and_then(|blob| self.store.set(&self.config.storage_key, &blob));
        if let Err(e) = result {
            tracing::warn!(session_id = %self.session_id, "history write failed, continuing in memory: {e}");
            state.persistence = Persistence::MemoryOnly;
        }
    }

    /// Ask the responder for a different media reference about `topic` and
    /// swap it into the most recent media message.
    ///
    /// Never appends. Responder failures leave the message untouched and are
    /// only logged.
    ///
    /// # Errors
    /// Returns [`ValidationError::Empty`] for a blank topic and
    /// [`ValidationError::Busy`] while another exchange is outstanding.
    pub async fn request_alternate_media(&self, topic: &str) -> Result<MediaRefresh, ValidationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ValidationError::Empty);
        }

        let (target, epoch) = {
            let mut state = self.lock();
            if state.busy {
                return Err(ValidationError::Busy);
            }
            let Some(target) = self.log.latest_media() else {
                return Ok(MediaRefresh::NoMedia);
            };
            state.busy = true;
            state.pending = Some(PendingRequest {
                kind: ExchangeKind::AlternateMedia { target },
                started_at: Utc::now(),
                cancelled: false,
            });
            (target, state.epoch)
        };
        let _guard = BusyGuard {
            state: &self.state,
            epoch,
        };

        let url = match self.responder.alternate_media(topic).await {
            Ok(Some(url)) => url,
            Ok(None) => return Ok(MediaRefresh::Unchanged),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, topic, "alternate media failed: {e}");
                return Ok(MediaRefresh::Unchanged);
            }
        };

        let mut state = self.lock();
        if !state.is_current(epoch) || !self.log.replace_media(target, url.as_str()) {
            return Ok(MediaRefresh::Unchanged);
        }
        self.persist_locked(&mut state);
        Ok(MediaRefresh::Replaced { id: target, url })
    }

    /// Empty the log and the persisted history. Idempotent.
    ///
    /// A reply to an exchange started before the reset is dropped when it
    /// arrives.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.busy = false;
        state.pending = None;
        state.latest_analysis = None;
        self.log.clear();

        match self.store.remove(&self.config.storage_key) {
            Ok(()) => state.persistence = Persistence::Enabled,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "history clear failed, continuing in memory: {e}");
                state.persistence = Persistence::MemoryOnly;
            }
        }
        tracing::debug!(session_id = %self.session_id, epoch = state.epoch, "session reset");
    }

    /// Mark the outstanding exchange cancelled.
    ///
    /// The request itself runs to completion; its result is discarded.
    /// Returns `false` when nothing is outstanding.
    pub fn cancel_pending(&self) -> bool {
        let mut state = self.lock();
        match state.pending.as_mut() {
            Some(pending) if !pending.cancelled => {
                pending.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Recent exchanges recorded by the responder. Failures yield an empty list.
    pub async fn recent_history(&self, limit: usize) -> Vec<HistoryRecord> {
        match self.responder.history(limit).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "history fetch failed: {e}");
                Vec::new()
            }
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    #[must_use]
    pub fn pending(&self) -> Option<PendingRequest> {
        self.lock().pending.clone()
    }

    #[must_use]
    pub fn persistence(&self) -> Persistence {
        self.lock().persistence
    }

    /// Analysis attached to the latest reply.
    #[must_use]
    pub fn latest_analysis(&self) -> Option<EmotionAnalysis> {
        self.lock().latest_analysis.clone()
    }

    /// Topic to pass to [`SessionManager::request_alternate_media`].
    #[must_use]
    pub fn latest_topic(&self) -> Option<String> {
        self.lock()
            .latest_analysis
            .as_ref()
            .and_then(EmotionAnalysis::topic)
            .map(str::to_string)
    }

    /// Whole log plus render state.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let busy = self.is_busy();
        let messages = self.log.snapshot();
        let greeting = messages.is_empty().then(|| self.config.greeting.clone());
        SessionView {
            messages,
            busy,
            greeting,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.log.snapshot()
    }

    /// Get a receiver for log changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.log.subscribe()
    }

    #[must_use]
    pub const fn log(&self) -> &SessionLog {
        &self.log
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }
}

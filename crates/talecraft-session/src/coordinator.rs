use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use talecraft_client::{ApiError, CancelToken, StreamDecoder, StreamSource};
use talecraft_types::{GenerateRequest, SessionStatus, Slot, StreamMessage};
use tokio::task::JoinHandle;

use crate::listener::GenerationListener;

/// How long `cancel` waits for a session task to wind down before aborting it
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Identifies one session; never reused within a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Mutable state of the session currently owning a slot
struct SessionRecord {
    id: Option<SessionId>,
    status: SessionStatus,
    text: String,
    cancel: Option<CancelToken>,
    listener: Option<Arc<dyn GenerationListener>>,
}

impl SessionRecord {
    fn idle() -> Self {
        Self {
            id: None,
            status: SessionStatus::Idle,
            text: String::new(),
            cancel: None,
            listener: None,
        }
    }
}

struct SlotState {
    /// Serializes `start`/`cancel`/`reset` on the slot
    control: tokio::sync::Mutex<()>,
    /// Held while deciding whether a callback may fire and while it runs
    dispatch: Mutex<()>,
    record: Mutex<SessionRecord>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SlotState {
    fn new() -> Self {
        Self {
            control: tokio::sync::Mutex::new(()),
            dispatch: Mutex::new(()),
            record: Mutex::new(SessionRecord::idle()),
            task: Mutex::new(None),
        }
    }
}

/// Recover the guard of a poisoned lock; a panicking listener must not wedge the slot
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns at most one live generation per [`Slot`].
///
/// A session that was cancelled or superseded never delivers another
/// callback: every delivery re-checks, under the slot's dispatch lock, that
/// the session still owns the slot and is live, and cancellation flips the
/// status under that same lock.
pub struct GenerationCoordinator<S: StreamSource + 'static> {
    source: Arc<S>,
    slots: Mutex<HashMap<Slot, Arc<SlotState>>>,
    next_id: AtomicU64,
    teardown_grace: Duration,
    verbose: bool,
}

impl<S: StreamSource + 'static> GenerationCoordinator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            teardown_grace: DEFAULT_TEARDOWN_GRACE,
            verbose: false,
        }
    }

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    /// Dump decoded stream records to the console
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start a streaming generation in `slot`.
    ///
    /// A live session in the slot is cancelled first and its task awaited
    /// before the new connection is opened.
    pub async fn start(
        &self,
        slot: Slot,
        request: GenerateRequest,
        listener: Arc<dyn GenerationListener>,
    ) -> SessionId {
        let state = self.slot_state(&slot);
        let _control = state.control.lock().await;

        if self.cancel_locked(&slot, &state).await {
            log::info!("[{}] superseding live session", slot);
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let cancel = CancelToken::new();
        {
            let _gate = lock(&state.dispatch);
            *lock(&state.record) = SessionRecord {
                id: Some(id),
                status: SessionStatus::Connecting,
                text: String::new(),
                cancel: Some(cancel.clone()),
                listener: Some(listener.clone()),
            };
        }
        log::info!("[{}] {} connecting", slot, id);

        let runner = SessionRunner {
            id,
            slot,
            state: state.clone(),
            cancel,
            listener,
            verbose: self.verbose,
        };
        let handle = tokio::spawn(runner.run(self.source.clone(), request));
        *lock(&state.task) = Some(handle);

        id
    }

    /// Cancel the live session in `slot`, if any. Idempotent.
    ///
    /// Once this returns no callback of the cancelled session fires, and its
    /// connection has been closed (or its task aborted after the teardown
    /// grace period).
    ///
    /// A listener callback already running when `cancel` is called is waited
    /// for before the grace period starts, so a blocking listener stalls this
    /// call (and `start` on the same slot) for as long as it blocks.
    pub async fn cancel(&self, slot: &Slot) {
        let Some(state) = self.existing_slot(slot) else {
            return;
        };
        let _control = state.control.lock().await;
        self.cancel_locked(slot, &state).await;
    }

    /// Return `slot` to `Idle`, cancelling a live session first
    pub async fn reset(&self, slot: &Slot) {
        let Some(state) = self.existing_slot(slot) else {
            return;
        };
        let _control = state.control.lock().await;
        self.cancel_locked(slot, &state).await;

        let _gate = lock(&state.dispatch);
        *lock(&state.record) = SessionRecord::idle();
    }

    pub fn status(&self, slot: &Slot) -> SessionStatus {
        match self.existing_slot(slot) {
            Some(state) => {
                let record = lock(&state.record);
                record.status
            }
            None => SessionStatus::Idle,
        }
    }

    /// Text accumulated by the slot's current (or last) session
    pub fn text(&self, slot: &Slot) -> String {
        match self.existing_slot(slot) {
            Some(state) => {
                let record = lock(&state.record);
                record.text.clone()
            }
            None => String::new(),
        }
    }

    /// Id of the session currently owning `slot`
    pub fn session_id(&self, slot: &Slot) -> Option<SessionId> {
        let state = self.existing_slot(slot)?;
        let record = lock(&state.record);
        record.id
    }

    fn slot_state(&self, slot: &Slot) -> Arc<SlotState> {
        lock(&self.slots)
            .entry(slot.clone())
            .or_insert_with(|| Arc::new(SlotState::new()))
            .clone()
    }

    fn existing_slot(&self, slot: &Slot) -> Option<Arc<SlotState>> {
        lock(&self.slots).get(slot).cloned()
    }

    /// Cancel and tear down the slot's session. Caller holds `state.control`.
    /// Returns true if a live session was cancelled.
    async fn cancel_locked(&self, slot: &Slot, state: &SlotState) -> bool {
        let was_live = {
            let _gate = lock(&state.dispatch);
            let (was_live, listener) = {
                let mut record = lock(&state.record);
                if record.status.is_live() {
                    record.status = SessionStatus::Cancelled;
                    if let Some(token) = &record.cancel {
                        token.cancel();
                    }
                    (true, record.listener.clone())
                } else {
                    (false, None)
                }
            };
            if let Some(listener) = listener {
                listener.on_cancelled();
            }
            was_live
        };

        let task = lock(&state.task).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(self.teardown_grace, &mut task).await.is_err() {
                log::warn!(
                    "[{}] session did not stop within {:?}, aborting",
                    slot,
                    self.teardown_grace
                );
                task.abort();
            }
        }

        if was_live {
            log::info!("[{}] session cancelled", slot);
        }
        was_live
    }
}

/// Callback produced while the record lock is held, fired after releasing it
enum Event {
    Chunk(String),
    Complete(String),
    Error(ApiError),
}

/// Background half of one session
struct SessionRunner {
    id: SessionId,
    slot: Slot,
    state: Arc<SlotState>,
    cancel: CancelToken,
    listener: Arc<dyn GenerationListener>,
    verbose: bool,
}

impl SessionRunner {
    async fn run<S: StreamSource>(self, source: Arc<S>, request: GenerateRequest) {
        let body = match source.open_stream(&request, &self.cancel).await {
            Ok(body) => body,
            Err(e) => return self.fail(e),
        };

        let result = StreamDecoder::new()
            .with_verbose(self.verbose)
            .run(body, &self.cancel, |message| self.handle(message))
            .await;

        // The stream (and its connection) is dropped by now.
        if let Err(e) = result {
            self.fail(e);
        }
    }

    fn handle(&self, message: StreamMessage) {
        match message {
            StreamMessage::Start => self.dispatch(|record| {
                record.status = SessionStatus::Streaming;
                None
            }),
            StreamMessage::Chunk { text } => self.dispatch(|record| {
                record.status = SessionStatus::Streaming;
                record.text.push_str(&text);
                Some(Event::Chunk(record.text.clone()))
            }),
            StreamMessage::Done { full_text } => self.dispatch(|record| {
                if !full_text.is_empty() {
                    record.text = full_text;
                }
                record.status = SessionStatus::Completed;
                Some(Event::Complete(record.text.clone()))
            }),
            StreamMessage::Error { message } => self.fail(ApiError::GenerationFailed { message }),
        }
    }

    fn fail(&self, error: ApiError) {
        if error.is_cancelled() {
            return;
        }
        self.dispatch(|record| {
            record.status = SessionStatus::Failed;
            Some(Event::Error(error))
        });
    }

    /// Apply `update` and fire the resulting callback, but only while this
    /// session still owns the slot and is live
    fn dispatch<F>(&self, update: F)
    where
        F: FnOnce(&mut SessionRecord) -> Option<Event>,
    {
        let _gate = lock(&self.state.dispatch);
        let event = {
            let mut record = lock(&self.state.record);
            if record.id != Some(self.id) || !record.status.is_live() || self.cancel.is_cancelled() {
                log::debug!("[{}] dropping output of stale {}", self.slot, self.id);
                return;
            }
            update(&mut record)
        };

        match event {
            Some(Event::Chunk(text)) => self.listener.on_chunk(&text),
            Some(Event::Complete(text)) => {
                log::info!("[{}] {} completed ({} chars)", self.slot, self.id, text.chars().count());
                self.listener.on_complete(&text)
            }
            Some(Event::Error(error)) => {
                log::warn!("[{}] {} failed: {}", self.slot, self.id, error);
                self.listener.on_error(&error)
            }
            None => {}
        }
    }
}

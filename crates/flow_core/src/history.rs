//! Binding between the logical current step and the platform's navigable
//! history stack.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{HistoryEntry, Step},
    error::FlowError,
};
use tracing::{debug, info, warn};
use url::Url;

pub type SubscriptionId = u64;

/// One frame of the platform history stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Opaque state; frames the flow did not create may carry anything.
    pub state: Option<Value>,
    pub fragment: Option<String>,
}

impl Frame {
    pub fn for_entry(entry: HistoryEntry) -> Self {
        Self {
            state: Some(entry.to_state()),
            fragment: Some(entry.step.fragment()),
        }
    }

    /// A frame with no state, as left behind by a page load or by an
    /// external script.
    pub fn foreign() -> Self {
        Self {
            state: None,
            fragment: None,
        }
    }

    pub fn entry(&self) -> Option<HistoryEntry> {
        self.state.as_ref().and_then(HistoryEntry::from_state)
    }
}

/// Raised by the platform after a back/forward traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct PopEvent {
    pub state: Option<Value>,
}

/// The platform's session history.
pub trait HistoryBackend: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }
    fn push_frame(&self, frame: Frame);
    fn replace_frame(&self, frame: Frame);
    /// Moves the cursor by `delta` frames (negative is back). Returns `false`
    /// when there is no frame there. A successful traversal is reported to
    /// subscribers as a [`PopEvent`], never synchronously to the caller.
    fn traverse(&self, delta: isize) -> bool;
    fn top_frame(&self) -> Option<Frame>;
    /// Frames at or below the cursor.
    fn depth(&self) -> usize;
    /// Frames above the cursor, reachable by a forward gesture.
    fn forward_depth(&self) -> usize;
    fn location_fragment(&self) -> Option<String>;
    fn subscribe(&self, sink: Sender<PopEvent>) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Stand-in used when the platform exposes no history API.
pub struct MissingHistory;

impl HistoryBackend for MissingHistory {
    fn is_available(&self) -> bool {
        false
    }

    fn push_frame(&self, _frame: Frame) {}

    fn replace_frame(&self, _frame: Frame) {}

    fn traverse(&self, _delta: isize) -> bool {
        false
    }

    fn top_frame(&self) -> Option<Frame> {
        None
    }

    fn depth(&self) -> usize {
        0
    }

    fn forward_depth(&self) -> usize {
        0
    }

    fn location_fragment(&self) -> Option<String> {
        None
    }

    fn subscribe(&self, _sink: Sender<PopEvent>) -> SubscriptionId {
        0
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}

#[derive(Debug)]
struct MemoryHistoryState {
    frames: Vec<Frame>,
    cursor: usize,
    location: Option<Url>,
    subscribers: Vec<(SubscriptionId, Sender<PopEvent>)>,
    next_subscription: SubscriptionId,
}

/// In-process session history with browser semantics: pushing drops any
/// forward frames, traversal notifies subscribers asynchronously through
/// their channel. Clones share the same stack.
#[derive(Clone)]
pub struct MemoryHistory {
    inner: Arc<Mutex<MemoryHistoryState>>,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHistory {
    /// Starts with the single stateless frame of a fresh page load.
    pub fn new() -> Self {
        Self::with_parsed_location(None)
    }

    /// Starts at `location`, whose fragment acts as the deep link.
    pub fn with_location(location: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(location)?;
        Ok(Self::with_parsed_location(Some(parsed)))
    }

    fn with_parsed_location(location: Option<Url>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryHistoryState {
                frames: vec![Frame::foreign()],
                cursor: 0,
                location,
                subscribers: Vec::new(),
                next_subscription: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHistoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Back gesture or hardware back button.
    pub fn back(&self) -> bool {
        self.traverse(-1)
    }

    pub fn forward(&self) -> bool {
        self.traverse(1)
    }

    /// Pushes a frame the flow did not create, e.g. from an embedding page.
    pub fn push_foreign(&self) {
        self.push_frame(Frame::foreign());
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.lock().frames.clone()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Steps of all frames, with `None` for frames without a flow entry.
    pub fn steps(&self) -> Vec<Option<Step>> {
        self.lock()
            .frames
            .iter()
            .map(|frame| frame.entry().map(|entry| entry.step))
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl fmt::Debug for MemoryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryHistory")
            .field("frames", &state.frames.len())
            .field("cursor", &state.cursor)
            .finish()
    }
}

fn apply_fragment(location: &mut Option<Url>, frame: &Frame) {
    if let (Some(url), Some(fragment)) = (location.as_mut(), frame.fragment.as_deref()) {
        url.set_fragment(Some(fragment.trim_start_matches('#')));
    }
}

impl HistoryBackend for MemoryHistory {
    fn push_frame(&self, frame: Frame) {
        let mut state = self.lock();
        let keep = state.cursor + 1;
        state.frames.truncate(keep);
        apply_fragment(&mut state.location, &frame);
        state.frames.push(frame);
        state.cursor = state.frames.len() - 1;
    }

    fn replace_frame(&self, frame: Frame) {
        let mut state = self.lock();
        apply_fragment(&mut state.location, &frame);
        let cursor = state.cursor;
        state.frames[cursor] = frame;
    }

    fn traverse(&self, delta: isize) -> bool {
        let mut state = self.lock();
        let Some(target) = state.cursor.checked_add_signed(delta) else {
            return false;
        };
        if delta == 0 || target >= state.frames.len() {
            return false;
        }
        state.cursor = target;
        let frame = state.frames[target].clone();
        apply_fragment(&mut state.location, &frame);

        let event = PopEvent { state: frame.state };
        state
            .subscribers
            .retain(|(_, sink)| sink.send(event.clone()).is_ok());
        true
    }

    fn top_frame(&self) -> Option<Frame> {
        let state = self.lock();
        state.frames.get(state.cursor).cloned()
    }

    fn depth(&self) -> usize {
        self.lock().cursor + 1
    }

    fn forward_depth(&self) -> usize {
        let state = self.lock();
        state.frames.len() - state.cursor - 1
    }

    fn location_fragment(&self) -> Option<String> {
        self.lock()
            .location
            .as_ref()
            .and_then(|url| url.fragment())
            .filter(|fragment| !fragment.is_empty())
            .map(str::to_string)
    }

    fn subscribe(&self, sink: Sender<PopEvent>) -> SubscriptionId {
        let mut state = self.lock();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscribers.push((id, sink));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock()
            .subscribers
            .retain(|(subscription, _)| *subscription != id);
    }
}

/// Live registration for platform pop events. Dropping it unsubscribes.
pub struct PopSubscription {
    backend: Arc<dyn HistoryBackend>,
    id: SubscriptionId,
    events: Receiver<PopEvent>,
}

impl PopSubscription {
    pub fn open(backend: Arc<dyn HistoryBackend>) -> Self {
        let (sink, events) = unbounded();
        let id = backend.subscribe(sink);
        debug!(subscription = id, "subscribed to platform pop events");
        Self {
            backend,
            id,
            events,
        }
    }

    pub fn try_next(&self) -> Option<PopEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_drained(&self) -> bool {
        self.events.is_empty()
    }
}

impl Drop for PopSubscription {
    fn drop(&mut self) {
        self.backend.unsubscribe(self.id);
        debug!(subscription = self.id, "unsubscribed from platform pop events");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    Platform,
    /// No platform history: the step is tracked in memory only and
    /// back/forward navigation is unavailable.
    Degraded,
}

type PopHandler = Box<dyn FnMut(Step)>;

pub struct HistorySynchronizer {
    backend: Arc<dyn HistoryBackend>,
    mode: HistoryMode,
    current: Step,
    initialized: bool,
    subscription: Option<PopSubscription>,
    pop_handlers: Vec<PopHandler>,
}

impl HistorySynchronizer {
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        let mode = if backend.is_available() {
            HistoryMode::Platform
        } else {
            warn!("platform history unavailable; tracking steps in memory only");
            HistoryMode::Degraded
        };
        Self {
            backend,
            mode,
            current: Step::Search,
            initialized: false,
            subscription: None,
            pop_handlers: Vec::new(),
        }
    }

    pub fn degraded() -> Self {
        Self::new(Arc::new(MissingHistory))
    }

    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    pub fn supports_traversal(&self) -> bool {
        self.mode == HistoryMode::Platform
    }

    pub fn current(&self) -> Step {
        self.current
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Frames at or below the platform cursor; always 1 when degraded.
    pub fn depth(&self) -> usize {
        match self.mode {
            HistoryMode::Platform => self.backend.depth(),
            HistoryMode::Degraded => 1,
        }
    }

    /// Deep-linked step from the startup location, if it names a known step.
    pub fn deep_link(&self) -> Option<Step> {
        let fragment = self.backend.location_fragment()?;
        match fragment.parse::<Step>() {
            Ok(step) => Some(step),
            Err(err) => {
                debug!(%fragment, error = %err, "ignoring deep link");
                None
            }
        }
    }

    pub fn initialize(&mut self) -> Result<Step, FlowError> {
        self.initialize_with(|_| true)
    }

    /// Seeds the stack with the deep-linked step when `accept` agrees, else
    /// with `search`, and opens the pop subscription. Runs once.
    pub fn initialize_with(
        &mut self,
        accept: impl FnOnce(Step) -> bool,
    ) -> Result<Step, FlowError> {
        if self.initialized {
            return Err(FlowError::AlreadyInitialized);
        }
        let step = match self.deep_link() {
            Some(step) if accept(step) => step,
            Some(step) => {
                info!(%step, "deep link refused; starting at search");
                Step::Search
            }
            None => Step::Search,
        };

        self.initialized = true;
        if self.mode == HistoryMode::Platform {
            self.subscription = Some(PopSubscription::open(self.backend.clone()));
        }
        self.replace(step);
        info!(%step, mode = ?self.mode, "history initialized");
        Ok(step)
    }

    pub fn advance(&mut self, step: Step) {
        if self.mode == HistoryMode::Platform {
            self.backend.push_frame(Frame::for_entry(HistoryEntry::new(step)));
        }
        self.current = step;
    }

    pub fn replace(&mut self, step: Step) {
        if self.mode == HistoryMode::Platform {
            self.backend
                .replace_frame(Frame::for_entry(HistoryEntry::new(step)));
        }
        self.current = step;
    }

    /// Observers run after the step has changed, once per processed pop.
    pub fn on_pop(&mut self, handler: impl FnMut(Step) + 'static) {
        self.pop_handlers.push(Box::new(handler));
    }

    /// Asks the platform to traverse; the resulting pop arrives through
    /// [`Self::next_pop`].
    pub fn request_traversal(&mut self, delta: isize) -> Result<(), FlowError> {
        if self.mode == HistoryMode::Degraded {
            return Err(FlowError::HistoryUnavailable);
        }
        if self.subscription.is_none() {
            return Err(FlowError::ShutDown);
        }
        if !self.backend.traverse(delta) {
            return Err(FlowError::HistoryExhausted);
        }
        Ok(())
    }

    /// Takes the next queued pop, makes its step current and notifies the
    /// observers. Frames without a recognizable entry count as `search`.
    pub fn next_pop(&mut self) -> Option<Step> {
        self.next_pop_with(|step| step)
    }

    /// Like [`Self::next_pop`], but `settle` may redirect the landed step.
    /// A redirected landing replaces the frame it arrived on, unless later
    /// pops have already moved the platform cursor past it.
    pub fn next_pop_with(&mut self, settle: impl FnOnce(Step) -> Step) -> Option<Step> {
        let subscription = self.subscription.as_ref()?;
        let event = subscription.try_next()?;
        let cursor_on_landing = subscription.is_drained();
        let landed = match event.state.as_ref().and_then(HistoryEntry::from_state) {
            Some(entry) => entry.step,
            None => {
                warn!(state = ?event.state, "unrecognized pop state; falling back to search");
                Step::Search
            }
        };
        let step = settle(landed);
        if step != landed {
            info!(%landed, %step, "pop landed on a step the session cannot show");
            if cursor_on_landing {
                self.backend
                    .replace_frame(Frame::for_entry(HistoryEntry::new(step)));
            }
        }
        self.current = step;
        for handler in &mut self.pop_handlers {
            handler(step);
        }
        Some(step)
    }

    /// While on `search`, keeps a `search` frame on top with at least one
    /// frame below it and none above, so a back gesture lands on `search`
    /// instead of leaving the flow and a forward gesture cannot replay steps
    /// of the cleared session. Returns whether a frame was pushed.
    pub fn guard_against_stack_exhaustion(&mut self) -> bool {
        if self.mode == HistoryMode::Degraded || self.current != Step::Search {
            return false;
        }
        let top_is_search = self
            .backend
            .top_frame()
            .and_then(|frame| frame.entry())
            .is_some_and(|entry| entry.step == Step::Search);
        if top_is_search && self.backend.depth() > 1 && self.backend.forward_depth() == 0 {
            return false;
        }
        self.backend
            .push_frame(Frame::for_entry(HistoryEntry::new(Step::Search)));
        debug!(depth = self.backend.depth(), "pushed guard frame for search");
        true
    }

    /// Drops the pop subscription; traversal requests fail afterwards.
    pub fn detach(&mut self) {
        self.subscription = None;
        self.pop_handlers.clear();
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;

//! Glue between the poller and the vote state: every message the poller
//! delivers is filtered by the window, parsed by the resolver and counted by
//! the tally. State lives behind one mutex so the presentation side can read
//! snapshots from another task while the poller writes.

use crate::chat::ChatMessage;
use crate::listeners::{ListenerId, Listeners};
use crate::poller::ChatPoller;
use crate::resolver::OptionResolver;
use crate::tally::{CountMode, Tally, TallySnapshot};
use crate::window::{VoteWindow, WindowEvent, WindowState};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub type WindowClosedListener = dyn Fn(&[ChatMessage]) + Send + Sync;

struct Inner {
    window: VoteWindow,
    tally: Tally,
    resolver: OptionResolver,
    count_mode: CountMode,
}

pub struct VoteSession {
    inner: Mutex<Inner>,
    closed_listeners: Listeners<WindowClosedListener>,
}

impl VoteSession {
    pub fn new(option_count: usize, count_mode: CountMode, resolver: OptionResolver) -> Self {
        Self {
            inner: Mutex::new(Inner {
                window: VoteWindow::new(),
                tally: Tally::new(option_count),
                resolver,
                count_mode,
            }),
            closed_listeners: Listeners::new(),
        }
    }

    /// Subscribes to the poller's message and stream-change events. The
    /// poller only holds a weak reference back to the session.
    pub fn attach(self: &Arc<Self>, poller: &ChatPoller) -> (ListenerId, ListenerId) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let on_message = poller.subscribe(move |msg| {
            if let Some(session) = weak.upgrade() {
                session.handle_message(msg);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let on_change = poller.subscribe_stream_change(move |_, _| {
            if let Some(session) = weak.upgrade() {
                session.reset();
            }
        });

        (on_message, on_change)
    }

    pub fn handle_message(&self, msg: &ChatMessage) -> WindowEvent {
        let event = {
            let mut inner = self.inner.lock();
            let event = inner.window.observe(msg);
            if event == WindowEvent::Accepted {
                match inner.resolver.parse(&msg.text) {
                    Some(option) => {
                        inner.tally.accumulate(option, &msg.author_id);
                    }
                    None => tracing::trace!(author = %msg.author_id, "not a vote"),
                }
            }
            event
        };

        if let WindowEvent::Closed(batch) = &event {
            tracing::info!(messages = batch.len(), "vote window closed");
            self.closed_listeners.for_each(|listener| listener(batch.as_slice()));
        }
        event
    }

    pub fn open(&self, duration_secs: u64) {
        self.open_at(duration_secs, chrono::Utc::now().timestamp_millis());
    }

    /// Opens a new window at `now_ms`, discarding the previous window's votes.
    pub fn open_at(&self, duration_secs: u64, now_ms: i64) {
        let mut inner = self.inner.lock();
        inner.tally.reset();
        inner.window.open(duration_secs, now_ms);
        tracing::info!(duration_secs, open_at = now_ms, "vote window opened");
    }

    pub fn close(&self) {
        self.close_at(chrono::Utc::now().timestamp_millis());
    }

    pub fn close_at(&self, now_ms: i64) {
        let mut inner = self.inner.lock();
        if inner.window.state() == WindowState::Open {
            inner.window.close(now_ms);
            tracing::info!(close_at = inner.window.close_at(), "vote window closing");
        }
    }

    /// Drops the current window and its votes, e.g. after the stream changed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.window.reset();
        inner.tally.reset();
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let inner = self.inner.lock();
        inner.tally.snapshot(inner.count_mode)
    }

    pub fn window_state(&self) -> WindowState {
        self.inner.lock().window.state()
    }

    /// End of the active window in epoch millis, if one is open.
    pub fn closes_at(&self) -> Option<i64> {
        self.window_timing().1
    }

    /// Window state and, while open, its close instant, read together.
    pub fn window_timing(&self) -> (WindowState, Option<i64>) {
        let inner = self.inner.lock();
        let state = inner.window.state();
        (state, (state == WindowState::Open).then(|| inner.window.close_at()))
    }

    pub fn count_mode(&self) -> CountMode {
        self.inner.lock().count_mode
    }

    pub fn set_count_mode(&self, mode: CountMode) {
        self.inner.lock().count_mode = mode;
    }

    pub fn option_count(&self) -> usize {
        self.inner.lock().tally.option_count()
    }

    pub fn set_option_count(&self, option_count: usize) {
        self.inner.lock().tally.set_option_count(option_count);
    }

    pub fn subscribe_window_closed(
        &self,
        listener: impl Fn(&[ChatMessage]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.closed_listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe_window_closed(&self, id: ListenerId) -> bool {
        self.closed_listeners.remove(id)
    }
}

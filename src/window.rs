use crate::chat::ChatMessage;

/// `open_at` value while no window is active.
pub const NOT_OPEN: i64 = i64::MAX;
/// `close_at` value while no window is active.
pub const NOT_CLOSING: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Open,
    Closed,
}

/// Result of offering one message to the window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    /// Published before the window opened, or no window is active.
    Ignored,
    /// Published strictly inside the window; it was added to the batch.
    Accepted,
    /// First message at or beyond `close_at`. Carries every accepted message.
    Closed(Vec<ChatMessage>),
}

/// A single voting period. Membership is decided by the server timestamp on
/// each message, so closing is observed lazily when the first message past
/// `close_at` arrives.
#[derive(Debug, Clone)]
pub struct VoteWindow {
    open_at: i64,
    close_at: i64,
    state: WindowState,
    batch: Vec<ChatMessage>,
}

impl VoteWindow {
    pub fn new() -> Self {
        Self {
            open_at: NOT_OPEN,
            close_at: NOT_CLOSING,
            state: WindowState::Idle,
            batch: Vec::new(),
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn open_at(&self) -> i64 {
        self.open_at
    }

    pub fn close_at(&self) -> i64 {
        self.close_at
    }

    pub fn batch(&self) -> &[ChatMessage] {
        &self.batch
    }

    /// Starts a fresh window at `now_ms`, discarding anything gathered before.
    pub fn open(&mut self, duration_secs: u64, now_ms: i64) {
        let duration_ms = i64::try_from(duration_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.batch.clear();
        self.open_at = now_ms;
        self.close_at = now_ms.saturating_add(duration_ms);
        self.state = WindowState::Open;
    }

    /// Pulls `close_at` forward to `now_ms`. The window actually closes on the
    /// next message published at or after that instant.
    pub fn close(&mut self, now_ms: i64) {
        if self.state != WindowState::Open {
            return;
        }
        self.close_at = now_ms.clamp(self.open_at, self.close_at);
    }

    /// Drops the window and its batch without emitting a close.
    pub fn reset(&mut self) {
        self.batch.clear();
        self.open_at = NOT_OPEN;
        self.close_at = NOT_CLOSING;
        self.state = WindowState::Idle;
    }

    pub fn observe(&mut self, msg: &ChatMessage) -> WindowEvent {
        let at = msg.published_at;
        if self.state != WindowState::Open || at <= self.open_at {
            return WindowEvent::Ignored;
        }
        if at < self.close_at {
            self.batch.push(msg.clone());
            return WindowEvent::Accepted;
        }

        self.open_at = NOT_OPEN;
        self.close_at = NOT_CLOSING;
        self.state = WindowState::Closed;
        WindowEvent::Closed(std::mem::take(&mut self.batch))
    }
}

impl Default for VoteWindow {
    fn default() -> Self {
        Self::new()
    }
}

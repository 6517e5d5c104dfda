use crate::chat::{ChatFetcher, ChatMessage, PollCursor};
use crate::listeners::{ListenerId, Listeners};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type MessageListener = dyn Fn(&ChatMessage) + Send + Sync;
pub type ShutdownListener = dyn Fn() + Send + Sync;
pub type StreamChangeListener = dyn Fn(&str, &str) + Send + Sync;

pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    /// Shutdown requested; honoured after the next completed fetch.
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No stream id yet; nothing fetched.
    NoStream,
    /// A fetch is still in flight.
    Busy,
    /// A page was fetched and this many messages dispatched.
    Fetched(usize),
    /// The page belonged to a stream that was replaced mid-request.
    Stale,
    /// The fetch failed; cursor and interval are unchanged.
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub initial_interval: Duration,
    pub fallback_interval: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
        }
    }
}

struct Control {
    stream_id: String,
    cursor: PollCursor,
    generation: u64,
    state: PollerState,
    interval: Duration,
}

/// Clears the in-flight flag even if the fetch future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cursor-based long-polling client for a live chat.
///
/// Each [`tick`](Self::tick) issues at most one fetch with the current
/// cursor and hands every returned message to the message listeners in
/// server order. [`run`](Self::run) drives ticks on a tokio timer whose
/// period follows the server's interval hint. There is no upper bound on
/// that hint and no jitter.
pub struct ChatPoller {
    fetcher: Arc<dyn ChatFetcher>,
    settings: PollerSettings,
    control: Mutex<Control>,
    in_flight: AtomicBool,
    message_listeners: Listeners<MessageListener>,
    shutdown_listeners: Listeners<ShutdownListener>,
    stream_listeners: Listeners<StreamChangeListener>,
}

impl ChatPoller {
    pub fn new(fetcher: Arc<dyn ChatFetcher>, settings: PollerSettings) -> Self {
        Self {
            fetcher,
            settings,
            control: Mutex::new(Control {
                stream_id: String::new(),
                cursor: PollCursor::default(),
                generation: 0,
                state: PollerState::Idle,
                interval: settings.initial_interval,
            }),
            in_flight: AtomicBool::new(false),
            message_listeners: Listeners::new(),
            shutdown_listeners: Listeners::new(),
            stream_listeners: Listeners::new(),
        }
    }

    /// Sets the stream and spawns the poll loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>, stream_id: impl Into<String>) -> JoinHandle<()> {
        self.set_stream_id(stream_id);
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run().await })
    }

    pub async fn run(&self) {
        tracing::info!(stream_id = %self.stream_id(), "chat poller started");
        loop {
            if self.tick().await == TickOutcome::Stopped {
                break;
            }
            tokio::time::sleep(self.interval()).await;
        }
        tracing::info!("chat poller stopped");
    }

    pub async fn tick(&self) -> TickOutcome {
        let (stream_id, cursor, generation) = {
            let mut control = self.control.lock();
            match control.state {
                PollerState::Stopped => return TickOutcome::Stopped,
                PollerState::Idle => control.state = PollerState::Running,
                PollerState::Running | PollerState::ShuttingDown => {}
            }
            if control.stream_id.is_empty() {
                control.interval = self.settings.fallback_interval;
                drop(control);
                // Nothing in flight to drain, so a pending shutdown completes now.
                if self.finish_shutdown() {
                    return TickOutcome::Stopped;
                }
                return TickOutcome::NoStream;
            }
            if self.in_flight.swap(true, Ordering::AcqRel) {
                return TickOutcome::Busy;
            }
            (control.stream_id.clone(), control.cursor.clone(), control.generation)
        };

        let result = {
            let _guard = InFlight(&self.in_flight);
            self.fetcher.fetch(&stream_id, &cursor).await
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, error = %e, "chat fetch failed, retrying");
                return TickOutcome::Failed;
            }
        };

        let messages = {
            let mut control = self.control.lock();
            if control.generation != generation {
                None
            } else {
                let (messages, next) = page.into_cursor();
                control.interval = if next.interval_hint_ms == 0 {
                    self.settings.fallback_interval
                } else {
                    Duration::from_millis(next.interval_hint_ms)
                };
                control.cursor = next;
                Some(messages)
            }
        };

        let outcome = match messages {
            Some(messages) => {
                tracing::debug!(stream_id = %stream_id, count = messages.len(), "chat page received");
                let listeners = self.message_listeners.snapshot();
                for msg in &messages {
                    for (_, listener) in listeners.iter() {
                        listener(msg);
                    }
                }
                TickOutcome::Fetched(messages.len())
            }
            None => {
                tracing::debug!(stream_id = %stream_id, "discarding page for replaced stream");
                TickOutcome::Stale
            }
        };

        if self.finish_shutdown() {
            return TickOutcome::Stopped;
        }
        outcome
    }

    fn finish_shutdown(&self) -> bool {
        {
            let mut control = self.control.lock();
            if control.state != PollerState::ShuttingDown {
                return false;
            }
            control.state = PollerState::Stopped;
        }
        self.shutdown_listeners.for_each(|listener| listener());
        true
    }

    /// Requests a stop after the current fetch cycle completes.
    pub fn shutdown(&self) {
        let mut control = self.control.lock();
        if control.state != PollerState::Stopped {
            control.state = PollerState::ShuttingDown;
            tracing::info!("chat poller shutting down");
        }
    }

    /// Replaces the stream id. A real change invalidates the cursor and
    /// notifies stream listeners with `(old, new)`. Returns whether it changed.
    pub fn set_stream_id(&self, stream_id: impl Into<String>) -> bool {
        let new = stream_id.into();
        let old = {
            let mut control = self.control.lock();
            if control.stream_id == new {
                return false;
            }
            control.cursor = PollCursor::default();
            control.generation += 1;
            std::mem::replace(&mut control.stream_id, new.clone())
        };
        tracing::info!(old = %old, new = %new, "chat stream changed");
        self.stream_listeners.for_each(|listener| listener(old.as_str(), new.as_str()));
        true
    }

    pub fn stream_id(&self) -> String {
        self.control.lock().stream_id.clone()
    }

    pub fn cursor(&self) -> PollCursor {
        self.control.lock().cursor.clone()
    }

    pub fn interval(&self) -> Duration {
        self.control.lock().interval
    }

    pub fn state(&self) -> PollerState {
        self.control.lock().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PollerState::Stopped
    }

    pub fn subscribe(&self, listener: impl Fn(&ChatMessage) + Send + Sync + 'static) -> ListenerId {
        self.message_listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.message_listeners.remove(id)
    }

    pub fn subscribe_shutdown(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.shutdown_listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe_shutdown(&self, id: ListenerId) -> bool {
        self.shutdown_listeners.remove(id)
    }

    pub fn subscribe_stream_change(
        &self,
        listener: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> ListenerId {
        self.stream_listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe_stream_change(&self, id: ListenerId) -> bool {
        self.stream_listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatPage;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<ChatPage>>>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedFetcher {
        fn push_page(&self, token: &str, hint_ms: u64, messages: Vec<ChatMessage>) {
            self.responses.lock().push_back(Ok(ChatPage {
                messages,
                next_token: Some(token.to_string()),
                interval_hint_ms: hint_ms,
            }));
        }

        fn push_error(&self) {
            self.responses
                .lock()
                .push_back(Err(anyhow::anyhow!("connection reset")));
        }
    }

    #[async_trait]
    impl ChatFetcher for ScriptedFetcher {
        async fn fetch(&self, stream_id: &str, cursor: &PollCursor) -> Result<ChatPage> {
            self.calls
                .lock()
                .push((stream_id.to_string(), cursor.token.clone()));
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatPage::default()))
        }
    }

    fn poller_with(fetcher: &Arc<ScriptedFetcher>) -> ChatPoller {
        let fetcher: Arc<dyn ChatFetcher> = fetcher.clone();
        ChatPoller::new(fetcher, PollerSettings::default())
    }

    fn collect_texts(poller: &ChatPoller) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        poller.subscribe(move |msg| sink.lock().push(msg.text.clone()));
        seen
    }

    #[tokio::test]
    async fn test_empty_stream_is_a_fast_noop() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let poller = poller_with(&fetcher);
        assert_eq!(poller.interval(), DEFAULT_INITIAL_INTERVAL);
        assert_eq!(poller.tick().await, TickOutcome::NoStream);
        assert_eq!(poller.interval(), DEFAULT_FALLBACK_INTERVAL);
        assert_eq!(poller.state(), PollerState::Running);
        assert!(fetcher.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dispatches_in_server_order_and_advances_cursor() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page(
            "t1",
            2500,
            vec![
                ChatMessage::new("a", "first", 3),
                ChatMessage::new("b", "second", 1),
            ],
        );
        fetcher.push_page("t2", 4000, vec![ChatMessage::new("c", "third", 5)]);

        let poller = poller_with(&fetcher);
        let seen = collect_texts(&poller);
        poller.set_stream_id("chat");

        assert_eq!(poller.tick().await, TickOutcome::Fetched(2));
        assert_eq!(poller.cursor().token.as_deref(), Some("t1"));
        assert_eq!(poller.interval(), Duration::from_millis(2500));

        assert_eq!(poller.tick().await, TickOutcome::Fetched(1));
        assert_eq!(poller.interval(), Duration::from_millis(4000));

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
        let calls = fetcher.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("chat".to_string(), None),
                ("chat".to_string(), Some("t1".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_cursor_and_interval() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page("t1", 3000, vec![]);
        fetcher.push_error();
        fetcher.push_page("t2", 3000, vec![]);

        let poller = poller_with(&fetcher);
        poller.set_stream_id("chat");
        poller.tick().await;

        assert_eq!(poller.tick().await, TickOutcome::Failed);
        assert_eq!(poller.cursor().token.as_deref(), Some("t1"));
        assert_eq!(poller.interval(), Duration::from_millis(3000));

        assert_eq!(poller.tick().await, TickOutcome::Fetched(0));
        let calls = fetcher.calls.lock().clone();
        assert_eq!(calls[2].1.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_zero_hint_uses_fallback() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page("t1", 0, vec![]);
        let poller = poller_with(&fetcher);
        poller.set_stream_id("chat");
        poller.tick().await;
        assert_eq!(poller.interval(), DEFAULT_FALLBACK_INTERVAL);
    }

    #[tokio::test]
    async fn test_stream_change_resets_cursor_and_notifies() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page("t1", 1000, vec![]);
        let poller = poller_with(&fetcher);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        poller.subscribe_stream_change(move |old, new| sink.lock().push((old.to_string(), new.to_string())));

        assert!(poller.set_stream_id("a"));
        poller.tick().await;
        assert!(!poller.cursor().is_empty());

        assert!(!poller.set_stream_id("a"));
        assert!(!poller.cursor().is_empty());

        assert!(poller.set_stream_id("b"));
        assert!(poller.cursor().is_empty());
        assert_eq!(
            *changes.lock(),
            vec![
                (String::new(), "a".to_string()),
                ("a".to_string(), "b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_deferred_to_next_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page("t1", 1000, vec![ChatMessage::new("a", "last", 1)]);
        let poller = poller_with(&fetcher);
        let seen = collect_texts(&poller);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&shutdowns);
        poller.subscribe_shutdown(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        poller.set_stream_id("chat");

        poller.shutdown();
        assert_eq!(poller.state(), PollerState::ShuttingDown);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);

        assert_eq!(poller.tick().await, TickOutcome::Stopped);
        assert_eq!(*seen.lock(), vec!["last"]);
        assert!(poller.is_stopped());
        assert_eq!(poller.tick().await, TickOutcome::Stopped);
        poller.shutdown();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_successful_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_error();
        fetcher.push_page("t1", 1000, vec![ChatMessage::new("a", "1", 1)]);
        let poller = poller_with(&fetcher);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&shutdowns);
        poller.subscribe_shutdown(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        poller.set_stream_id("chat");
        poller.shutdown();

        assert_eq!(poller.tick().await, TickOutcome::Failed);
        assert_eq!(poller.state(), PollerState::ShuttingDown);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);

        assert_eq!(poller.tick().await, TickOutcome::Stopped);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_without_stream_completes_on_next_tick() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let poller = poller_with(&fetcher);
        poller.shutdown();
        assert_eq!(poller.tick().await, TickOutcome::Stopped);
        assert!(poller.is_stopped());
    }

    struct GatedFetcher {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ChatFetcher for GatedFetcher {
        async fn fetch(&self, _stream_id: &str, _cursor: &PollCursor) -> Result<ChatPage> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(ChatPage {
                messages: vec![],
                next_token: Some("gated".to_string()),
                interval_hint_ms: 1000,
            })
        }
    }

    #[tokio::test]
    async fn test_tick_never_overlaps_in_flight_fetch() {
        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let dyn_fetcher: Arc<dyn ChatFetcher> = fetcher.clone();
        let poller = Arc::new(ChatPoller::new(dyn_fetcher, PollerSettings::default()));
        poller.set_stream_id("chat");

        let background = Arc::clone(&poller);
        let first = tokio::spawn(async move { background.tick().await });
        fetcher.entered.notified().await;

        assert_eq!(poller.tick().await, TickOutcome::Busy);
        fetcher.release.notify_one();
        assert_eq!(first.await.unwrap(), TickOutcome::Fetched(0));
        assert_eq!(poller.cursor().token.as_deref(), Some("gated"));
    }

    #[tokio::test]
    async fn test_page_for_replaced_stream_is_discarded() {
        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let dyn_fetcher: Arc<dyn ChatFetcher> = fetcher.clone();
        let poller = Arc::new(ChatPoller::new(dyn_fetcher, PollerSettings::default()));
        poller.set_stream_id("old");

        let background = Arc::clone(&poller);
        let first = tokio::spawn(async move { background.tick().await });
        fetcher.entered.notified().await;
        poller.set_stream_id("new");
        fetcher.release.notify_one();

        assert_eq!(first.await.unwrap(), TickOutcome::Stale);
        assert!(poller.cursor().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_after_shutdown() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.push_page("t1", 5000, vec![ChatMessage::new("a", "1", 1)]);
        fetcher.push_page("t2", 5000, vec![ChatMessage::new("b", "2", 2)]);
        let poller = Arc::new(poller_with(&fetcher));
        let seen = collect_texts(&poller);

        let stopper = Arc::clone(&poller);
        poller.subscribe(move |msg| {
            if msg.text == "2" {
                stopper.shutdown();
            }
        });

        let handle = poller.start("chat");
        handle.await.unwrap();

        assert!(poller.is_stopped());
        assert_eq!(*seen.lock(), vec!["1", "2"]);
        assert_eq!(fetcher.calls.lock().len(), 2);
    }
}

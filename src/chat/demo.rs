use super::{ChatFetcher, ChatMessage, ChatPage, PollCursor};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

const DEMO_INTERVAL_MS: u64 = 1000;
const MAX_PAGE_MESSAGES: usize = 5;
const DEMO_CHATTER: &[&str] = &["1", "2", "3", "4", "lol", "2!", "first", "1 for sure", "gg", "4"];

/// Fabricates a few chat messages per call so the vote pipeline can be
/// driven without a live stream or credentials.
pub struct DemoChatFetcher {
    viewers: usize,
    rng: Mutex<StdRng>,
}

impl DemoChatFetcher {
    pub fn new(viewers: usize) -> Self {
        Self::with_rng(viewers, StdRng::from_entropy())
    }

    /// Same chatter on every run for a given seed.
    pub fn with_seed(viewers: usize, seed: u64) -> Self {
        Self::with_rng(viewers, StdRng::seed_from_u64(seed))
    }

    fn with_rng(viewers: usize, rng: StdRng) -> Self {
        Self {
            viewers: viewers.max(1),
            rng: Mutex::new(rng),
        }
    }

    fn chatter(&self, now: i64) -> Vec<ChatMessage> {
        let mut rng = self.rng.lock();
        let count = rng.gen_range(0..=MAX_PAGE_MESSAGES);
        (0..count)
            .map(|i| {
                let viewer = rng.gen_range(0..self.viewers);
                let text = DEMO_CHATTER.choose(&mut *rng).copied().unwrap_or("1");
                let mut msg = ChatMessage::new(format!("demo-viewer-{}", viewer), text, now + i as i64);
                msg.display_name = format!("Viewer {}", viewer);
                msg
            })
            .collect()
    }
}

impl Default for DemoChatFetcher {
    fn default() -> Self {
        Self::new(40)
    }
}

#[async_trait]
impl ChatFetcher for DemoChatFetcher {
    async fn fetch(&self, _stream_id: &str, cursor: &PollCursor) -> Result<ChatPage> {
        let messages = self.chatter(chrono::Utc::now().timestamp_millis());

        let page_no = cursor
            .token
            .as_deref()
            .and_then(|t| t.strip_prefix("demo-"))
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(ChatPage {
            messages,
            next_token: Some(format!("demo-{}", page_no + 1)),
            interval_hint_ms: DEMO_INTERVAL_MS,
        })
    }
}

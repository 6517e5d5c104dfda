use super::{ChatFetcher, ChatMessage, ChatPage, PollCursor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const LIVE_CHAT_PARTS: &str = "snippet,authorDetails";
const LIVE_CHAT_FIELDS: &str = "items(authorDetails(channelId,displayName),snippet(displayMessage,publishedAt)),nextPageToken,pollingIntervalMillis";

#[derive(Debug, Clone)]
pub enum Credentials {
    ApiKey(String),
    AccessToken(String),
}

pub struct YoutubeChatFetcher {
    api_base: String,
    credentials: Credentials,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveChatMessageListResponse {
    #[serde(default)]
    items: Vec<LiveChatMessage>,
    next_page_token: Option<String>,
    #[serde(default)]
    polling_interval_millis: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveChatMessage {
    snippet: Snippet,
    author_details: AuthorDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    display_message: String,
    published_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorDetails {
    channel_id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl YoutubeChatFetcher {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_api_base(YOUTUBE_API_BASE.to_string(), credentials)
    }

    pub fn with_api_base(api_base: String, credentials: Credentials) -> Self {
        // No request timeout: a hung fetch stalls the cadence instead of being cut short.
        let client = reqwest::Client::builder()
            .user_agent(concat!("chatvote/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            client,
        }
    }

    fn request_url(&self, stream_id: &str, cursor: &PollCursor) -> String {
        let mut url = format!(
            "{}/liveChat/messages?liveChatId={}&part={}&fields={}",
            self.api_base,
            urlencoding::encode(stream_id),
            urlencoding::encode(LIVE_CHAT_PARTS),
            urlencoding::encode(LIVE_CHAT_FIELDS),
        );
        if let Some(token) = &cursor.token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        if let Credentials::ApiKey(key) = &self.credentials {
            url.push_str("&key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }
}

/// Convert the API payload into a page, dropping items whose timestamp
/// cannot be read.
fn into_page(response: LiveChatMessageListResponse) -> ChatPage {
    let messages = response
        .items
        .into_iter()
        .filter_map(|item| {
            let published_at = match DateTime::parse_from_rfc3339(&item.snippet.published_at) {
                Ok(at) => at.timestamp_millis(),
                Err(e) => {
                    tracing::debug!(
                        published_at = %item.snippet.published_at,
                        error = %e,
                        "skipping chat item with unreadable timestamp"
                    );
                    return None;
                }
            };
            Some(ChatMessage {
                author_id: item.author_details.channel_id,
                display_name: item.author_details.display_name,
                text: item.snippet.display_message,
                published_at,
            })
        })
        .collect();

    ChatPage {
        messages,
        next_token: response.next_page_token,
        interval_hint_ms: response.polling_interval_millis,
    }
}

#[async_trait]
impl ChatFetcher for YoutubeChatFetcher {
    async fn fetch(&self, stream_id: &str, cursor: &PollCursor) -> Result<ChatPage> {
        let url = self.request_url(stream_id, cursor);

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Credentials::AccessToken(token) = &self.credentials {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(anyhow::anyhow!("YouTube API error: {} {}", status, detail));
        }

        let payload: LiveChatMessageListResponse = response
            .json()
            .await
            .context("decoding liveChatMessages response")?;

        Ok(into_page(payload))
    }
}

//! Discord REST API client
//!
//! Message retrieval, posting, and pin management against the Discord
//! v10 HTTP API. The message-listing endpoint only supports one-sided
//! snowflake cursors, so windowed retrieval paginates with an `after`
//! cursor and filters the far side of the window client-side.

use chrono::{DateTime, Utc};
use mixweek_common::snowflake;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DISCORD_BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = "DiscordBot (mixweek-bot, 0.1.0)";

/// Messages inspected when hunting for the pin-notification companion
const PIN_NOTIFICATION_SEARCH_DEPTH: usize = 10;

/// Message type discriminants used by the bot
///
/// https://discord.com/developers/docs/resources/channel#message-object-message-types
pub mod message_type {
    pub const DEFAULT: u8 = 0;
    pub const CHANNEL_PINNED_MESSAGE: u8 = 6;
}

/// Discord client errors
#[derive(Debug, Error)]
pub enum DiscordError {
    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Discord API returned a non-success response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse API response JSON
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A pin was created but its companion notification message could
    /// not be located, which indicates an inconsistent channel state
    #[error("Unable to find pin notification for message id: {0}")]
    PinNotificationMissing(String),
}

/// Message author, as embedded in a message object
#[derive(Debug, Clone, Deserialize)]
pub struct MessageAuthor {
    /// Author's user id
    pub id: String,
    /// Author's username
    pub username: String,
    /// Whether the author is a bot account
    #[serde(default)]
    pub bot: bool,
}

/// Reference to another message (set on pin-notification messages)
#[derive(Debug, Clone, Deserialize)]
pub struct MessageReference {
    pub message_id: Option<String>,
}

/// Channel message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Snowflake message id (monotonic with creation time)
    pub id: String,
    /// Message type discriminant (see [`message_type`])
    #[serde(rename = "type", default)]
    pub kind: u8,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Message author
    pub author: MessageAuthor,
    /// Referenced message, when present
    pub message_reference: Option<MessageReference>,
}

/// Result of filtering one page against the window end
#[derive(Debug)]
pub(crate) struct PageScan {
    /// Messages inside the window, in page order
    pub kept: Vec<Message>,
    /// Id of the greatest-timestamp message in the page, the next
    /// `after` cursor
    pub latest_id: Option<String>,
    /// Whether any message at or past the window end was seen
    pub reached_window_end: bool,
}

/// Filter a page of messages against the exclusive window end and pick
/// the cursor for the next page.
pub(crate) fn scan_page(page: Vec<Message>, before: DateTime<Utc>) -> PageScan {
    let mut kept = Vec::with_capacity(page.len());
    let mut latest: Option<(DateTime<Utc>, String)> = None;
    let mut reached_window_end = false;

    for message in page {
        let is_latest = match &latest {
            Some((timestamp, _)) => message.timestamp > *timestamp,
            None => true,
        };
        if is_latest {
            latest = Some((message.timestamp, message.id.clone()));
        }

        if message.timestamp < before {
            kept.push(message);
        } else {
            reached_window_end = true;
        }
    }

    PageScan {
        kept,
        latest_id: latest.map(|(_, id)| id),
        reached_window_end,
    }
}

/// Discord REST API client
pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DiscordError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DiscordError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            token: token.into(),
        })
    }

    /// Retrieve messages from a channel.
    ///
    /// With both bounds set this performs a best-effort retrieval of
    /// every message in `[after, before)`, paginating in pages of
    /// `limit` until the far side of the window is reached or the
    /// channel history is exhausted; no total order is guaranteed.
    /// With at most one bound set, a single page anchored at that
    /// bound (or at "now") is returned. Any transport failure aborts
    /// the fetch with no partial window.
    pub async fn messages_in_channel(
        &self,
        channel_id: &str,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, DiscordError> {
        match (after, before) {
            (Some(after), Some(before)) => {
                self.messages_in_window(channel_id, after, before, limit).await
            }
            (Some(after), None) => {
                let cursor = snowflake::from_timestamp(after);
                self.message_page(channel_id, "after", &cursor, limit).await
            }
            (None, before) => {
                let anchor = before.unwrap_or_else(Utc::now);
                let cursor = snowflake::from_timestamp(anchor);
                self.message_page(channel_id, "before", &cursor, limit).await
            }
        }
    }

    async fn messages_in_window(
        &self,
        channel_id: &str,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, DiscordError> {
        let mut collected = Vec::new();
        let mut cursor = snowflake::from_timestamp(after);

        loop {
            let page = self.message_page(channel_id, "after", &cursor, limit).await?;
            let page_len = page.len();

            let scan = scan_page(page, before);
            collected.extend(scan.kept);

            if let Some(latest_id) = scan.latest_id {
                cursor = latest_id;
            }

            if scan.reached_window_end || page_len < limit {
                break;
            }
        }

        debug!(
            channel = channel_id,
            count = collected.len(),
            "Retrieved windowed messages"
        );
        Ok(collected)
    }

    async fn message_page(
        &self,
        channel_id: &str,
        cursor_param: &str,
        cursor: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DiscordError> {
        let url = format!(
            "{}/channels/{}/messages?limit={}&{}={}",
            DISCORD_BASE_URL, channel_id, limit, cursor_param, cursor
        );

        debug!(url = %url, "Requesting message page");

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| DiscordError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscordError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| DiscordError::ParseError(e.to_string()))
    }

    /// Post a text message in a channel
    pub async fn post_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<Message, DiscordError> {
        let url = format!("{}/channels/{}/messages", DISCORD_BASE_URL, channel_id);
        let body = serde_json::json!({ "content": content });

        let response = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| DiscordError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscordError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| DiscordError::ParseError(e.to_string()))
    }

    /// List the channel's pinned messages
    pub async fn pinned_messages(&self, channel_id: &str) -> Result<Vec<Message>, DiscordError> {
        let url = format!("{}/channels/{}/pins", DISCORD_BASE_URL, channel_id);

        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| DiscordError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscordError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| DiscordError::ParseError(e.to_string()))
    }

    /// Pin a message in a channel
    pub async fn pin_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/channels/{}/pins/{}",
            DISCORD_BASE_URL, channel_id, message_id
        );
        self.send_expecting_no_body(self.http.put(&url)).await
    }

    /// Unpin a message in a channel
    pub async fn unpin_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/channels/{}/pins/{}",
            DISCORD_BASE_URL, channel_id, message_id
        );
        self.send_expecting_no_body(self.http.delete(&url)).await
    }

    /// Delete a message from a channel
    pub async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), DiscordError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            DISCORD_BASE_URL, channel_id, message_id
        );
        self.send_expecting_no_body(self.http.delete(&url)).await
    }

    /// Delete the system notification Discord posts after a pin.
    ///
    /// Searches the most recent messages for a pin notification
    /// referencing `pinned_message_id`. Its absence is surfaced as
    /// [`DiscordError::PinNotificationMissing`] rather than ignored.
    pub async fn delete_recent_pin_notification(
        &self,
        channel_id: &str,
        pinned_message_id: &str,
    ) -> Result<(), DiscordError> {
        let recent = self
            .messages_in_channel(channel_id, None, None, PIN_NOTIFICATION_SEARCH_DEPTH)
            .await?;

        let notification = recent.iter().find(|message| {
            message.kind == message_type::CHANNEL_PINNED_MESSAGE
                && message
                    .message_reference
                    .as_ref()
                    .and_then(|reference| reference.message_id.as_deref())
                    == Some(pinned_message_id)
        });

        match notification {
            Some(message) => self.delete_message(channel_id, &message.id).await,
            None => Err(DiscordError::PinNotificationMissing(
                pinned_message_id.to_string(),
            )),
        }
    }

    async fn send_expecting_no_body(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(), DiscordError> {
        let response = request
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| DiscordError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DiscordError::ApiError(status.as_u16(), error_text));
        }

        Ok(())
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }
}

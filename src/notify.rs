use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::parser::Candidate;

pub const HEADER: &str = "[오늘의 채용 공고]\n\n";

/// Discord rejects `content` longer than this.
pub const DISCORD_CONTENT_LIMIT: usize = 2000;

/// A relevant candidate with the top category the classifier gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub candidate: Candidate,
    pub category: String,
}

/// Header followed by one block per posting, in order.
pub fn format(postings: &[Posting]) -> String {
    let mut content = String::from(HEADER);
    for item in postings {
        content.push_str(&block(item));
    }
    content
}

fn block(item: &Posting) -> String {
    format!(
        "공고: {}\n분류: {}\n링크: <{}>\n\n",
        item.candidate.content_label, item.category, item.candidate.content_url
    )
}

/// Split a formatted message into parts of at most `limit` characters, cutting only
/// between posting blocks. The header always travels with the first block. A piece
/// longer than the limit is hard-wrapped.
pub fn split_message(message: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    let mut pieces: Vec<&str> = message.split_inclusive("\n\n").collect();
    if pieces.len() > 1 && pieces[0] == HEADER {
        let first = &message[..HEADER.len() + pieces[1].len()];
        pieces.splice(0..2, [first]);
    }

    for piece in pieces {
        if current.chars().count() + piece.chars().count() > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        if piece.chars().count() > limit {
            let chars: Vec<char> = piece.chars().collect();
            for chunk in chars.chunks(limit) {
                parts.push(chunk.iter().collect());
            }
            continue;
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// One-way delivery sink. `false` means the message may not have arrived.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> bool;
}

/// Discord-compatible incoming webhook.
pub struct DiscordWebhook {
    webhook_url: String,
    username: Option<String>,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(
        webhook_url: String,
        username: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook_url,
            username,
            http,
        })
    }

    async fn post(&self, content: &str) -> Result<(), DeliveryError> {
        let mut payload = json!({ "content": content });
        if let Some(name) = &self.username {
            payload["username"] = json!(name);
        }

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "webhook returned non-success");
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn notify(&self, message: &str) -> bool {
        let parts = split_message(message, DISCORD_CONTENT_LIMIT);
        let total = parts.len();
        for (i, part) in parts.iter().enumerate() {
            if let Err(e) = self.post(part).await {
                error!(part = i + 1, total, "webhook delivery failed: {}", e);
                return false;
            }
        }
        info!(parts = total, "notification delivered");
        true
    }
}

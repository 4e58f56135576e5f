//! Failure notifications to a chat webhook.
//!
//! Posts a single embed:
//!
//! ```json
//! {"embeds": [{"title": "Error", "color": 12401981, "description": "...", "timestamp": "..."}]}
//! ```

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

/// Embed colour of error reports (`#bd3d3d`).
pub const ERROR_COLOR: u32 = 0x00bd_3d3d;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error posting to webhook: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {0}")]
    Status(u16),
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    color: u32,
    description: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    embeds: [Embed<'a>; 1],
}

/// Reports run faults to a webhook URL.
#[derive(Debug, Clone)]
pub struct ErrorWebhook {
    client: Client,
    url: String,
}

impl ErrorWebhook {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Post an error embed with `message` as its description.
    pub async fn send(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let body = Message {
            embeds: [Embed {
                title,
                color: ERROR_COLOR,
                description: message,
                timestamp: Utc::now(),
            }],
        };

        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_posts_error_embed() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hooks/123")
            .match_header("content-type", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"^\{"embeds":\[\{"#.to_string()),
                Matcher::Regex(r#""title":"Error""#.to_string()),
                Matcher::Regex(r#""color":12401981"#.to_string()),
                Matcher::Regex(r#""description":"catalog unreachable""#.to_string()),
                Matcher::Regex(r#""timestamp":"\d{4}-"#.to_string()),
            ]))
            .with_status(204)
            .create_async()
            .await;

        let webhook = ErrorWebhook::new(Client::new(), format!("{}/hooks/123", server.url()));
        webhook.send("Error", "catalog unreachable").await.unwrap();
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_post_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _hook = server
            .mock("POST", "/hooks/123")
            .with_status(401)
            .create_async()
            .await;

        let webhook = ErrorWebhook::new(Client::new(), format!("{}/hooks/123", server.url()));
        let err = webhook.send("Error", "boom").await.unwrap_err();
        assert!(matches!(err, NotifyError::Status(401)));
    }
}

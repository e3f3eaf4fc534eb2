use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::Error;

/// Outbound messaging channel. `recipient` is the opaque id carried by a
/// configured contact.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), Error>;
}

#[derive(Serialize)]
struct DiscordMessage {
    content: String,
}

/// Delivers messages through a Discord webhook, tagging the recipient so the
/// notification pings them.
pub struct DiscordMessenger {
    client: Client,
    webhook_url: String,
}

impl DiscordMessenger {
    pub fn new(webhook_url: String) -> DiscordMessenger {
        DiscordMessenger {
            client: Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), Error> {
        let payload = DiscordMessage {
            content: format!("<@{recipient}> {text}"),
        };

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

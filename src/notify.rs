use async_trait::async_trait;
use thiserror::Error;

use crate::http::HttpClient;

pub const DEFAULT_PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification endpoint answered with status {0}")]
    HttpStatus(u16),
}

/// Out-of-band channel to the person the chatbot represents.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, message: &str) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone)]
pub struct PushoverNotifier {
    client: HttpClient,
    url: String,
    token: String,
    user: String,
}

impl PushoverNotifier {
    /// Missing credentials are sent as empty fields and rejected by the endpoint.
    pub fn new(
        client: HttpClient,
        url: String,
        token: Option<String>,
        user: Option<String>,
    ) -> Self {
        Self {
            client,
            url,
            token: token.unwrap_or_default(),
            user: user.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn push(&self, message: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post_form(
                &self.url,
                &[
                    ("token", self.token.as_str()),
                    ("user", self.user.as_str()),
                    ("message", message),
                ],
            )
            .await
            .map_err(|err| NotificationError::Transport(err.to_string()))?;

        if response.is_success() {
            Ok(())
        } else {
            Err(NotificationError::HttpStatus(response.status))
        }
    }
}

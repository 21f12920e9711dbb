use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mailer Contract
///
/// Delivers activation messages. Dispatch is fire-and-forget: implementations log their
/// failures and never report them back to the registering user.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation(&self, recipient: &str, token: &str);
}

/// MailerState
///
/// Shared handle to the mailer held by the application state.
pub type MailerState = Arc<dyn Mailer>;

/// Payload posted to the mail relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// HttpMailer
///
/// Posts activation messages to an HTTP mail relay. The request runs on its own task so
/// signup never waits on mail delivery.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
    public_base_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: &str, api_key: Option<String>, public_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.to_string(),
            api_key,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Link a new user follows to activate their account.
    pub fn activation_link(&self, token: &str) -> String {
        format!("{}/activate/{}", self.public_base_url, token)
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_activation(&self, recipient: &str, token: &str) {
        let message = RelayMessage {
            to: recipient,
            subject: "Activate your account",
            text: format!(
                "Welcome! Follow this link to activate your account: {}",
                self.activation_link(token)
            ),
        };

        let mut request = self.client.post(&self.relay_url).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let recipient = recipient.to_string();
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(to = %recipient, "activation message dispatched");
                }
                Ok(resp) => {
                    tracing::error!(to = %recipient, status = %resp.status(), "mail relay refused activation message");
                }
                Err(e) => {
                    tracing::error!(to = %recipient, "mail relay unreachable: {}", e);
                }
            }
        });
    }
}

/// A message as captured by [`MockMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationMessage {
    pub recipient: String,
    pub token: String,
}

/// MockMailer
///
/// Keeps every activation message in memory and logs it at debug level. Used by tests and
/// by local runs without a mail relay; production configuration always names a relay.
#[derive(Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<ActivationMessage>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<ActivationMessage> {
        self.sent.lock().await.clone()
    }

    /// Most recent message addressed to `recipient`.
    pub async fn last_to(&self, recipient: &str) -> Option<ActivationMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.recipient == recipient)
            .cloned()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_activation(&self, recipient: &str, token: &str) {
        tracing::debug!(to = %recipient, "activation message queued (token {})", token);
        self.sent.lock().await.push(ActivationMessage {
            recipient: recipient.to_string(),
            token: token.to_string(),
        });
    }
}

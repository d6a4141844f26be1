use tracing::{debug, info};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub recipient: String,
}

impl Message {
    /// The body with the value of every password line masked.
    pub fn redacted_body(&self) -> String {
        self.body
            .lines()
            .map(|line| match line.split_once(':') {
                Some((label, _)) if label.to_ascii_lowercase().contains("password") => {
                    format!("{}: [redacted]", label)
                }
                _ => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outbound notification channel used when accounts are provisioned.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), AppError>;
}

/// Writes messages to the log instead of delivering them. Suitable for
/// development and for deployments without a mail relay.
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &Message) -> Result<(), AppError> {
        if message.recipient.trim().is_empty() {
            return Err(AppError::ExternalService(
                "Message has no recipient".to_string(),
            ));
        }

        info!(
            from = %message.sender,
            to = %message.recipient,
            subject = %message.subject,
            "Outgoing message"
        );
        debug!(body = %message.redacted_body(), "Outgoing message body");

        Ok(())
    }
}

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Failed to send mail: {0}")]
    SendFailed(String),
    #[error("Templating error: {0}")]
    TemplatingError(#[from] tera::Error),
}

/// Image embedded in an HTML body, referenced as `cid:<content_id>`
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub content_id: String,
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub inline_images: Vec<InlineImage>,
}

/// Outbound mail delivery.
///
/// Transport lives outside the engine; implementations are injected.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            inline_images = message.inline_images.len(),
            "Mail: {}\n{}",
            message.subject,
            message.text_body
        );
        Ok(())
    }
}

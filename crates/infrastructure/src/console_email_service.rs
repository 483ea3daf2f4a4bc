//! Development email service that logs instead of sending.

use async_trait::async_trait;
use lodge_application::EmailService;
use lodge_core::AppResult;
use tracing::info;

/// Logs outgoing mail; used when SMTP is not configured.
#[derive(Clone, Default)]
pub struct ConsoleEmailService;

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_email(&self, to: &str, subject: &str, text_body: &str) -> AppResult<()> {
        info!(%to, %subject, body = %text_body, "console email (SMTP disabled)");
        Ok(())
    }
}

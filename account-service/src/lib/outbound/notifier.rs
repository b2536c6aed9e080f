use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Message;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Tokio1Executor;

use crate::account::errors::NotifierError;
use crate::account::ports::Notifier;
use crate::config::EmailConfig;

/// SMTP-backed [`Notifier`].
///
/// When constructed without email configuration every send becomes a logged
/// no-op, so deployments without an SMTP relay still work end to end.
pub struct SmtpNotifier {
    config: Option<EmailConfig>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpNotifier {
    pub fn new(config: Option<EmailConfig>) -> Result<Self, NotifierError> {
        let transport = match &config {
            Some(email) => Some(
                AsyncSmtpTransport::<Tokio1Executor>::from_url(&email.smtp_url)
                    .map_err(|e| NotifierError::Transport(e.to_string()))?
                    .build(),
            ),
            None => None,
        };

        Ok(Self { config, transport })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), NotifierError> {
        let (Some(config), Some(transport)) = (&self.config, &self.transport) else {
            tracing::warn!("Email not configured, skipping \"{}\" to {}", subject, to);
            return Ok(());
        };

        let message = Message::builder()
            .from(
                config
                    .from_address
                    .parse()
                    .map_err(|e| NotifierError::MessageBuild(format!("from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifierError::MessageBuild(format!("to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| NotifierError::MessageBuild(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| NotifierError::SendFailed(e.to_string()))?;

        tracing::info!("Sent email to {}: {}", to, subject);

        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_verification(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), NotifierError> {
        let link = self
            .config
            .as_ref()
            .map(|c| format!("{}/verify-email?token={}", c.base_url, token))
            .unwrap_or_default();

        let body = format!(
            "Hello {},\n\n\
             Welcome! Please verify your email address by opening the link below:\n\n\
             {}\n\n\
             The link expires in 24 hours.\n\n\
             If you did not create this account, you can ignore this email.\n",
            name, link
        );

        self.send(email, "Verify your email address", body).await
    }

    async fn send_password_reset(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), NotifierError> {
        let link = self
            .config
            .as_ref()
            .map(|c| format!("{}/reset-password?token={}", c.base_url, token))
            .unwrap_or_default();

        let body = format!(
            "Hello {},\n\n\
             We received a request to reset your password. Open the link below to choose \
             a new one:\n\n\
             {}\n\n\
             The link expires in 1 hour and can be used once.\n\n\
             If you did not request a reset, you can ignore this email and your password \
             will stay unchanged.\n",
            name, link
        );

        self.send(email, "Reset your password", body).await
    }

    async fn send_welcome(&self, email: &str, name: &str) -> Result<(), NotifierError> {
        let body = format!(
            "Hello {},\n\n\
             Your email address is now verified. Welcome aboard!\n",
            name
        );

        self.send(email, "Welcome!", body).await
    }
}

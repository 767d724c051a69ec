pub mod templates;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// Outbound account mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), String>;

    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), String>;
}

pub struct SystemMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SystemMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.user.clone(), config.pass.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("System SMTP error: {e}"))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, html_body: String) -> Result<(), String> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| format!("Invalid from address: {e}"))?,
            )
            .to(to.parse().map_err(|e| format!("Invalid to address: {e}"))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| format!("Failed to build email: {e}"))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| format!("Failed to send email: {e}"))?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SystemMailer {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), String> {
        self.send(
            to_email,
            "Your verification code",
            templates::render_verification_code(code),
        )
        .await
    }

    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), String> {
        self.send(
            to_email,
            "Password reset",
            templates::render_password_reset(reset_url),
        )
        .await
    }
}

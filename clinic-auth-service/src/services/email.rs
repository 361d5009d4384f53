use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

/// Outbound mail capability. One delivery attempt per call, no retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        first_name: &str,
        verification_url: &str,
    ) -> Result<(), AppError>;
}

/// Rendered verification message.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationEmail {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

impl VerificationEmail {
    pub fn render(app_name: &str, first_name: &str, verification_url: &str) -> Self {
        let subject = format!("Verify your email - {}", app_name);

        let plain_body = format!(
            "Hi {first_name},\n\n\
             Thanks for signing up for {app_name}. Please confirm your email address by visiting the link below:\n\n\
             {verification_url}\n\n\
             This link will expire in 24 hours. If you didn't create an account, you can ignore this email."
        );

        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Welcome to {app_name}</h2>
        <p>Hi {first_name},</p>
        <p>Please confirm your email address by clicking the button below:</p>
        <p>
            <a href="{verification_url}" style="background-color: #2E7D32; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                Verify Email
            </a>
        </p>
        <p style="color: #666; font-size: 12px;">
            This link will expire in 24 hours. If you didn't create an account, you can ignore this email.
        </p>
    </body>
</html>
"###
        );

        Self {
            subject,
            plain_body,
            html_body,
        }
    }
}

#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_email: String,
    app_name: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, app_name: &str) -> Result<Self, AppError> {
        // 465 is implicit TLS, anything else negotiates STARTTLS.
        let builder = if config.port == 465 {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
        .port(config.port)
        .timeout(Some(Duration::from_secs(10)));

        let builder = if config.user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
        };

        tracing::info!(host = %config.host, port = config.port, "SMTP notifier initialized");

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from_email.clone(),
            app_name: app_name.to_string(),
        })
    }

    async fn send_email(&self, to_email: &str, email: VerificationEmail) -> Result<(), AppError> {
        let message = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body),
                    ),
            )?;

        // SmtpTransport is synchronous
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %email.subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_verification_email(
        &self,
        to_email: &str,
        first_name: &str,
        verification_url: &str,
    ) -> Result<(), AppError> {
        let email = VerificationEmail::render(&self.app_name, first_name, verification_url);
        self.send_email(to_email, email).await
    }
}

/// Recorded by [`MockNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub first_name: String,
    pub verification_url: String,
}

/// Records deliveries instead of sending them.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentEmail> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_verification_email(
        &self,
        to_email: &str,
        first_name: &str,
        verification_url: &str,
    ) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EmailError("mock delivery failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentEmail {
                to: to_email.to_string(),
                first_name: first_name.to_string(),
                verification_url: verification_url.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_notifier_creation() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            user: "mailer@example.com".to_string(),
            password: "secret".to_string(),
            from_email: "noreply@example.com".to_string(),
        };

        assert!(SmtpNotifier::new(&config, "Clinic").is_ok());
    }

    #[test]
    fn test_render_embeds_link_and_name() {
        let email = VerificationEmail::render(
            "Clinic",
            "Jane",
            "http://localhost:3000/verify-email?token=abc",
        );

        assert_eq!(email.subject, "Verify your email - Clinic");
        assert!(email.plain_body.starts_with("Hi Jane,"));
        assert!(email.plain_body.contains("http://localhost:3000/verify-email?token=abc"));
        assert!(email.html_body.contains("href=\"http://localhost:3000/verify-email?token=abc\""));
        assert!(email.plain_body.contains("24 hours"));
    }

    #[tokio::test]
    async fn test_mock_notifier_records_and_fails() {
        let notifier = MockNotifier::new();
        notifier
            .send_verification_email("a@x.com", "Jane", "http://link")
            .await
            .unwrap();
        assert_eq!(notifier.sent_to("a@x.com").len(), 1);

        notifier.set_failing(true);
        assert!(notifier
            .send_verification_email("a@x.com", "Jane", "http://link")
            .await
            .is_err());
        assert_eq!(notifier.sent().len(), 1);
    }
}

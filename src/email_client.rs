use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::EmailError;
use crate::validators::is_valid_email;

/// Outbound delivery of single-use token links
///
/// One instance is built at startup and shared; tests substitute a
/// recording fake.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(&self, recipient: &str, token: &str) -> Result<(), EmailError>;

    async fn send_password_reset_email(&self, recipient: &str, token: &str)
        -> Result<(), EmailError>;
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
    client_url: String,
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| e.to_string())?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
pub struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "Html")]
    html: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
}

/// Link into the front-end carrying the token and the address it was sent to
fn action_link(client_url: &str, path: &str, token: &str, email: &str) -> Result<String, EmailError> {
    let base = format!("{}/{}", client_url.trim_end_matches('/'), path);
    reqwest::Url::parse_with_params(&base, &[("token", token), ("email", email)])
        .map(String::from)
        .map_err(|e| EmailError::ConfigurationError(format!("client url: {}", e)))
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SenderEmail,
        client_url: String,
        timeout: Duration,
    ) -> Result<Self, EmailError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            sender,
            client_url,
        })
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            html: html_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send email");
                if e.is_timeout() || e.is_connect() {
                    EmailError::ServiceUnavailable(e.to_string())
                } else {
                    EmailError::SendFailed(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = %e, "Email service returned error");
                EmailError::SendFailed(e.to_string())
            })?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for EmailClient {
    async fn send_verification_email(&self, recipient: &str, token: &str) -> Result<(), EmailError> {
        let link = action_link(&self.client_url, "email/verify", token, recipient)?;
        let html = format!(
            "Welcome! Please confirm your email address by visiting <a href=\"{}\">this link</a>. \
             The link expires in 24 hours.",
            link
        );
        self.send_email(recipient, "Verify your email", &html).await
    }

    async fn send_password_reset_email(
        &self,
        recipient: &str,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = action_link(&self.client_url, "password/reset", token, recipient)?;
        let html = format!(
            "A password reset was requested for your account. Visit <a href=\"{}\">this link</a> \
             to choose a new password. If you did not request it, ignore this email.",
            link
        );
        self.send_email(recipient, "Reset your password", &html).await
    }
}

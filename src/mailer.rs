use serde::Serialize;
use thiserror::Error;

/// Outbound email via the Resend HTTP API.
///
/// Hosting providers commonly block raw SMTP, so delivery goes over HTTPS.
/// An empty API key disables delivery entirely; messages are logged instead,
/// which is also the behaviour under test.
pub struct Mailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("email rejected: {status} - {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

impl Mailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            from,
        }
    }

    /// Send a plain-text message to a single recipient.
    pub async fn send(&self, to: &str, subject: &str, message: &str) -> Result<(), MailError> {
        if self.api_key.is_empty() || cfg!(test) {
            info!("Email delivery disabled; would have sent to {to}: {message}");
            return Ok(());
        }

        let payload = MailPayload {
            from: &self.from,
            to: [to],
            subject,
            html: format!("<p>{}</p>", message),
        };
        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status, body });
        }
        debug!("Email sent to {to}");
        Ok(())
    }
}

//! Outbound notification capability
//!
//! Mail delivery is an external concern; the auth service only depends on
//! the `Notifier` trait. The production implementation talks to a
//! SendGrid-style HTTP mail API.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

impl OutboundMail {
    pub fn text(to: &str, subject: &str, body: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            text: body.to_string(),
            html: None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> Result<(), AppError>;
}

/// HTTP mail API client.
pub struct HttpMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(base_url: String, api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<(), AppError> {
        let mut content = vec![json!({ "type": "text/plain", "value": mail.text })];
        if let Some(html) = &mail.html {
            content.push(json!({ "type": "text/html", "value": html }));
        }

        let body = json!({
            "personalizations": [{ "to": [{ "email": mail.to }] }],
            "from": { "email": self.from },
            "subject": mail.subject,
            "content": content,
        });

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Notify(format!(
                "mail API returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Discards every mail; used in tests and local runs without mail credentials.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, mail: &OutboundMail) -> Result<(), AppError> {
        debug!("Dropping outbound mail to {}: {}", mail.to, mail.subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_mailer_posts_to_mail_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer test_key"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "test_key".into(), "no-reply@x.com".into());
        let mail = OutboundMail::text("a@x.com", "Email Verification", "Your OTP is: 123456");
        mailer.send(&mail).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_mailer_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mailer = HttpMailer::new(server.uri(), "bad_key".into(), "no-reply@x.com".into());
        let mail = OutboundMail::text("a@x.com", "Email Verification", "Your OTP is: 123456");
        let err = mailer.send(&mail).await.unwrap_err();
        assert!(matches!(err, AppError::Notify(_)));
    }
}

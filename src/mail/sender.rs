use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::client::get_http_client;
use crate::config::Config;
use crate::constant::EMAIL_BATCH_SIZE;
use crate::newsletter::Newsletter;

use super::subscribers::SubscriberStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Address {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Address {
    fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Personalization {
    pub to: Vec<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Attachment {
    /// Base64 encoded file bytes.
    pub content: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub disposition: String,
    pub content_id: String,
}

/// One provider request, shaped as the SendGrid v3 mail body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub personalizations: Vec<Personalization>,
    pub from: Address,
    pub subject: String,
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

pub struct SendGridTransport {
    api_base: String,
    api_key: String,
}

impl SendGridTransport {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl MailTransport for SendGridTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let url = format!("{}/v3/mail/send", self.api_base.trim_end_matches('/'));
        let response = get_http_client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("SendGrid returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// MIME type for an attachment, by file extension.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

pub fn load_attachment(path: &Path) -> Result<Attachment> {
    if !path.exists() {
        bail!("Attachment not found: {}", path.display());
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read attachment {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(anyhow!("Invalid attachment file name: {}", path.display()))?
        .to_string();

    Ok(Attachment {
        content: general_purpose::STANDARD.encode(bytes),
        filename,
        mime_type: mime_type(path).to_string(),
        disposition: "attachment".to_string(),
        content_id: "newsletter_attachment".to_string(),
    })
}

/// Drops blanks and repeated addresses (case-insensitive), keeping first-seen order.
pub fn unique_recipients(emails: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    emails
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty() && seen.insert(e.to_lowercase()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub total: usize,
}

pub struct EmailSender {
    transport: Box<dyn MailTransport>,
    sender_email: String,
    sender_name: String,
    subscribers_file: PathBuf,
}

impl EmailSender {
    pub fn new(
        transport: Box<dyn MailTransport>,
        sender_email: impl Into<String>,
        sender_name: impl Into<String>,
        subscribers_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            sender_email: sender_email.into(),
            sender_name: sender_name.into(),
            subscribers_file: subscribers_file.into(),
        }
    }

    /// SendGrid sender using the configured key and sender address.
    pub fn from_config(config: &Config) -> Result<Self> {
        let (Some(api_key), Some(sender_email)) =
            (config.sendgrid_api_key.clone(), config.email_sender.clone())
        else {
            bail!("Missing SendGrid API key or sender email");
        };
        Ok(Self::new(
            Box::new(SendGridTransport::new(&config.sendgrid_api_base, api_key)),
            sender_email,
            config.email_sender_name.clone(),
            &config.subscribers_file,
        ))
    }

    fn message(
        &self,
        subject: &str,
        html_content: &str,
        batch: &[String],
        attachment: Option<&Attachment>,
    ) -> Message {
        let personalization = if batch.len() > 1 {
            Personalization {
                to: vec![Address::new(&self.sender_email)],
                bcc: batch
                    .iter()
                    .filter(|e| !e.eq_ignore_ascii_case(&self.sender_email))
                    .map(|e| Address::new(e))
                    .collect(),
            }
        } else {
            Personalization {
                to: batch.iter().map(|e| Address::new(e)).collect(),
                bcc: Vec::new(),
            }
        };

        Message {
            personalizations: vec![personalization],
            from: Address {
                email: self.sender_email.clone(),
                name: Some(self.sender_name.clone()),
            },
            subject: subject.to_string(),
            content: vec![Content {
                mime_type: "text/html".to_string(),
                value: html_content.to_string(),
            }],
            attachments: attachment.cloned().into_iter().collect(),
        }
    }

    /// Sends `newsletter` to `test_recipients` when given, otherwise to every
    /// active subscriber in the subscribers file as it stands now.
    /// Succeeds when at least one batch was accepted.
    pub async fn send_newsletter(
        &self,
        newsletter: &Newsletter,
        test_recipients: Option<&[String]>,
        attachment: Option<&Path>,
    ) -> Result<SendReport> {
        if newsletter.html_content.trim().is_empty() {
            bail!("Newsletter content is empty");
        }

        let recipients: Vec<String> = match test_recipients {
            Some(recipients) if !recipients.is_empty() => {
                tracing::info!("Test mode: sending to {} test recipients", recipients.len());
                recipients.to_vec()
            }
            _ => {
                let recipients = SubscriberStore::open(&self.subscribers_file)?.active_emails();
                tracing::info!("Sending newsletter to {} subscribers", recipients.len());
                recipients
            }
        };
        let recipients = unique_recipients(recipients);
        if recipients.is_empty() {
            bail!("No recipients to send to");
        }

        let attachment = attachment.map(load_attachment).transpose()?;
        let subject = newsletter.subject();

        let mut sent = 0;
        for batch in recipients.chunks(EMAIL_BATCH_SIZE) {
            let message = self.message(&subject, &newsletter.html_content, batch, attachment.as_ref());
            match self.transport.deliver(&message).await {
                Ok(()) => {
                    tracing::info!("Successfully sent batch of {} emails", batch.len());
                    sent += batch.len();
                }
                Err(e) => tracing::error!("Error sending batch: {}", e),
            }
        }

        tracing::info!(
            "Successfully sent newsletter to {}/{} recipients",
            sent,
            recipients.len()
        );

        if sent == 0 {
            bail!("Failed to send newsletter to any recipient");
        }
        Ok(SendReport {
            sent,
            total: recipients.len(),
        })
    }
}

#[cfg(test)]
mod sender_tests {
    use super::*;
    use crate::newsletter::RawData;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn newsletter() -> Newsletter {
        Newsletter {
            title: "Weekly Market Insights".into(),
            date: "2024-10-07".into(),
            content: "# Hi".into(),
            html_content: "<h1>Hi</h1>".into(),
            raw_data: RawData::default(),
        }
    }

    fn store(dir: &Path, emails: &[&str]) -> PathBuf {
        let path = dir.join("subscribers.json");
        let mut store = SubscriberStore::open(&path).unwrap();
        for email in emails {
            store.add(email, None).unwrap();
        }
        path
    }

    fn sender(server: &MockServer, subscribers_file: PathBuf) -> EmailSender {
        EmailSender::new(
            Box::new(SendGridTransport::new(server.uri(), "SG.test")),
            "news@example.com",
            "Financial Newsletter",
            subscribers_file,
        )
    }

    async fn bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_single_recipient_is_addressed_directly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.test"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let sender = sender(&server, store(dir.path(), &[]));
        let recipients = vec!["qa@example.com".to_string()];

        let report = sender
            .send_newsletter(&newsletter(), Some(&recipients), None)
            .await
            .unwrap();
        assert_eq!(report, SendReport { sent: 1, total: 1 });

        let body = &bodies(&server).await[0];
        assert_eq!(body["subject"], "Weekly Market Insights - 2024-10-07");
        assert_eq!(
            body["personalizations"],
            json!([{ "to": [{ "email": "qa@example.com" }] }])
        );
        assert_eq!(
            body["from"],
            json!({ "email": "news@example.com", "name": "Financial Newsletter" })
        );
        assert_eq!(body["content"][0]["type"], "text/html");
    }

    #[tokio::test]
    async fn test_subscribers_are_batched_and_bcced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let emails: Vec<String> = (0..150).map(|i| format!("user{i}@example.com")).collect();
        let refs: Vec<&str> = emails.iter().map(String::as_str).collect();
        let subscribers_file = store(dir.path(), &refs);
        SubscriberStore::open(&subscribers_file)
            .unwrap()
            .deactivate("user0@example.com")
            .unwrap();

        let report = sender(&server, subscribers_file)
            .send_newsletter(&newsletter(), None, None)
            .await
            .unwrap();
        assert_eq!(report, SendReport { sent: 149, total: 149 });

        let bodies = bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        let first = &bodies[0]["personalizations"][0];
        assert_eq!(first["to"], json!([{ "email": "news@example.com" }]));
        assert_eq!(first["bcc"].as_array().unwrap().len(), 100);
        assert_eq!(first["bcc"][0]["email"], "user1@example.com");
        assert_eq!(
            bodies[1]["personalizations"][0]["bcc"].as_array().unwrap().len(),
            49
        );
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let recipients: Vec<String> = (0..101).map(|i| format!("t{i}@example.com")).collect();
        let report = sender(&server, store(dir.path(), &[]))
            .send_newsletter(&newsletter(), Some(&recipients), None)
            .await
            .unwrap();
        assert_eq!(report, SendReport { sent: 100, total: 101 });
    }

    #[tokio::test]
    async fn test_every_batch_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let recipients = vec!["qa@example.com".to_string()];
        let result = sender(&server, store(dir.path(), &[]))
            .send_newsletter(&newsletter(), Some(&recipients), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_content_and_no_recipients() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let sender = sender(&server, store(dir.path(), &[]));

        let mut empty = newsletter();
        empty.html_content = String::new();
        let recipients = vec!["qa@example.com".to_string()];
        assert!(sender
            .send_newsletter(&empty, Some(&recipients), None)
            .await
            .is_err());
        assert!(sender
            .send_newsletter(&newsletter(), None, None)
            .await
            .is_err());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_is_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let report_path = dir.path().join("report.pdf");
        std::fs::write(&report_path, b"hello").unwrap();
        let recipients = vec!["qa@example.com".to_string()];

        let sender = sender(&server, store(dir.path(), &[]));
        sender
            .send_newsletter(&newsletter(), Some(&recipients), Some(&report_path))
            .await
            .unwrap();

        let body = &bodies(&server).await[0];
        assert_eq!(
            body["attachments"],
            json!([{
                "content": "aGVsbG8=",
                "filename": "report.pdf",
                "type": "application/pdf",
                "disposition": "attachment",
                "content_id": "newsletter_attachment"
            }])
        );

        let missing = dir.path().join("missing.pdf");
        assert!(sender
            .send_newsletter(&newsletter(), Some(&recipients), Some(&missing))
            .await
            .is_err());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.XLSX")), "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet");
        assert_eq!(mime_type(Path::new("a.htm")), "text/html");
        assert_eq!(mime_type(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_from_config_requires_key_and_sender() {
        let dir = tempdir().unwrap();
        let mut config = Config::from_env();
        config.sendgrid_api_key = None;
        config.email_sender = Some("news@example.com".into());
        config.subscribers_file = store(dir.path(), &[]).display().to_string();
        assert!(EmailSender::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_are_reread_on_every_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let subscribers_file = store(dir.path(), &["a@example.com", "b@example.com"]);
        let sender = sender(&server, subscribers_file.clone());

        let mut editor = SubscriberStore::open(&subscribers_file).unwrap();
        editor.deactivate("a@example.com").unwrap();
        editor.add("c@example.com", None).unwrap();

        let report = sender.send_newsletter(&newsletter(), None, None).await.unwrap();
        assert_eq!(report, SendReport { sent: 2, total: 2 });

        let body = &bodies(&server).await[0];
        assert_eq!(
            body["personalizations"][0]["bcc"],
            json!([{ "email": "b@example.com" }, { "email": "c@example.com" }])
        );
    }

    #[test]
    fn test_unique_recipients() {
        let emails = vec![
            "a@example.com".to_string(),
            " A@example.com ".to_string(),
            String::new(),
            "b@example.com".to_string(),
        ];
        assert_eq!(
            unique_recipients(emails),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_batch_addresses_are_unique_across_to_and_bcc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let recipients = vec![
            "qa@example.com".to_string(),
            "News@example.com".to_string(),
            "qa@example.com".to_string(),
            "ops@example.com".to_string(),
        ];
        let report = sender(&server, store(dir.path(), &[]))
            .send_newsletter(&newsletter(), Some(&recipients), None)
            .await
            .unwrap();
        assert_eq!(report, SendReport { sent: 3, total: 3 });

        let body = &bodies(&server).await[0];
        assert_eq!(
            body["personalizations"],
            json!([{
                "to": [{ "email": "news@example.com" }],
                "bcc": [{ "email": "qa@example.com" }, { "email": "ops@example.com" }]
            }])
        );
    }
}

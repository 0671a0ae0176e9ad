use anyhow::Result;
use chrono::Local;
use tracing::Instrument;

use std::path::PathBuf;
use std::time::Instant;

use crate::config::Config;
use crate::llm::openai::OpenAiModel;
use crate::mail::sender::{EmailSender, SendReport};
use crate::newsletter::archive::{self, SavedNewsletter};
use crate::newsletter::generator::NewsletterGenerator;
use crate::schedule::{wait_until, Schedule};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub test_mode: bool,
    pub save_only: bool,
    pub test_recipients: Vec<String>,
    pub attachment: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub saved: SavedNewsletter,
    pub report: Option<SendReport>,
}

pub struct Pipeline {
    generator: NewsletterGenerator,
    output_dir: PathBuf,
    sender: Option<EmailSender>,
}

impl Pipeline {
    fn new(generator: NewsletterGenerator, output_dir: PathBuf, sender: Option<EmailSender>) -> Self {
        Self {
            generator,
            output_dir,
            sender,
        }
    }

    pub async fn run_once(&self, options: &RunOptions) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4();
        self.run(options)
            .instrument(tracing::info_span!("run", id = %run_id))
            .await
    }

    async fn run(&self, options: &RunOptions) -> Result<RunOutcome> {
        tracing::info!("Starting newsletter generation process");
        let started = Instant::now();

        let newsletter = self.generator.generate().await?;
        let saved = archive::save(&newsletter, &self.output_dir)?;

        let report = if options.save_only {
            tracing::info!("Save-only mode, newsletter not sent");
            None
        } else {
            let sender = self
                .sender
                .as_ref()
                .ok_or(anyhow::anyhow!("Email sending is not configured"))?;
            let test_recipients = (options.test_mode && !options.test_recipients.is_empty())
                .then_some(options.test_recipients.as_slice());
            let report = sender
                .send_newsletter(&newsletter, test_recipients, options.attachment.as_deref())
                .await?;
            Some(report)
        };

        tracing::info!(
            "Newsletter process completed in {:.2} seconds",
            started.elapsed().as_secs_f64()
        );

        Ok(RunOutcome { saved, report })
    }

    /// Runs on `schedule` until Ctrl-C. A failed run is logged and the loop
    /// waits for the next slot.
    pub async fn run_loop(&self, schedule: Schedule) -> Result<()> {
        tracing::info!("Newsletter scheduled {}", schedule);
        let mut round = 1;

        loop {
            let now = Local::now();
            let next = schedule.next_run(&now);
            tracing::info!("Next newsletter run at {}", next.format("%Y-%m-%d %H:%M %Z"));

            tokio::select! {
                _ = wait_until(&next) => {
                    tracing::info!("Running scheduled round {}", round);
                    if let Err(e) = self.run_once(&RunOptions::default()).await {
                        tracing::error!("Scheduled newsletter run failed: {:#}", e);
                    }
                    round += 1;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Scheduler stopped");
                    return Ok(());
                }
            }
        }
    }
}

pub struct PipelineBuilder {
    generator: Option<NewsletterGenerator>,
    output_dir: Option<PathBuf>,
    sender: Option<EmailSender>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            generator: None,
            output_dir: None,
            sender: None,
        }
    }

    /// Wires the live sources, model, archive and sender from `config`.
    /// Email is left unconfigured when the SendGrid key or sender is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = OpenAiModel::from_config(config)?;
        let mut builder = Self::new()
            .with_generator(NewsletterGenerator::new(Box::new(model)))
            .with_output_dir(&config.output_dir);

        if config.has_email() {
            builder = builder.with_sender(EmailSender::from_config(config)?);
        }
        Ok(builder)
    }

    pub fn with_generator(mut self, generator: NewsletterGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_sender(mut self, sender: EmailSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let generator = self
            .generator
            .ok_or(anyhow::anyhow!("Pipeline needs a newsletter generator"))?;
        let output_dir = self
            .output_dir
            .unwrap_or_else(|| PathBuf::from(&Config::get().output_dir));
        Ok(Pipeline::new(generator, output_dir, self.sender))
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::llm::LanguageModel;
    use crate::mail::sender::SendGridTransport;
    use crate::mail::subscribers::SubscriberStore;
    use crate::source::crypto::CryptoData;
    use crate::source::economy::EconomicData;
    use crate::source::market::MarketData;
    use crate::source::news::NewsData;
    use crate::source::{DataSource, Measured};
    use async_trait::async_trait;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("Steady week.".into())
        }
    }

    struct EmptySource<T>(std::marker::PhantomData<T>);

    #[async_trait]
    impl<T> DataSource for EmptySource<T>
    where
        T: Measured + Default + Send + Sync,
    {
        type Output = T;

        fn name(&self) -> &str {
            "empty"
        }

        async fn fetch(&self) -> Result<T> {
            Ok(T::default())
        }
    }

    fn empty<T>() -> EmptySource<T> {
        EmptySource(std::marker::PhantomData)
    }

    fn sender(server: &MockServer, subscribers_file: PathBuf) -> EmailSender {
        EmailSender::new(
            Box::new(SendGridTransport::new(server.uri(), "SG.test")),
            "news@example.com",
            "Financial Newsletter",
            subscribers_file,
        )
    }

    fn generator() -> NewsletterGenerator {
        NewsletterGenerator::new(Box::new(EchoModel))
            .with_title("Test Letter")
            .with_market_source(empty::<MarketData>())
            .with_economy_source(empty::<EconomicData>())
            .with_crypto_source(empty::<CryptoData>())
            .with_news_source(empty::<NewsData>())
    }

    #[tokio::test]
    async fn test_save_only_archives_without_sending() {
        let dir = tempdir().unwrap();
        let pipeline = PipelineBuilder::new()
            .with_generator(generator())
            .with_output_dir(dir.path())
            .build()
            .unwrap();

        let outcome = pipeline
            .run_once(&RunOptions {
                save_only: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(outcome.report.is_none());
        assert!(outcome.saved.html_path.exists());
        assert!(outcome.saved.markdown_path.exists());
    }

    #[tokio::test]
    async fn test_send_without_email_config_fails_after_archiving() {
        let dir = tempdir().unwrap();
        let pipeline = PipelineBuilder::new()
            .with_generator(generator())
            .with_output_dir(dir.path())
            .build()
            .unwrap();

        assert!(pipeline.run_once(&RunOptions::default()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_test_mode_sends_to_test_recipients() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let sender = sender(&server, dir.path().join("subscribers.json"));
        let pipeline = PipelineBuilder::new()
            .with_generator(generator())
            .with_output_dir(dir.path().join("out"))
            .with_sender(sender)
            .build()
            .unwrap();

        let outcome = pipeline
            .run_once(&RunOptions {
                test_mode: true,
                test_recipients: vec!["qa@example.com".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.report, Some(SendReport { sent: 1, total: 1 }));
    }

    #[tokio::test]
    async fn test_each_run_sends_to_current_subscribers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let subscribers_file = dir.path().join("subscribers.json");
        let mut subscribers = SubscriberStore::open(&subscribers_file).unwrap();
        subscribers.add("a@example.com", None).unwrap();
        subscribers.add("b@example.com", None).unwrap();

        let pipeline = PipelineBuilder::new()
            .with_generator(generator())
            .with_output_dir(dir.path().join("out"))
            .with_sender(sender(&server, subscribers_file.clone()))
            .build()
            .unwrap();

        // Edited by a separate handle, as `marketletter deactivate`/`add` would.
        let mut editor = SubscriberStore::open(&subscribers_file).unwrap();
        editor.deactivate("a@example.com").unwrap();
        editor.add("c@example.com", None).unwrap();

        let outcome = pipeline.run_once(&RunOptions::default()).await.unwrap();
        assert_eq!(outcome.report, Some(SendReport { sent: 2, total: 2 }));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["personalizations"][0]["bcc"],
            serde_json::json!([{ "email": "b@example.com" }, { "email": "c@example.com" }])
        );
    }

    #[test]
    fn test_build_requires_generator() {
        assert!(PipelineBuilder::new().build().is_err());
    }
}

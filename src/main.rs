mod client;
mod config;
mod constant;
mod llm;
mod mail;
mod newsletter;
mod pipeline;
mod schedule;
mod source;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;
use crate::mail::subscribers::SubscriberStore;
use crate::pipeline::{PipelineBuilder, RunOptions};
use crate::schedule::Schedule;

/// Weekly financial newsletter: market data, model-drafted analysis, email delivery.
#[derive(Parser)]
#[command(name = "marketletter", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a newsletter and send it.
    Generate {
        /// Send only to the test recipients.
        #[arg(long)]
        test: bool,
        /// Save the newsletter without sending it.
        #[arg(long)]
        save_only: bool,
        /// Test recipients, used with --test.
        #[arg(long, num_args = 1..)]
        recipients: Vec<String>,
        /// File to attach to the email.
        #[arg(long)]
        attachment: Option<PathBuf>,
    },
    /// Run on the configured schedule until interrupted.
    Schedule,
    /// Add a subscriber, or reactivate an existing one.
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a subscriber.
    Remove { email: String },
    /// Mark a subscriber active.
    Activate { email: String },
    /// Mark a subscriber inactive.
    Deactivate { email: String },
    /// List subscribers.
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = setup_env_and_tracing();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    let config = Config::get();

    match command {
        Commands::Generate {
            test,
            save_only,
            recipients,
            attachment,
        } => {
            config.warn_missing();
            let pipeline = PipelineBuilder::from_config(config)?.build()?;
            let outcome = pipeline
                .run_once(&RunOptions {
                    test_mode: test,
                    save_only,
                    test_recipients: recipients,
                    attachment,
                })
                .await?;
            println!("Newsletter saved to {}", outcome.saved.html_path.display());
            if let Some(report) = outcome.report {
                println!("Sent to {}/{} recipients", report.sent, report.total);
            }
        }
        Commands::Schedule => {
            config.warn_missing();
            let pipeline = PipelineBuilder::from_config(config)?.build()?;
            pipeline.run_loop(Schedule::from_config(config)).await?;
        }
        Commands::Add { email, name } => {
            let mut store = SubscriberStore::open(&config.subscribers_file)?;
            store.add(&email, name.as_deref())?;
            println!("Subscriber {email} saved");
        }
        Commands::Remove { email } => {
            SubscriberStore::open(&config.subscribers_file)?.remove(&email)?;
            println!("Subscriber {email} removed");
        }
        Commands::Activate { email } => {
            SubscriberStore::open(&config.subscribers_file)?.activate(&email)?;
            println!("Subscriber {email} activated");
        }
        Commands::Deactivate { email } => {
            SubscriberStore::open(&config.subscribers_file)?.deactivate(&email)?;
            println!("Subscriber {email} deactivated");
        }
        Commands::List => {
            for line in SubscriberStore::open(&config.subscribers_file)?.listing() {
                println!("{line}");
            }
        }
    }

    Ok(())
}

/// Loads `.env`, then logs to the console and to `LOG_DIR/marketletter.log`.
/// `RUST_LOG` wins over `LOG_LEVEL`. The returned guard flushes the file on drop.
pub fn setup_env_and_tracing() -> Option<WorkerGuard> {
    dotenv::dotenv().ok();
    let config = Config::get();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let file = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("marketletter.log")
        .build(&config.log_dir);
    let (file_layer, guard) = match file {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(e) => {
            eprintln!("File logging disabled: {e}");
            (None, None)
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    guard
}

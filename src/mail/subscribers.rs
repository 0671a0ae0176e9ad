use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscriber {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// CSV rows keep `active` as text so `yes`/`1` are accepted.
#[derive(Debug, Deserialize)]
struct CsvRow {
    email: String,
    name: Option<String>,
    active: Option<String>,
}

impl From<CsvRow> for Subscriber {
    fn from(row: CsvRow) -> Self {
        let active = row
            .active
            .map(|a| matches!(a.trim().to_lowercase().as_str(), "true" | "yes" | "1"))
            .unwrap_or(true);
        Subscriber {
            email: row.email,
            name: row.name.unwrap_or_default(),
            active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Format {
    Json,
    Csv,
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
        })
        .is_match(email)
}

/// The subscriber list, persisted to a JSON or CSV file after every change.
#[derive(Debug)]
pub struct SubscriberStore {
    path: PathBuf,
    format: Format,
    subscribers: Vec<Subscriber>,
}

impl SubscriberStore {
    /// Loads `path`, creating an empty list when the file does not exist.
    /// Files with an extension other than `.json` or `.csv` are stored as `.json`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (path, format) = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("csv") => (path.to_path_buf(), Format::Csv),
            Some("json") => (path.to_path_buf(), Format::Json),
            _ => (path.with_extension("json"), Format::Json),
        };

        let mut store = Self {
            path,
            format,
            subscribers: Vec::new(),
        };

        if store.path.exists() {
            store.subscribers = store.load()?;
            tracing::info!(
                "Loaded {} subscribers from {}",
                store.subscribers.len(),
                store.path.display()
            );
        } else {
            if let Some(parent) = store.path.parent() {
                fs::create_dir_all(parent)?;
            }
            store.save()?;
            tracing::info!("Created empty subscribers file: {}", store.path.display());
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Subscriber>> {
        let subscribers = match self.format {
            Format::Json => {
                let raw = fs::read_to_string(&self.path)?;
                if raw.trim().is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid subscribers file {}", self.path.display()))?
                }
            }
            Format::Csv => {
                let mut reader = csv::ReaderBuilder::new()
                    .trim(csv::Trim::All)
                    .from_path(&self.path)?;
                let mut subscribers = Vec::new();
                for row in reader.deserialize::<CsvRow>() {
                    subscribers.push(row?.into());
                }
                subscribers
            }
        };
        Ok(subscribers)
    }

    fn save(&self) -> Result<()> {
        match self.format {
            Format::Json => {
                let raw = serde_json::to_string_pretty(&self.subscribers)?;
                fs::write(&self.path, raw)?;
            }
            Format::Csv => {
                let mut writer = csv::Writer::from_path(&self.path)?;
                writer.write_record(["email", "name", "active"])?;
                for s in &self.subscribers {
                    writer.write_record([s.email.as_str(), s.name.as_str(), if s.active { "true" } else { "false" }])?;
                }
                writer.flush()?;
            }
        }
        tracing::info!(
            "Saved {} subscribers to {}",
            self.subscribers.len(),
            self.path.display()
        );
        Ok(())
    }

    fn find_mut(&mut self, email: &str) -> Option<&mut Subscriber> {
        self.subscribers.iter_mut().find(|s| s.email == email)
    }

    /// Adds `email`, or reactivates it (replacing the name when one is given).
    pub fn add(&mut self, email: &str, name: Option<&str>) -> Result<()> {
        let email = email.trim();
        if !is_valid_email(email) {
            bail!("Invalid email address: {}", email);
        }

        if let Some(existing) = self.find_mut(email) {
            if let Some(name) = name {
                existing.name = name.to_string();
            }
            existing.active = true;
            self.save()?;
            tracing::info!("Updated subscriber: {}", email);
            return Ok(());
        }

        self.subscribers.push(Subscriber {
            email: email.to_string(),
            name: name.unwrap_or_default().to_string(),
            active: true,
        });
        self.save()?;
        tracing::info!("Added new subscriber: {}", email);
        Ok(())
    }

    pub fn remove(&mut self, email: &str) -> Result<()> {
        let email = email.trim();
        let index = self
            .subscribers
            .iter()
            .position(|s| s.email == email)
            .ok_or_else(|| anyhow!("Subscriber not found: {}", email))?;
        self.subscribers.remove(index);
        self.save()?;
        tracing::info!("Removed subscriber: {}", email);
        Ok(())
    }

    fn set_active(&mut self, email: &str, active: bool) -> Result<()> {
        let email = email.trim();
        let subscriber = self
            .find_mut(email)
            .ok_or_else(|| anyhow!("Subscriber not found: {}", email))?;
        subscriber.active = active;
        self.save()?;
        tracing::info!(
            "{} subscriber: {}",
            if active { "Activated" } else { "Deactivated" },
            email
        );
        Ok(())
    }

    pub fn activate(&mut self, email: &str) -> Result<()> {
        self.set_active(email, true)
    }

    pub fn deactivate(&mut self, email: &str) -> Result<()> {
        self.set_active(email, false)
    }

    pub fn all(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn active(&self) -> Vec<&Subscriber> {
        self.subscribers.iter().filter(|s| s.active).collect()
    }

    pub fn active_emails(&self) -> Vec<String> {
        self.active().into_iter().map(|s| s.email.clone()).collect()
    }

    /// Lines printed by `list`: a total, then one `email - name - status` line each.
    pub fn listing(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.subscribers.len() + 1);
        lines.push(format!("Total subscribers: {}", self.subscribers.len()));
        lines.extend(self.subscribers.iter().map(|s| {
            let status = if s.active { "active" } else { "inactive" };
            format!("{} - {} - {}", s.email, s.name, status)
        }));
        lines
    }
}

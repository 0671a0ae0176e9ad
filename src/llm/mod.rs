pub mod openai;
pub mod prompt;

use anyhow::Result;
use async_trait::async_trait;

/// A hosted model that turns a prompt into prose.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

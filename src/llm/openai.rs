use anyhow::Result;
use async_openai::{
    config::{AzureConfig, OpenAIConfig},
    types::{
        ChatCompletionRequestMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, Role,
    },
    Client,
};
use async_trait::async_trait;

use crate::config::Config;

use super::LanguageModel;

enum Backend {
    OpenAi(Client<OpenAIConfig>),
    Azure(Client<AzureConfig>),
}

pub struct OpenAiModel {
    backend: Backend,
    model: String,
    temperature: f32,
}

impl OpenAiModel {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.use_azure() {
            let (Some(endpoint), Some(api_key)) = (
                config.azure_openai_endpoint.clone(),
                config.azure_openai_api_key.clone(),
            ) else {
                anyhow::bail!("Azure OpenAI endpoint or key is not set");
            };
            let model = config
                .azure_openai_chat_model
                .clone()
                .unwrap_or_else(|| config.openai_model.clone());
            let azure = AzureConfig::new()
                .with_api_base(endpoint)
                .with_api_key(api_key)
                .with_api_version(config.azure_openai_api_version.clone())
                .with_deployment_id(model.clone());

            tracing::info!("Using Azure OpenAI deployment {}", model);
            return Ok(Self {
                backend: Backend::Azure(Client::with_config(azure)),
                model,
                temperature: config.openai_temperature,
            });
        }

        let api_key = config
            .openai_api_key
            .clone()
            .ok_or(anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let mut openai = OpenAIConfig::new().with_api_key(api_key);
        if let Some(api_base) = &config.openai_api_base {
            openai = openai.with_api_base(api_base.clone());
        }

        Ok(Self {
            backend: Backend::OpenAi(Client::with_config(openai)),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
        })
    }

    fn request(&self, prompt: &str) -> Result<CreateChatCompletionRequest> {
        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages([ChatCompletionRequestMessageArgs::default()
                .role(Role::User)
                .content(prompt)
                .build()?])
            .build()?;
        Ok(req)
    }
}

fn first_content(resp: CreateChatCompletionResponse) -> Result<String> {
    resp.choices
        .into_iter()
        .next()
        .ok_or(anyhow::anyhow!("No response from LLM"))?
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(anyhow::anyhow!("No content in response from LLM"))
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let req = self.request(prompt)?;
        let resp = match &self.backend {
            Backend::OpenAi(client) => client.chat().create(req).await?,
            Backend::Azure(client) => client.chat().create(req).await?,
        };
        first_content(resp)
    }
}

#[cfg(test)]
mod openai_tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(api_base: &str) -> Config {
        let mut config = Config::from_env();
        config.azure_openai_endpoint = None;
        config.azure_openai_api_key = None;
        config.openai_api_key = Some("sk-test".into());
        config.openai_api_base = Some(api_base.to_string());
        config.openai_model = "gpt-test".into();
        config
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let mut config = Config::from_env();
        config.azure_openai_endpoint = None;
        config.openai_api_key = None;
        assert!(OpenAiModel::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "gpt-test",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Markets were calm."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 4, "total_tokens": 9}
            })))
            .mount(&server)
            .await;

        let model = OpenAiModel::from_config(&config_for(&server.uri())).unwrap();
        let text = model.complete("Summarize the week").await.unwrap();
        assert_eq!(text, "Markets were calm.");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-2",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "gpt-test",
                "choices": [],
                "usage": {"prompt_tokens": 5, "completion_tokens": 0, "total_tokens": 5}
            })))
            .mount(&server)
            .await;

        let model = OpenAiModel::from_config(&config_for(&server.uri())).unwrap();
        assert!(model.complete("Summarize the week").await.is_err());
    }
}

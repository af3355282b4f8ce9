use std::future::Future;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};

pub trait Classifier: Send + Sync {
    /// Send one system + user instruction pair and return the reply text.
    fn complete(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fail fast before a run when the classifier cannot be used at all.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }
}

/// Chat-completions classifier backed by an Azure OpenAI deployment.
pub struct ChatClassifier {
    agent: ureq::Agent,
    endpoint: String,
    deployment: String,
    api_version: String,
    api_key_env: String,
    temperature: f32,
}

impl ChatClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build(),
            endpoint: config.endpoint.clone(),
            deployment: config.deployment.clone(),
            api_version: config.api_version.clone(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
        }
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    /// Build the request body for a system + user instruction pair.
    pub fn build_request(&self, system: &str, user: &str) -> Value {
        json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        })
    }

    fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::MissingCredential(format!(
                "{} environment variable not set",
                self.api_key_env
            ))),
        }
    }
}

impl Classifier for ChatClassifier {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let agent = self.agent.clone();
        let url = self.completions_url();
        let body = self.build_request(system, user);

        let raw = tokio::task::spawn_blocking(move || {
            match agent
                .post(&url)
                .set("api-key", &api_key)
                .set("Content-Type", "application/json")
                .send_json(body)
            {
                Ok(response) => response
                    .into_string()
                    .map_err(|e| Error::Classifier(format!("failed to read completion: {e}"))),
                Err(ureq::Error::Status(status, response)) => {
                    let detail = response.into_string().unwrap_or_default();
                    Err(Error::Classifier(format!(
                        "completion request failed with status {status}: {detail}"
                    )))
                }
                Err(ureq::Error::Transport(e)) => {
                    Err(Error::Classifier(format!("completion request failed: {e}")))
                }
            }
        })
        .await
        .map_err(|e| Error::Classifier(format!("completion task failed: {e}")))??;

        let text = parse_completion(&raw)?;
        debug!(chars = text.len(), "classifier replied");
        Ok(text)
    }

    fn check_ready(&self) -> Result<()> {
        self.api_key().map(|_| ())
    }
}

/// Extract the reply text from a chat-completions response: the last text
/// segment of the last choice.
pub fn parse_completion(raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Classifier(format!("failed to parse completion: {e}")))?;

    let content = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.last())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .ok_or_else(|| Error::Classifier("completion has no message content".to_string()))?;

    match content {
        Value::String(text) => Ok(text.clone()),
        Value::Array(parts) => parts
            .iter()
            .rev()
            .find_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| Error::Classifier("completion has no text segment".to_string())),
        Value::Null => Ok(String::new()),
        other => Err(Error::Classifier(format!(
            "unexpected completion content: {other}"
        ))),
    }
}

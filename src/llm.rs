use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rlm::error::{OracleError, OracleResult};
use crate::rlm::oracle::{BossRequest, JudgingOracle, ProposalOracle, ReadingOracle, Rubric};
use crate::rlm::prompts;

const READER_TEMPERATURE: f32 = 0.3;
const READER_MAX_TOKENS: u32 = 500;
const JUDGE_TEMPERATURE: f32 = 0.0;
const JUDGE_MAX_TOKENS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat client. One instance serves all three roles, each
/// with its own model.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    sub_model: String,
    judge_model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-8b".to_string());
        let sub_model =
            dotenv::var("LLM_SUB_MODEL").unwrap_or_else(|_| model.clone());
        let judge_model =
            dotenv::var("LLM_JUDGE_MODEL").unwrap_or_else(|_| sub_model.clone());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            sub_model,
            judge_model,
            api_key,
        })
    }

    pub fn models(&self) -> (&str, &str, &str) {
        (&self.model, &self.sub_model, &self.judge_model)
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        endpoint_for(&self.base_url)
    }

    /// Non-streaming chat completion. An empty reply is an error.
    pub async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> OracleResult<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| OracleError::failed(format!("LLM request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| OracleError::failed(format!("Failed to read LLM response: {e}")))?;
        if !status.is_success() {
            return Err(OracleError::failed(format!(
                "LLM returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let content = extract_content(&text)?;
        debug!(model, response_len = content.len(), "LLM reply");
        Ok(content)
    }
}

fn endpoint_for(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}/v1/chat/completions", base)
    }
}

/// Pull `choices[0].message.content` out of a completion body.
fn extract_content(body: &str) -> OracleResult<String> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| OracleError::failed(format!("Failed to parse LLM JSON: {e}")))?;

    let content = json["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    if content.is_empty() {
        Err(OracleError::Empty)
    } else {
        Ok(content)
    }
}

#[async_trait]
impl ReadingOracle for LlmClient {
    async fn ask(&self, question: &str, text: &str) -> OracleResult<String> {
        let messages = [
            Message::system(prompts::READER_SYSTEM),
            Message::user(prompts::reader_prompt(question, text)),
        ];
        self.chat(&messages, &self.sub_model, READER_TEMPERATURE, READER_MAX_TOKENS)
            .await
    }
}

#[async_trait]
impl JudgingOracle for LlmClient {
    async fn score_axis(&self, rubric: &Rubric) -> OracleResult<String> {
        let messages = [
            Message::system(rubric.system.as_str()),
            Message::user(rubric.prompt.as_str()),
        ];
        self.chat(&messages, &self.judge_model, JUDGE_TEMPERATURE, JUDGE_MAX_TOKENS)
            .await
    }
}

#[async_trait]
impl ProposalOracle for LlmClient {
    async fn propose(&self, request: &BossRequest) -> OracleResult<String> {
        let messages = [
            Message::system(request.system.as_str()),
            Message::user(request.prompt.as_str()),
        ];
        self.chat(
            &messages,
            &self.model,
            request.kind.temperature(),
            request.kind.max_tokens(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            endpoint_for("http://localhost:1234/v1/"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            endpoint_for("https://api.example.com"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint_for("https://host/v1/chat/completions"),
            "https://host/v1/chat/completions"
        );
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" 0.8 "}}]}"#;
        assert_eq!(extract_content(body), Ok("0.8".to_string()));

        let null = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(extract_content(null), Err(OracleError::Empty));

        assert!(matches!(extract_content("not json"), Err(OracleError::Failed(_))));
    }
}

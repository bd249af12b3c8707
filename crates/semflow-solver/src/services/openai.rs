//! Blocking client for OpenAI-compatible chat completions.

use serde_json::{json, Value as Json};
use tracing::trace;

use semflow_core::config::EngineConfig;

use crate::error::{Result, SolverError};
use crate::services::{Completion, LlmService, PromptSignature, Usage, VisionService};

const ANSWER_MARKER: &str = "ANSWER:";

#[derive(Debug, Clone)]
pub struct OpenAiChatService {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl OpenAiChatService {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SolverError::MissingCredential("OPENAI_API_KEY is not set".into()))?;
        if timeout_secs == 0 {
            return Err(SolverError::Config(
                "http timeout must be > 0 seconds".to_string(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SolverError::Service(format!("http client build failed: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            client,
        })
    }

    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        Self::new(
            cfg.llm_endpoint.clone(),
            cfg.llm_model.clone(),
            cfg.openai_api_key.clone(),
            cfg.http_timeout_secs,
        )
    }

    fn chat(&self, messages: Vec<Json>) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| SolverError::Service(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(SolverError::Service(format!(
                "chat API error ({status}): {error_text}"
            )));
        }

        let json: Json = response
            .json()
            .map_err(|e| SolverError::Service(format!("failed to parse chat response: {e}")))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SolverError::Service("invalid chat response format".into()))?;
        trace!(response = %text, "chat completion");

        let usage = Usage::new(
            json["usage"]["prompt_tokens"].as_f64().unwrap_or(0.0),
            json["usage"]["completion_tokens"].as_f64().unwrap_or(0.0),
        );
        Ok(Completion::new(final_answer(text), usage))
    }
}

/// Text after the last `ANSWER:` marker, or the whole reply when absent.
fn final_answer(text: &str) -> String {
    match text.rfind(ANSWER_MARKER) {
        Some(pos) => text[pos + ANSWER_MARKER.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn system_prompt(sig: &PromptSignature, task: &str) -> String {
    format!(
        "You are reading a {} document with schema {}. {task} \
         Think step by step, then write the final answer on its own last line as `{ANSWER_MARKER} <answer>`.",
        sig.doc_type, sig.doc_schema
    )
}

impl LlmService for OpenAiChatService {
    fn model(&self) -> &str {
        &self.model
    }

    fn cot_qa(&self, context: &str, question: &str, sig: &PromptSignature) -> Result<Completion> {
        self.chat(vec![
            json!({"role": "system", "content": system_prompt(sig, "Answer the question using only the document.")}),
            json!({"role": "user", "content": format!("Document:\n{context}\n\nQuestion: {question}")}),
        ])
    }

    fn cot_bool(
        &self,
        context: &str,
        condition: &str,
        sig: &PromptSignature,
    ) -> Result<Completion> {
        self.chat(vec![
            json!({"role": "system", "content": system_prompt(sig, "Decide whether the condition holds; the answer must be TRUE or FALSE.")}),
            json!({"role": "user", "content": format!("Document:\n{context}\n\nCondition: {condition}")}),
        ])
    }
}

impl VisionService for OpenAiChatService {
    fn describe_image(&self, image_b64: &str) -> Result<Completion> {
        self.chat(vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "Describe this image in detail. End with `ANSWER: <description>`."},
                {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{image_b64}")}}
            ]
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_fails_before_any_request() {
        let err = OpenAiChatService::new("http://127.0.0.1:9", "m", None, 5).unwrap_err();
        assert!(matches!(err, SolverError::MissingCredential(_)));
        let err = OpenAiChatService::new("http://127.0.0.1:9", "m", Some("  ".into()), 5);
        assert!(err.is_err());
    }

    #[test]
    fn final_answer_takes_last_marker() {
        assert_eq!(final_answer("x\nANSWER: a\nANSWER:  TRUE \n"), "TRUE");
        assert_eq!(final_answer("  plain "), "plain");
    }
}

//! OpenAI-compatible chat completions translator.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    build_prompt, parse_response, SqlTranslator, Translation, TranslationError,
    TranslationRequest, SYSTEM_PROMPT,
};
use crate::config::LlmConfig;

/// Blocking client for `POST {base_url}/chat/completions`.
///
/// One request per translation; failures are reported, never retried.
pub struct OpenAiTranslator {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiTranslator {
    pub fn new(config: &LlmConfig) -> Result<Self, TranslationError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                TranslationError::NotConfigured(
                    "no API key (set OPENAI_API_KEY, llm.api_key or --api-key)".to_string(),
                )
            })?;
        if config.timeout_seconds == 0 {
            return Err(TranslationError::NotConfigured(
                "llm.timeout_seconds must be > 0".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| TranslationError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_seconds,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, err: reqwest::Error) -> TranslationError {
        if err.is_timeout() {
            TranslationError::Timeout(self.timeout_secs)
        } else {
            TranslationError::Http(err.to_string())
        }
    }
}

impl SqlTranslator for OpenAiTranslator {
    fn name(&self) -> &str {
        "openai"
    }

    fn translate(&self, request: &TranslationRequest) -> Result<Translation, TranslationError> {
        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.temperature,
        };

        debug!(
            model = %self.model,
            hint = %request.operation_hint,
            prompt_chars = prompt.len(),
            "sending translation request"
        );
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            warn!(status = status.as_u16(), "translation request failed");
            return Err(TranslationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                TranslationError::Timeout(self.timeout_secs)
            } else {
                TranslationError::InvalidResponse(format!("malformed completion body: {}", e))
            }
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                TranslationError::InvalidResponse("completion has no choices".to_string())
            })?;

        parse_response(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            OpenAiTranslator::new(&config),
            Err(TranslationError::NotConfigured(_))
        ));

        let blank = LlmConfig {
            api_key: Some("  ".to_string()),
            ..LlmConfig::default()
        };
        assert!(OpenAiTranslator::new(&blank).is_err());
    }

    #[test]
    fn test_endpoint_from_base_url() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:8080/v1/".to_string(),
            ..LlmConfig::default()
        };
        let translator = OpenAiTranslator::new(&config).unwrap();
        assert_eq!(translator.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(translator.model(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "m");
    }
}

use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// One opaque text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub trait Generator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

/// Resolve the generation API key from the environment, once, at startup.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    std::env::var(env_var)
        .map_err(|_| Error::Generation(format!("generation API key not found in ${env_var}")))
}

// ---------------------------------------------------------------------------
// Chat-completions wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn generation_from_json(value: serde_json::Value) -> Result<Generation> {
    let parsed: ChatResponse = serde_json::from_value(value)
        .map_err(|e| Error::Generation(format!("failed to parse generation response: {e}")))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Generation("generation response has no choices".to_string()))?;
    Ok(Generation {
        text: choice.message.content,
        prompt_tokens: parsed.usage.prompt_tokens,
        completion_tokens: parsed.usage.completion_tokens,
    })
}

/// Only retry rate-limits (429), server errors (5xx), and transport errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// Generator over an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGenerator {
    api_key: String,
    api_url: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    pub fn with_api_url(api_key: String, api_url: String) -> Self {
        Self { api_key, api_url }
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
        });
        let auth = format!("Bearer {}", self.api_key);

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        for attempt in 1..=MAX_RETRIES {
            match ureq::post(&self.api_url)
                .set("Authorization", &auth)
                .set("Content-Type", "application/json")
                .send_json(&body)
            {
                Ok(response) => {
                    let json: serde_json::Value = response.into_json().map_err(|e| {
                        Error::Generation(format!("failed to read generation response: {e}"))
                    })?;
                    let generation = generation_from_json(json)?;
                    debug!(
                        model = request.model,
                        prompt_tokens = generation.prompt_tokens,
                        completion_tokens = generation.completion_tokens,
                        "generation complete"
                    );
                    return Ok(generation);
                }
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying generation API after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => {
                    return Err(Error::Generation(format!("generation request failed: {e}")));
                }
            }
        }
        unreachable!()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_from_json() {
        let value = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "fixed code" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160 }
        });
        let generation = generation_from_json(value).unwrap();
        assert_eq!(generation.text, "fixed code");
        assert_eq!(generation.prompt_tokens, 120);
        assert_eq!(generation.completion_tokens, 40);
    }

    #[test]
    fn test_generation_from_json_no_choices() {
        let value = json!({
            "choices": [],
            "usage": { "prompt_tokens": 1, "completion_tokens": 0 }
        });
        let err = generation_from_json(value).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn test_generation_from_json_malformed() {
        let err = generation_from_json(json!({"error": {"message": "bad key"}})).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_api_key_from_env() {
        // SAFETY: serialized; no other thread reads the environment here.
        unsafe { std::env::set_var("MEND_TEST_KEY", "sk-test") };
        assert_eq!(resolve_api_key("MEND_TEST_KEY").unwrap(), "sk-test");
        unsafe { std::env::remove_var("MEND_TEST_KEY") };
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_api_key_missing() {
        unsafe { std::env::remove_var("MEND_TEST_KEY_ABSENT") };
        let err = resolve_api_key("MEND_TEST_KEY_ABSENT").unwrap_err();
        assert!(err.to_string().contains("MEND_TEST_KEY_ABSENT"));
    }
}

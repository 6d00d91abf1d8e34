use async_openai::types::{
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

const MAX_RETRIES: u32 = 2;

/// Ask the configured language model for a completion. Retries transient
/// failures with exponential backoff; returns `None` once retries are
/// exhausted so callers can apply their own fallback.
pub async fn generate_llm_response(
    prompt: &str,
    params: &LLMParams,
    request_timeout: Duration,
) -> Option<String> {
    let mut backoff = 1;

    for retry_count in 0..=MAX_RETRIES {
        debug!(target: TARGET_LLM_REQUEST, "Sending LLM request (attempt {}/{})", retry_count + 1, MAX_RETRIES + 1);

        match timeout(request_timeout, send_request(prompt, params)).await {
            Ok(Ok(Some(response))) => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received ({} chars)", response.len());
                return Some(response);
            }
            Ok(Ok(None)) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM returned an empty response");
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out after {:?}", request_timeout);
            }
        }

        if retry_count < MAX_RETRIES {
            debug!(target: TARGET_LLM_REQUEST, "Backing off for {}s before retry", backoff);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "No response generated after {} attempts", MAX_RETRIES + 1);
    None
}

async fn send_request(prompt: &str, params: &LLMParams) -> anyhow::Result<Option<String>> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string());
            request.options = Some(GenerationOptions::default().temperature(params.temperature));

            let response = ollama.generate(request).await.map_err(anyhow::Error::msg)?;
            let text = response.response.trim().to_string();
            Ok((!text.is_empty()).then_some(text))
        }
        LLMClient::OpenAI(client) => {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&params.model)
                .messages([ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into()])
                .temperature(params.temperature)
                .max_tokens(512u32)
                .build()?;

            let response = client.chat().create(request).await?;
            let text = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .map(|content| content.trim().to_string());
            Ok(text.filter(|t| !t.is_empty()))
        }
    }
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }
}

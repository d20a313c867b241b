use crate::error::{LlmError, Result};
use crate::llm::types::{ChatCompletionRequest, ChatCompletionResponse};
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::debug;

pub async fn post(
    client: &Client,
    request_body: &ChatCompletionRequest,
    header_map: HeaderMap,
    url: &str,
    timeout: Duration,
) -> Result<ChatCompletionResponse> {
    let response = client
        .post(url)
        .headers(header_map)
        .timeout(timeout)
        .json(request_body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::ApiError {
            status,
            message: error_text,
        }
        .into());
    }

    let completion_response = response
        .json::<ChatCompletionResponse>()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    debug!(id = ?completion_response.id, usage = ?completion_response.usage, "Post completion response");

    Ok(completion_response)
}

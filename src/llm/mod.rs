mod client;
pub mod config;
pub mod types;

use crate::error::{ChatError, LlmError, Result};
use crate::llm::client::post;
use crate::llm::config::ModelConfig;
use crate::llm::types::{ChatCompletionRequest, Message};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1024;

pub fn assemble_req_header(model: &ModelConfig) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();

    header_map.insert(
        "Authorization",
        format!("Bearer {}", model.apikey)
            .parse()
            .map_err(|e| ChatError::Other(format!("Invalid Authorization header: {}", e)))?,
    );
    header_map.insert(
        "Content-Type",
        "application/json"
            .parse()
            .map_err(|e| ChatError::Other(format!("Invalid Content-Type header: {}", e)))?,
    );
    Ok(header_map)
}

/// 生成后端接口：给定完整消息列表（上下文 + 新输入），返回模型回复文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_simple(&self, messages: Vec<Message>) -> Result<String>;
}

/// 调用 OpenAI 兼容 `/chat/completions` 接口的默认实现（Groq、OpenAI、本地推理服务均可）
pub struct OpenAiCompatClient {
    client: Arc<Client>,
    model: ModelConfig,
    timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(client: Arc<Client>, model: ModelConfig) -> Self {
        Self {
            client,
            model,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat_simple(&self, messages: Vec<Message>) -> Result<String> {
        let request_body = ChatCompletionRequest {
            model: self.model.model.clone(),
            messages,
            temperature: Some(TEMPERATURE),
            max_tokens: Some(MAX_TOKENS),
            stream: Some(false),
        };
        let header_map = assemble_req_header(&self.model)?;
        let response = post(
            &self.client,
            &request_body,
            header_map,
            &self.model.baseurl,
            self.timeout,
        )
        .await?;

        response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_req_header() {
        let model = ModelConfig {
            model: "llama3-8b-8192".to_string(),
            baseurl: "http://localhost".to_string(),
            apikey: "gsk_abc".to_string(),
        };
        let headers = assemble_req_header(&model).unwrap();
        assert_eq!(headers["Authorization"], "Bearer gsk_abc");
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let model = ModelConfig {
            model: "m".to_string(),
            baseurl: "http://127.0.0.1:1/v1/chat/completions".to_string(),
            apikey: "k".to_string(),
        };
        let client = OpenAiCompatClient::new(Arc::new(Client::new()), model)
            .with_timeout(Duration::from_secs(2));
        let err = client
            .chat_simple(vec![Message::user("hi".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Llm(LlmError::NetworkError(_))));
    }
}

//! Mock LLM 客户端，不发起任何 HTTP 请求。

use crate::error::{ChatError, LlmError, Result};
use crate::llm::LlmClient;
use crate::llm::types::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 预设响应的枚举（文本或错误）
enum MockLlmResponse {
    Content(String),
    Err(ChatError),
}

/// 可脚本化的 Mock LLM 客户端。
///
/// 按顺序返回预设的响应；队列耗尽后返回 `EmptyResponse` 错误。
/// 所有调用都被记录，可通过 [`call_count`](MockLlmClient::call_count) /
/// [`last_messages`](MockLlmClient::last_messages) 等方法检查。
pub struct MockLlmClient {
    responses: Arc<Mutex<VecDeque<MockLlmResponse>>>,
    /// 每次调用时收到的 messages 列表，按顺序记录
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
    /// 每次调用前的人为延迟，用来制造并发交错
    delay: Option<Duration>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    /// 创建空 Mock，尚未设置任何响应
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// 追加一条成功响应文本
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockLlmResponse::Content(text.into()));
        self
    }

    /// 批量追加多条成功响应
    pub fn with_responses(self, texts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        {
            let mut q = self.responses.lock().unwrap();
            for t in texts {
                q.push_back(MockLlmResponse::Content(t.into()));
            }
        }
        self
    }

    /// 追加一条错误响应（用于测试错误处理路径）
    pub fn with_error(self, err: ChatError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockLlmResponse::Err(err));
        self
    }

    /// 追加一条网络错误（常用的便捷方法）
    pub fn with_network_error(self, msg: impl Into<String>) -> Self {
        self.with_error(ChatError::Llm(LlmError::NetworkError(msg.into())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已发生的调用总次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 最后一次调用时传入的 messages（若从未调用则返回 `None`）
    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// 所有历史调用的 messages（按时序排列）
    pub fn all_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    /// 剩余未消费的预设响应数量
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat_simple(&self, messages: Vec<Message>) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(messages);

        match self.responses.lock().unwrap().pop_front() {
            Some(MockLlmResponse::Content(text)) => Ok(text),
            Some(MockLlmResponse::Err(e)) => Err(e),
            None => Err(ChatError::Llm(LlmError::EmptyResponse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses() {
        let mock = MockLlmClient::new()
            .with_responses(["one", "two"])
            .with_network_error("down");

        assert_eq!(mock.chat_simple(vec![]).await.unwrap(), "one");
        assert_eq!(mock.chat_simple(vec![]).await.unwrap(), "two");
        assert!(mock.chat_simple(vec![]).await.is_err());
        assert!(matches!(
            mock.chat_simple(vec![]).await,
            Err(ChatError::Llm(LlmError::EmptyResponse))
        ));
        assert_eq!(mock.call_count(), 4);
        assert_eq!(mock.remaining(), 0);
    }
}

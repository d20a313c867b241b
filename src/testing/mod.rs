//! 测试基础设施
//!
//! 在不依赖真实 LLM、真人审批和聊天平台的情况下测试会话编排。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockLlmClient`] | 替代生成后端，按顺序返回预设回复并记录每次收到的消息 |
//! | [`MockApprover`] | 替代人工审批，按脚本返回通过/拒绝/超时 |
//! | [`RecordingSink`] | 替代平台发送接口，记录所有发出的回复 |
//!
//! 所有 Mock 内部使用 `Arc<Mutex<_>>`，可以在并发测试中共享。
//!
//! ```rust
//! use mass_chatbot::testing::MockLlmClient;
//! use mass_chatbot::llm::LlmClient;
//! use mass_chatbot::llm::types::Message;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockLlmClient::new().with_response("heyy");
//! let reply = mock.chat_simple(vec![Message::user("hi".to_string())]).await.unwrap();
//! assert_eq!(reply, "heyy");
//! assert_eq!(mock.call_count(), 1);
//! # }
//! ```

mod mock_approver;
mod mock_llm;
mod recording_sink;

pub use mock_approver::MockApprover;
pub use mock_llm::MockLlmClient;
pub use recording_sink::RecordingSink;

//! 人工审批通道
//!
//! 回复在真正发出之前，通过 [`HumanLoopProvider`] 交给人确认。
//! 审批是注入的异步能力，而不是写死的终端读取，测试可以提供确定的审批结果。
//!
//! | Provider | 渠道 |
//! |----------|------|
//! | [`ConsoleHumanLoopProvider`] | 命令行 stdin，y/n |
//! | [`WebhookHumanLoopProvider`] | HTTP POST 审核卡片，对端回答 y/n |
//! | [`WebSocketHumanLoopProvider`] | 本地 WebSocket 审批台，可多台同时在线 |
//! | [`AutoApproveProvider`] | 全部自动通过 |

mod console;
mod webhook;
mod websocket;

use crate::error::Result;
use async_trait::async_trait;

pub use console::ConsoleHumanLoopProvider;
pub use webhook::WebhookHumanLoopProvider;
pub use websocket::WebSocketHumanLoopProvider;

/// 一次审批请求：原始消息与待发送的候选回复
#[derive(Debug, Clone, PartialEq)]
pub struct HumanLoopRequest {
    /// 给审批人看的提示
    pub prompt: String,
    /// 触发本轮回复的原始消息内容
    pub original: String,
    /// 模型生成、等待发送的回复
    pub candidate: String,
    /// 回复将要发往的频道
    pub channel_id: String,
}

impl HumanLoopRequest {
    pub fn approval(
        original: impl Into<String>,
        candidate: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: "send?".to_string(),
            original: original.into(),
            candidate: candidate.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// 审批结果
#[derive(Debug, Clone, PartialEq)]
pub enum HumanLoopResponse {
    Approved,
    Rejected { reason: Option<String> },
    Timeout,
}

impl HumanLoopResponse {
    pub fn is_approved(&self) -> bool {
        matches!(self, HumanLoopResponse::Approved)
    }
}

/// 所有渠道共用的 `send? [y/n]` 判定：只有 y / yes 算通过，其余一律拒绝
pub(crate) fn parse_answer(answer: &str) -> HumanLoopResponse {
    let trimmed = answer.trim();
    if trimmed.eq_ignore_ascii_case("y") || trimmed.eq_ignore_ascii_case("yes") {
        HumanLoopResponse::Approved
    } else {
        HumanLoopResponse::Rejected { reason: None }
    }
}

/// 人工审批的统一接口
#[async_trait]
pub trait HumanLoopProvider: Send + Sync {
    async fn request(&self, req: HumanLoopRequest) -> Result<HumanLoopResponse>;
}

/// 不经人工，一律通过
pub struct AutoApproveProvider;

#[async_trait]
impl HumanLoopProvider for AutoApproveProvider {
    async fn request(&self, _req: HumanLoopRequest) -> Result<HumanLoopResponse> {
        Ok(HumanLoopResponse::Approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n").is_approved());
        assert!(parse_answer(" YES ").is_approved());
        assert!(!parse_answer("n\n").is_approved());
        assert!(!parse_answer("").is_approved());
        assert!(!parse_answer("maybe").is_approved());
    }
}

//! 上下文窗口
//!
//! 从用户历史中取最近 `k` 轮对话，按原始时间顺序展开成 `user` / `assistant`
//! 消息对，作为生成后端的前置对话。窗口每轮重新构建，不做持久化。

use crate::llm::types::Message;
use crate::memory::Exchange;

/// 默认窗口大小，正常使用中相当于完整历史
pub const DEFAULT_WINDOW: usize = 100;

/// 取 `history` 最后 `min(k, len)` 条，保持原顺序；不修改 `history`
pub fn build(history: &[Exchange], k: usize) -> Vec<Exchange> {
    let split_at = history.len().saturating_sub(k);
    history[split_at..].to_vec()
}

/// 每轮对话展开为一条 user 消息加一条 assistant 消息
pub fn to_messages(window: &[Exchange]) -> Vec<Message> {
    window
        .iter()
        .flat_map(|e| {
            [
                Message::user(e.input.clone()),
                Message::assistant(e.output.clone()),
            ]
        })
        .collect()
}

/// 固定大小的滑动窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    k: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ContextWindow {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// 不携带任何历史
    pub fn empty() -> Self {
        Self { k: 0 }
    }

    pub fn size(&self) -> usize {
        self.k
    }

    pub fn build(&self, history: &[Exchange]) -> Vec<Exchange> {
        build(history, self.k)
    }

    /// 组装发给后端的完整消息列表：窗口内的历史 + 本轮输入
    pub fn messages(&self, history: &[Exchange], input: &str) -> Vec<Message> {
        let mut messages = to_messages(&self.build(history));
        messages.push(Message::user(input.to_string()));
        messages
    }
}

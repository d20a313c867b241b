//! 聊天平台侧的窄接口
//!
//! 平台连接与鉴权不在本 crate 范围内；这里只定义收到的消息长什么样、
//! 机器人自己的身份，以及把回复发回频道的 [`MessageSink`]。

use crate::error::{ChatError, Result};
use crate::memory::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write as _;

/// 平台投递过来的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub content: String,
    pub channel_id: String,
    /// 频道展示名，仅用于日志
    #[serde(default)]
    pub channel_name: Option<String>,
    /// 消息是否 @ 了机器人
    #[serde(default)]
    pub mentions_bot: bool,
}

impl InboundMessage {
    pub fn new(
        sender_id: impl Into<UserId>,
        sender_display_name: impl Into<String>,
        content: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            content: content.into(),
            channel_id: channel_id.into(),
            channel_name: None,
            mentions_bot: true,
        }
    }

    pub fn with_mentions_bot(mut self, mentions_bot: bool) -> Self {
        self.mentions_bot = mentions_bot;
        self
    }
}

/// 机器人自身在平台上的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub display_name: String,
    /// 平台里 @ 机器人时出现在消息文本中的标记，例如 `<@1234>`、`<@!1234>`
    pub mention_tokens: Vec<String>,
}

impl BotIdentity {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            mention_tokens: Vec::new(),
        }
    }

    pub fn with_mention(mut self, token: impl Into<String>) -> Self {
        self.mention_tokens.push(token.into());
        self
    }

    /// 把文本里所有 @ 机器人的标记替换为机器人的显示名
    pub fn resolve_mentions(&self, text: &str) -> String {
        let mut out = text.to_string();
        for token in self.mention_tokens.iter().filter(|t| !t.is_empty()) {
            out = out.replace(token.as_str(), &self.display_name);
        }
        out
    }
}

/// 把文本发回平台频道
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// 直接打印到 stdout 的 Sink，用于控制台频道
pub struct ConsoleSink;

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "[{channel_id}] {text}")
            .and_then(|_| stdout.flush())
            .map_err(|e| ChatError::Channel(format!("写入 stdout 失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mentions() {
        let bot = BotIdentity::new("alizey")
            .with_mention("<@99>")
            .with_mention("<@!99>");
        assert_eq!(
            bot.resolve_mentions("hey <@99> and <@!99>, <@98>"),
            "hey alizey and alizey, <@98>"
        );
    }

    #[test]
    fn test_no_mention_tokens_leaves_text() {
        let bot = BotIdentity::new("alizey");
        assert_eq!(bot.resolve_mentions("hi there"), "hi there");
    }

    #[test]
    fn test_inbound_defaults() {
        let msg = InboundMessage::new("42", "UserName", "hi", "dm");
        assert_eq!(msg.sender_id, UserId::from("42"));
        assert!(msg.mentions_bot);
        assert!(msg.channel_name.is_none());
    }
}

//! 会话编排
//!
//! 每个用户一条独立的状态机：
//!
//! ```text
//! Uninitialized ──首条消息──▶ 人设预热（记录一轮）──▶ Active
//! Active ──消息──▶ 构建上下文 → 生成 → 记录 → 审批关卡 → Delivered / Suppressed
//! ```
//!
//! "是否已初始化" 不单独持久化，而是由 "历史存在且非空" 推导。
//! 同一用户的整轮处理（预热检查、生成、写入）在该用户的锁内完成，
//! 不同用户之间互不阻塞；审批在释放用户锁之后进行。

use crate::channel::{BotIdentity, InboundMessage, MessageSink};
use crate::config::Config;
use crate::context::ContextWindow;
use crate::error::Result;
use crate::gate::DeliveryGate;
use crate::llm::LlmClient;
use crate::llm::types::Message;
use crate::memory::{Exchange, HistoryStore, UserId};
use crate::persona::PersonalityTemplate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 触发 "打印记忆" 的消息片段
pub const SHOW_MEMORY_COMMAND: &str = "show memory";

/// 一次 `on_message` 的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 回复已发送
    Delivered,
    /// 回复已生成但被审批拒绝，未发送
    Suppressed,
    /// 消息没有 @ 机器人
    Ignored,
    /// 处理了 show memory 命令，携带历史条数
    MemoryShown(usize),
}

pub struct SessionConfig {
    bot: BotIdentity,
    /// 回复开头需要剥掉的自我称呼
    strip_prefixes: Vec<String>,
    window: ContextWindow,
    /// `memory=false` 的轮次是否写入历史
    record_bypassed_turns: bool,
    /// 是否在日志里逐条输出收到的消息
    stream: bool,
}

impl SessionConfig {
    pub fn new(bot: BotIdentity) -> Self {
        Self {
            bot,
            strip_prefixes: Vec::new(),
            window: ContextWindow::default(),
            record_bypassed_turns: false,
            stream: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(BotIdentity::new(&config.bot_name))
            .strip_prefixes(config.strip_prefixes.clone())
            .window(ContextWindow::new(config.context_window))
            .record_bypassed_turns(config.record_bypassed_turns)
            .stream(config.stream)
    }

    pub fn bot(mut self, bot: BotIdentity) -> Self {
        self.bot = bot;
        self
    }

    pub fn strip_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.strip_prefixes = prefixes;
        self
    }

    pub fn window(mut self, window: ContextWindow) -> Self {
        self.window = window;
        self
    }

    pub fn record_bypassed_turns(mut self, record: bool) -> Self {
        self.record_bypassed_turns = record;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

pub struct Session {
    config: SessionConfig,
    persona: PersonalityTemplate,
    store: Arc<dyn HistoryStore>,
    llm: Arc<dyn LlmClient>,
    gate: DeliveryGate,
    sink: Arc<dyn MessageSink>,
    /// 每个用户一把锁，表本身只在取锁、还锁时短暂持有；空闲用户的锁会被移除
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        persona: PersonalityTemplate,
        store: Arc<dyn HistoryStore>,
        llm: Arc<dyn LlmClient>,
        gate: DeliveryGate,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            config,
            persona,
            store,
            llm,
            gate,
            sink,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.config.bot
    }

    pub fn persona(&self) -> &PersonalityTemplate {
        &self.persona
    }

    /// 平台事件入口
    pub async fn on_message(&self, msg: &InboundMessage) -> Result<TurnOutcome> {
        if self.config.stream {
            let channel = msg.channel_name.as_deref().unwrap_or(&msg.channel_id);
            info!(
                "💬 {}/{}: {}",
                channel, msg.sender_display_name, msg.content
            );
        }

        if !msg.mentions_bot {
            debug!(user = %msg.sender_id, "消息未提及机器人，忽略");
            return Ok(TurnOutcome::Ignored);
        }

        if msg.content.contains(SHOW_MEMORY_COMMAND) {
            let shown = self.show_memory(&msg.sender_id).await?;
            return Ok(TurnOutcome::MemoryShown(shown));
        }

        self.respond(msg, true).await
    }

    /// 生成回复、记录，然后交给审批关卡决定是否发送
    pub async fn respond(&self, msg: &InboundMessage, memory: bool) -> Result<TurnOutcome> {
        let prompt = self.parse_message(msg);
        let reply = self
            .chat(&msg.sender_id, &msg.sender_display_name, &prompt, memory)
            .await?;

        if !self.gate.approve(&msg.content, &reply, &msg.channel_id).await? {
            info!(user = %msg.sender_id, channel = %msg.channel_id, "🚫 回复未通过审批，已丢弃");
            return Ok(TurnOutcome::Suppressed);
        }

        self.sink.send(&msg.channel_id, &reply).await?;
        info!(user = %msg.sender_id, channel = %msg.channel_id, "📤 回复已发送");
        Ok(TurnOutcome::Delivered)
    }

    /// 一轮完整对话：必要时预热，生成回复并写入历史，返回清理后的回复。
    ///
    /// `memory = false` 时上下文为空；这样生成的轮次默认不写入历史。
    /// 开启 `record_bypassed_turns` 时，新用户仍先完成预热再写入该轮，
    /// 人设那一轮始终是历史中的第一条。
    pub async fn chat(
        &self,
        user: &UserId,
        display_name: &str,
        prompt: &str,
        memory: bool,
    ) -> Result<String> {
        let lock = self.user_lock(user).await;
        let result = {
            let _guard = lock.lock().await;
            self.chat_locked(user, display_name, prompt, memory).await
        };
        self.release_user_lock(user, lock).await;
        result
    }

    /// 用户尚无历史时，用人设模板预热一轮。返回本次是否真的执行了预热
    pub async fn ensure_primed(&self, user: &UserId, display_name: &str) -> Result<bool> {
        let lock = self.user_lock(user).await;
        let result = {
            let _guard = lock.lock().await;
            self.ensure_primed_locked(user, display_name).await
        };
        self.release_user_lock(user, lock).await;
        result
    }

    async fn chat_locked(
        &self,
        user: &UserId,
        display_name: &str,
        prompt: &str,
        memory: bool,
    ) -> Result<String> {
        if !memory {
            if self.config.record_bypassed_turns {
                self.ensure_primed_locked(user, display_name).await?;
            }
            let messages = ContextWindow::empty().messages(&[], prompt);
            let reply = self.generate(messages).await?;
            if self.config.record_bypassed_turns {
                self.store
                    .append_exchange(user, Exchange::new(prompt, reply.clone()))
                    .await?;
            }
            return Ok(reply);
        }

        self.ensure_primed_locked(user, display_name).await?;

        let history = self.store.get_history(user).await?;
        let messages = self.config.window.messages(&history, prompt);
        debug!(user = %user, context = history.len().min(self.config.window.size()), "构建上下文");

        let reply = self.generate(messages).await?;
        self.store
            .append_exchange(user, Exchange::new(prompt, reply.clone()))
            .await?;
        Ok(reply)
    }

    async fn ensure_primed_locked(&self, user: &UserId, display_name: &str) -> Result<bool> {
        if self.store.history_exists(user).await? {
            return Ok(false);
        }

        let persona_text = self.persona.for_user(display_name)?;
        info!(user = %user, persona = %self.persona.name(), "🌱 新用户，执行人设预热");

        let messages = ContextWindow::empty().messages(&[], &persona_text);
        let reply = self.generate(messages).await?;
        self.store
            .append_exchange(user, Exchange::new(persona_text, reply))
            .await?;
        Ok(true)
    }

    /// 在日志里打印该用户的全部历史，返回条数
    pub async fn show_memory(&self, user: &UserId) -> Result<usize> {
        let history = self.store.get_history(user).await?;
        info!(user = %user, exchanges = history.len(), "🧠 用户记忆");
        for (i, exchange) in history.iter().enumerate() {
            info!("  [{i}] > {}", exchange.input);
            info!("  [{i}] < {}", exchange.output);
        }
        Ok(history.len())
    }

    /// `"{显示名}: {内容}"`，内容中 @ 机器人的标记替换为机器人显示名
    pub fn parse_message(&self, msg: &InboundMessage) -> String {
        format!(
            "{}: {}",
            msg.sender_display_name,
            self.config.bot.resolve_mentions(&msg.content)
        )
    }

    /// 去掉回复开头模型自己加上的称呼前缀
    pub fn parse_response(&self, response: &str) -> String {
        let mut text = response.trim();
        for prefix in &self.config.strip_prefixes {
            if let Some(rest) = text.strip_prefix(prefix.as_str()) {
                text = rest;
            }
        }
        let echo = format!("{}: ", self.config.bot.display_name);
        if let Some(rest) = text.strip_prefix(echo.as_str()) {
            text = rest;
        }
        text.trim().to_string()
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<String> {
        let raw = self.llm.chat_simple(messages).await.inspect_err(|e| {
            warn!("生成失败，本轮中止: {e}");
        })?;
        Ok(self.parse_response(&raw))
    }

    async fn user_lock(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user.clone()).or_default().clone()
    }

    /// 没有其他轮次在等这把锁时，从锁表中移除，锁表只保留活跃用户
    async fn release_user_lock(&self, user: &UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        // 锁表一份 + 本轮一份
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user);
        }
    }

    #[cfg(test)]
    async fn active_user_locks(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}

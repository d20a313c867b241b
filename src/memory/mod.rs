//! 对话记忆
//!
//! 每位用户一条按时间顺序追加的 [`Exchange`] 序列，整体保存在一个 JSON 文档里：
//!
//! ```json
//! {
//!   "1234567890": [
//!     { "input": "Pretend you are ...", "output": "heyy" },
//!     { "input": "bob: hi", "output": "hiii bob" }
//!   ]
//! }
//! ```
//!
//! | 实现 | 说明 |
//! |------|------|
//! | [`InMemoryHistoryStore`] | 进程内存，重启即清空，适合测试 |
//! | [`FileHistoryStore`] | 单文件 JSON，每次访问整读、每次修改整写 |
//!
//! 用户是否"已初始化"不单独保存，而是由 [`HistoryStore::history_exists`] 推导。

pub mod store;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use store::{FileHistoryStore, InMemoryHistoryStore};

/// 平台分配的用户标识，记忆文档的唯一 key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// 一轮完整对话：用户输入与模型回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub input: String,
    pub output: String,
}

impl Exchange {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// 持久化的完整文档：用户 → 对话序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryDocument {
    histories: BTreeMap<UserId, Vec<Exchange>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// 不存在的用户视为空历史
    pub fn history(&self, user: &UserId) -> &[Exchange] {
        self.histories.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn append(&mut self, user: &UserId, exchange: Exchange) {
        self.histories
            .entry(user.clone())
            .or_default()
            .push(exchange);
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.histories.keys()
    }

    pub fn user_count(&self) -> usize {
        self.histories.len()
    }

    pub fn exchange_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }
}

/// 持久化文档解析失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// 返回 [`StoreError::Decode`](crate::error::StoreError::Decode)，不写任何东西
    #[default]
    Fail,
    /// 重置为空文档并立即落盘（会丢弃已损坏的内容）
    ResetEmpty,
}

/// 对话记忆的统一存储接口
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 按时间顺序返回用户的全部对话；未知用户返回空列表
    async fn get_history(&self, user: &UserId) -> Result<Vec<Exchange>>;

    /// 追加一轮对话（整文档读-改-写，对同一文档互斥）
    async fn append_exchange(&self, user: &UserId, exchange: Exchange) -> Result<()>;

    /// 用户历史存在且非空
    async fn history_exists(&self, user: &UserId) -> Result<bool> {
        Ok(!self.get_history(user).await?.is_empty())
    }

    /// 文档中出现过的全部用户
    async fn users(&self) -> Result<Vec<UserId>>;
}

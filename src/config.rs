//! 应用配置
//!
//! 配置文件至少包含 `version` 与 `stream` 两项，其余字段均有默认值：
//!
//! ```json
//! {
//!   "version": "v0.3",
//!   "stream": true,
//!   "memory_path": "memory.json",
//!   "context_window": 100,
//!   "auto_approve_channels": ["1294309997194383442"]
//! }
//! ```
//!
//! 扩展名为 `.json` 时按 JSON 解析，否则按 YAML 解析（JSON 本身也是合法 YAML）。

use crate::error::{ConfigError, Result};
use crate::memory::DecodePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 审批通道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// 控制台 y/n
    #[default]
    Console,
    /// HTTP Webhook
    Webhook,
    /// 本地 WebSocket 服务器
    Websocket,
    /// 全部自动通过
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// 是否在日志中逐条输出收到的消息
    pub stream: bool,
    #[serde(default = "default_memory_path")]
    pub memory_path: String,
    /// 上下文窗口保留的最近轮次数
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default)]
    pub decode_policy: DecodePolicy,
    /// 内置人设名
    #[serde(default = "default_persona")]
    pub persona: String,
    /// 自定义人设模板文件，设置后优先于 `persona`
    #[serde(default)]
    pub persona_file: Option<String>,
    /// 机器人在对话中的显示名
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// 回复中需要去掉的自我称呼前缀
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,
    /// 这些频道的回复跳过人工审批直接发送
    #[serde(default)]
    pub auto_approve_channels: Vec<String>,
    /// `memory=false` 生成的轮次是否仍写入历史
    #[serde(default)]
    pub record_bypassed_turns: bool,
    /// 使用的模型（对应 `CHATBOT_MODEL_<ID>_MODEL` 的值）
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub approval: ApprovalMode,
    #[serde(default)]
    pub approval_url: Option<String>,
    #[serde(default = "default_approval_port")]
    pub approval_port: u16,
}

fn default_memory_path() -> String {
    "memory.json".to_string()
}

fn default_context_window() -> usize {
    100
}

fn default_persona() -> String {
    "alizey".to_string()
}

fn default_bot_name() -> String {
    "alizey".to_string()
}

fn default_strip_prefixes() -> Vec<String> {
    vec!["alizey.xoxo: ".to_string()]
}

fn default_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_approval_port() -> u16 {
    9000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config: Config = if is_json {
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?
        } else {
            serde_yaml::from_str(&raw)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.approval == ApprovalMode::Webhook && self.approval_url.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "approval_url".to_string(),
                message: "webhook 审批需要配置 approval_url".to_string(),
            }
            .into());
        }
        if self.bot_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "bot_name".to_string(),
                message: "不能为空".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(ext)
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_json_config_uses_defaults() {
        let file = write_config(".json", r#"{"version": "v1.0", "stream": true}"#);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.version, "v1.0");
        assert!(config.stream);
        assert_eq!(config.memory_path, "memory.json");
        assert_eq!(config.context_window, 100);
        assert_eq!(config.decode_policy, DecodePolicy::Fail);
        assert_eq!(config.approval, ApprovalMode::Console);
        assert!(!config.record_bypassed_turns);
        assert!(config.auto_approve_channels.is_empty());
    }

    #[test]
    fn test_yaml_config() {
        let file = write_config(
            ".yaml",
            "version: v2\nstream: false\ncontext_window: 8\ndecode_policy: reset_empty\nauto_approve_channels: [\"dev\"]\n",
        );
        let config = Config::load(file.path()).unwrap();

        assert!(!config.stream);
        assert_eq!(config.context_window, 8);
        assert_eq!(config.decode_policy, DecodePolicy::ResetEmpty);
        assert_eq!(config.auto_approve_channels, vec!["dev".to_string()]);
    }

    #[test]
    fn test_missing_required_field() {
        let file = write_config(".json", r#"{"version": "v1.0"}"#);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, crate::error::ChatError::Config(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_webhook_requires_url() {
        let file = write_config(
            ".json",
            r#"{"version": "v1.0", "stream": false, "approval": "webhook"}"#,
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, crate::error::ChatError::Config(ConfigError::FileNotFound(_))));
    }
}

use std::fmt;

/// mass-chatbot 的统一错误类型
#[derive(Debug)]
pub enum ChatError {
    /// 人设模板错误
    Template(TemplateError),
    /// 记忆存储错误
    Store(StoreError),
    /// LLM 相关错误
    Llm(LlmError),
    /// 配置错误
    Config(ConfigError),
    /// 人工审批通道失败
    Approval(String),
    /// 消息发送失败
    Channel(String),
    /// IO 错误
    Io(std::io::Error),
    /// 其他错误
    Other(String),
}

/// 人设模板错误
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// 模板中的占位符没有绑定值
    MissingBinding(String),
    /// `${` 没有对应的 `}`
    Unterminated { offset: usize },
    /// 未注册的人设名
    UnknownPersona(String),
}

/// 记忆存储错误
#[derive(Debug)]
pub enum StoreError {
    /// 持久化文档无法解析
    Decode { path: String, message: String },
    /// 文件读写失败
    Io(String),
    /// 序列化失败
    Serialization(String),
}

/// LLM 相关错误
#[derive(Debug)]
pub enum LlmError {
    /// 网络请求失败
    NetworkError(String),
    /// API 返回错误状态码
    ApiError { status: u16, message: String },
    /// 响应格式无效
    InvalidResponse(String),
    /// 没有返回内容
    EmptyResponse,
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 环境变量格式错误
    EnvFormatError(String),
    /// 模型配置缺少某一项
    MissingConfig(String, String),
    /// 找不到指定模型
    NotFindModelError(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Template(e) => write!(f, "Template Error: {}", e),
            ChatError::Store(e) => write!(f, "Store Error: {}", e),
            ChatError::Llm(e) => write!(f, "LLM Error: {}", e),
            ChatError::Config(e) => write!(f, "Config Error: {}", e),
            ChatError::Approval(msg) => write!(f, "Approval Error: {}", msg),
            ChatError::Channel(msg) => write!(f, "Channel Error: {}", msg),
            ChatError::Io(e) => write!(f, "IO Error: {}", e),
            ChatError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::MissingBinding(token) => {
                write!(f, "No binding for placeholder '${{{}}}'", token)
            }
            TemplateError::Unterminated { offset } => {
                write!(f, "Unterminated placeholder at byte {}", offset)
            }
            TemplateError::UnknownPersona(name) => write!(f, "Unknown persona '{}'", name),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Decode { path, message } => {
                write!(f, "Failed to decode memory document {}: {}", path, message)
            }
            StoreError::Io(msg) => write!(f, "IO error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LlmError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            LlmError::EmptyResponse => write!(f, "Empty response from LLM"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::EnvFormatError(key) => write!(f, "Malformed env variable: {}", key),
            ConfigError::MissingConfig(model, field) => {
                write!(f, "Model '{}' is missing '{}'", model, field)
            }
            ConfigError::NotFindModelError(model) => write!(f, "Model '{}' not configured", model),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Io(e) => Some(e),
            ChatError::Template(e) => Some(e),
            ChatError::Store(e) => Some(e),
            ChatError::Llm(e) => Some(e),
            ChatError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for TemplateError {}
impl std::error::Error for StoreError {}
impl std::error::Error for LlmError {}
impl std::error::Error for ConfigError {}

// From 转换实现
impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Io(err)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Llm(LlmError::NetworkError("Request timeout".to_string()))
        } else if err.is_connect() {
            ChatError::Llm(LlmError::NetworkError(format!(
                "Connection failed: {}",
                err
            )))
        } else {
            ChatError::Llm(LlmError::NetworkError(err.to_string()))
        }
    }
}

impl From<serde_yaml::Error> for ChatError {
    fn from(err: serde_yaml::Error) -> Self {
        ChatError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<TemplateError> for ChatError {
    fn from(err: TemplateError) -> Self {
        ChatError::Template(err)
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Store(err)
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        ChatError::Llm(err)
    }
}

impl From<ConfigError> for ChatError {
    fn from(err: ConfigError) -> Self {
        ChatError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, ChatError>;

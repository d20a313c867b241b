//! LLM 模型配置加载
//!
//! 从环境变量读取模型配置，格式：
//! ```text
//! CHATBOT_MODEL_<ID>_MODEL=llama3-8b-8192
//! CHATBOT_MODEL_<ID>_BASEURL=https://api.groq.com/openai/v1/chat/completions
//! CHATBOT_MODEL_<ID>_APIKEY=gsk_...
//! ```
//! `<ID>` 为自定义标识（如 `GROQ`、`LOCAL`），不区分大小写。
//!
//! 未配置任何模型但设置了 `GROQ_AUTH` 时，自动注册 Groq 的 `llama3-8b-8192`。

use crate::error::{ConfigError, Result};
use dotenv::dotenv;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

const PREFIX: &str = "CHATBOT_MODEL_";
const GROQ_AUTH: &str = "GROQ_AUTH";
const GROQ_BASEURL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GROQ_DEFAULT_MODEL: &str = "llama3-8b-8192";

/// 单个模型的连接配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    /// LLM 接口中使用的模型名
    pub model: String,
    /// Chat Completions 接口完整 URL
    pub baseurl: String,
    pub apikey: String,
}

/// 已加载的模型配置表（key = model 字段值）
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModelRegistry {
    pub models: HashMap<String, ModelConfig>,
}

impl ModelRegistry {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut model_configs: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut groq_key = None;
        for (key, value) in vars {
            if key == GROQ_AUTH {
                groq_key = Some(value);
                continue;
            }
            let Some(suffix) = key.strip_prefix(PREFIX) else {
                continue;
            };
            let Some((model_id, config_key)) = suffix.rsplit_once('_') else {
                return Err(ConfigError::EnvFormatError(key).into());
            };
            let config_key = config_key.to_lowercase();
            match config_key.as_str() {
                "model" | "baseurl" | "apikey" => {}
                _ => return Err(ConfigError::EnvFormatError(key).into()),
            }
            model_configs
                .entry(model_id.to_lowercase())
                .or_default()
                .insert(config_key, value);
        }

        let mut models = HashMap::new();
        for (model_id, mut config_map) in model_configs {
            let mut take = |field: &str| {
                config_map
                    .remove(field)
                    .ok_or_else(|| ConfigError::MissingConfig(model_id.clone(), field.to_string()))
            };
            let model = take("model")?;
            let baseurl = take("baseurl")?;
            let apikey = take("apikey")?;
            models.insert(
                model.clone(),
                ModelConfig {
                    model,
                    baseurl,
                    apikey,
                },
            );
        }

        if models.is_empty()
            && let Some(apikey) = groq_key
        {
            models.insert(
                GROQ_DEFAULT_MODEL.to_string(),
                ModelConfig {
                    model: GROQ_DEFAULT_MODEL.to_string(),
                    baseurl: GROQ_BASEURL.to_string(),
                    apikey,
                },
            );
        }

        Ok(Self { models })
    }

    pub fn get_model(&self, model: &str) -> Result<ModelConfig> {
        self.models
            .get(model)
            .cloned()
            .ok_or_else(|| ConfigError::NotFindModelError(model.to_string()).into())
    }
}

//! 人设模板
//!
//! 模板文本中使用 `${token}` 作为占位符。[`PersonalityTemplate`] 本身不可变，
//! [`PersonalityTemplate::instantiate`] 每次返回一个新字符串，
//! 不同用户之间永远看不到彼此的替换结果。

use crate::error::{Result, TemplateError};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// 占位符中表示用户名的 token
pub const NAME_TOKEN: &str = "name";

const ALIZEY: &str = "Pretend you are a girl named Alizey, talking to a user named ${name}. Your hobbies are: being a history nerd, reading novels, makeup, hanging out with friends, etc. All your responses from now on should be as how Alizey would talk. The messages from now on would represent a normal Discord chat. Make sure your responses are girly and in all lowercase letters. Do not talk about posting images or anything like that, because you cannot post images. Do not talk about being an AI. You are not an AI, you are Alizey.";

/// 不可变的人设模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalityTemplate {
    name: String,
    text: Arc<str>,
}

impl PersonalityTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Arc::from(text.into()),
        }
    }

    /// 从文件读取模板，人设名取文件名（不含扩展名）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom")
            .to_string();
        let template = Self::new(name, text.trim_end());
        // 提前暴露 `${` 未闭合之类的问题，而不是等到第一位用户到来
        template.placeholders()?;
        Ok(template)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 模板需要的全部 token（去重、排序）
    pub fn placeholders(&self) -> std::result::Result<BTreeSet<String>, TemplateError> {
        let mut tokens = BTreeSet::new();
        for segment in Segments::new(&self.text) {
            if let Segment::Token(token) = segment? {
                tokens.insert(token.to_string());
            }
        }
        Ok(tokens)
    }

    /// 用 `bindings` 替换所有占位符，返回新字符串；任何一个 token 没有绑定值都会失败
    pub fn instantiate(
        &self,
        bindings: &HashMap<&str, &str>,
    ) -> std::result::Result<String, TemplateError> {
        instantiate(&self.text, bindings)
    }

    /// 只绑定 `${name}` 的便捷方法
    pub fn for_user(&self, user_name: &str) -> std::result::Result<String, TemplateError> {
        self.instantiate(&HashMap::from([(NAME_TOKEN, user_name)]))
    }
}

/// 纯函数：替换 `template` 中的每个 `${token}`，不修改输入
pub fn instantiate(
    template: &str,
    bindings: &HashMap<&str, &str>,
) -> std::result::Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in Segments::new(template) {
        match segment? {
            Segment::Literal(text) => out.push_str(text),
            Segment::Token(token) => {
                let value = bindings
                    .get(token)
                    .ok_or_else(|| TemplateError::MissingBinding(token.to_string()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

enum Segment<'a> {
    Literal(&'a str),
    Token(&'a str),
}

struct Segments<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Segments<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = std::result::Result<Segment<'a>, TemplateError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return None;
        }
        match rest.find("${") {
            Some(0) => {
                let start = self.pos;
                let Some(end) = rest.find('}') else {
                    self.pos = self.src.len();
                    return Some(Err(TemplateError::Unterminated { offset: start }));
                };
                self.pos += end + 1;
                Some(Ok(Segment::Token(&rest[2..end])))
            }
            Some(idx) => {
                self.pos += idx;
                Some(Ok(Segment::Literal(&rest[..idx])))
            }
            None => {
                self.pos = self.src.len();
                Some(Ok(Segment::Literal(rest)))
            }
        }
    }
}

/// 按名称登记的人设集合，只对外提供不可变模板
#[derive(Debug, Clone)]
pub struct Personalities {
    templates: HashMap<String, PersonalityTemplate>,
}

impl Default for Personalities {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Personalities {
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// 内置人设
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(PersonalityTemplate::new("alizey", ALIZEY));
        registry
    }

    pub fn register(&mut self, template: PersonalityTemplate) {
        debug!(persona = %template.name(), "登记人设模板");
        self.templates
            .insert(template.name().to_lowercase(), template);
    }

    pub fn get(&self, name: &str) -> std::result::Result<PersonalityTemplate, TemplateError> {
        self.templates
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| TemplateError::UnknownPersona(name.to_string()))
    }
}

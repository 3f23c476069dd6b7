//! 语言解析（外部协作者）
//!
//! 建立会话时调用一次 resolve(原始文本) 得到语言标签；编排器把它当黑盒。

/// 语言解析器：原始文本 -> 语言标签（如 "en"）
pub trait LocaleResolver: Send + Sync {
    fn resolve(&self, raw_text: &str) -> String;
}

/// 固定语言
#[derive(Debug, Clone)]
pub struct FixedLocale(String);

impl FixedLocale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

impl Default for FixedLocale {
    fn default() -> Self {
        Self::new("en")
    }
}

impl LocaleResolver for FixedLocale {
    fn resolve(&self, _raw_text: &str) -> String {
        self.0.clone()
    }
}

impl<F> LocaleResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve(&self, raw_text: &str) -> String {
        self(raw_text)
    }
}

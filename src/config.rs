//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PARLEY__*` 覆盖（双下划线表示嵌套，如 `PARLEY__SERVICE__BASE_URL=http://...`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub service: ServiceSection,
    pub retry: RetrySection,
    pub conversation: ConversationSection,
}

/// [app] 段：应用名、场景目录文件、快照文件
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 场景模板 TOML；未设置时使用内置模板
    pub scenarios_file: Option<PathBuf>,
    /// 快照存储的 JSON 文件；设置后退出时写入、启动时读回
    pub snapshot_file: Option<PathBuf>,
}

/// [service] 段：对话服务地址与请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// 未设置时使用离线 Mock 服务
    pub base_url: Option<String>,
    /// 单次远端调用超时（秒），0 表示不设超时
    pub request_timeout_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl ServiceSection {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// [retry] 段：重试上限与线性退避基数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub rate_limited_base_ms: u64,
    pub server_error_base_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limited_base_ms: 800,
            server_error_base_ms: 400,
        }
    }
}

/// [conversation] 段：默认场景、语言、是否允许自动结束、是否自动建立会话
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    pub default_scenario: Option<String>,
    pub locale: String,
    pub allow_auto_end: bool,
    pub auto_start: bool,
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            default_scenario: None,
            locale: "en".to_string(),
            allow_auto_end: true,
            auto_start: true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 PARLEY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PARLEY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

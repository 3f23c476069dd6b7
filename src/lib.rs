//! Parley - 对话练习编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 过期守卫、重试策略、会话协调、轮次提交、状态快照、状态机与主控循环
//! - **dialogue**: 对话服务抽象与实现（HTTP / Mock）
//! - **locale**: 语言解析
//! - **scenario**: 场景与角色模板
//! - **ui**: Ratatui TUI 界面

pub mod config;
pub mod core;
pub mod dialogue;
pub mod locale;
pub mod scenario;
pub mod ui;

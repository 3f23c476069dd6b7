//! 对话构建器：统一的初始化逻辑
//!
//! TUI 与行模式 CLI 共用同一套服务选择、场景目录、快照存储与重试策略装配。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{
    ConversationHandle, ConversationOrchestrator, MachineSettings, OrchestratorSettings,
    RetryPolicy, StateSnapshotStore,
};
use crate::dialogue::{DialogueService, HttpDialogueService, MockDialogueService};
use crate::locale::{FixedLocale, LocaleResolver};
use crate::scenario::{ScenarioCatalog, ScenarioTemplate};

/// 根据配置选择对话服务：配置了 base_url 走 HTTP，否则离线 Mock
pub fn create_service_from_config(cfg: &AppConfig) -> Arc<dyn DialogueService> {
    match cfg.service.base_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            tracing::info!("Using dialogue service at {}", url);
            Arc::new(HttpDialogueService::new(url))
        }
        _ => {
            tracing::warn!("No service.base_url set, using offline mock dialogue service");
            Arc::new(MockDialogueService::new())
        }
    }
}

/// 构建器：持有配置、场景目录、服务与共享快照存储，按模板绑定对话
pub struct ConversationBuilder {
    config: AppConfig,
    catalog: ScenarioCatalog,
    service: Arc<dyn DialogueService>,
    store: StateSnapshotStore,
    locale: Arc<dyn LocaleResolver>,
}

impl ConversationBuilder {
    pub fn new(config: AppConfig, catalog: ScenarioCatalog) -> Self {
        let service = create_service_from_config(&config);
        let locale = Arc::new(FixedLocale::new(config.conversation.locale.clone()));
        Self {
            config,
            catalog,
            service,
            store: StateSnapshotStore::new(),
            locale,
        }
    }

    /// 替换对话服务（测试注入 Mock）
    pub fn with_service(mut self, service: Arc<dyn DialogueService>) -> Self {
        self.service = service;
        self
    }

    pub fn with_store(mut self, store: StateSnapshotStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_locale(mut self, locale: Arc<dyn LocaleResolver>) -> Self {
        self.locale = locale;
        self
    }

    /// 某个场景模板对应的状态机配置
    pub fn machine_settings(&self, template: &ScenarioTemplate) -> MachineSettings {
        MachineSettings::from_template(template)
            .with_policy(RetryPolicy::from_config(&self.config.retry))
            .with_locale(self.locale.clone())
            .with_allow_auto_end(self.config.conversation.allow_auto_end)
    }

    /// 绑定到模板对应的对话；存储中已有快照时恢复
    pub fn attach(&self, template: &ScenarioTemplate) -> ConversationHandle {
        tracing::info!(scenario = %template.id, persona = %template.persona.id, "Attaching conversation");
        ConversationOrchestrator::spawn(
            self.machine_settings(template),
            self.service.clone(),
            self.store.clone(),
            OrchestratorSettings::from_config(&self.config),
        )
    }

    /// 启动时选中的模板：conversation.default_scenario，找不到则取第一个
    pub fn initial_template(&self) -> Option<&ScenarioTemplate> {
        self.config
            .conversation
            .default_scenario
            .as_deref()
            .and_then(|id| {
                let found = self.catalog.get(id);
                if found.is_none() {
                    tracing::warn!("Unknown default scenario {}, falling back to first", id);
                }
                found
            })
            .or_else(|| self.catalog.templates().first())
    }

    /// 把快照存储写回 app.snapshot_file（未配置时不做任何事）
    pub fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.config.app.snapshot_file {
            self.store.save_to_file(path)?;
            tracing::info!("Saved {} conversation snapshot(s) to {}", self.store.len(), path.display());
        }
        Ok(())
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &StateSnapshotStore {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 便捷函数：加载配置、场景目录与快照文件后创建构建器
pub fn create_conversation_builder(config_path: Option<PathBuf>) -> anyhow::Result<ConversationBuilder> {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let catalog = match &config.app.scenarios_file {
        Some(path) => ScenarioCatalog::load(path)?,
        None => ScenarioCatalog::builtin(),
    };

    let store = match &config.app.snapshot_file {
        Some(path) if path.exists() => StateSnapshotStore::load_from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Snapshot file {} unreadable ({}), starting empty", path.display(), e);
            StateSnapshotStore::new()
        }),
        _ => StateSnapshotStore::new(),
    };

    Ok(ConversationBuilder::new(config, catalog).with_store(store))
}

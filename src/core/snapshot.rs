//! 状态快照存储
//!
//! 以 (场景, 角色) 为键的纯映射：save 无条件覆盖，load 返回最后一次写入，clear 删除。
//! 不是进程级单例：由调用方显式创建（new）与释放（teardown），克隆后共享同一份数据，
//! 以支持多个不同键的对话同时存在。每个键假定只有一个写入者。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::{ConversationKey, ConversationSnapshot};

#[derive(Clone, Debug, Default)]
pub struct StateSnapshotStore {
    inner: Arc<RwLock<HashMap<ConversationKey, ConversationSnapshot>>>,
}

impl StateSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, key: &ConversationKey, snapshot: ConversationSnapshot) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), snapshot);
    }

    pub fn load(&self, key: &ConversationKey) -> Option<ConversationSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn clear(&self, key: &ConversationKey) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 释放全部条目（生命周期结束）
    pub fn teardown(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 写入 JSON 文件；父目录不存在时自动创建
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries: Vec<SerEntry> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, snapshot)| SerEntry {
                key: key.clone(),
                snapshot: snapshot.clone(),
            })
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }

    /// 从 JSON 文件加载；文件不存在时返回空存储
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let entries: Vec<SerEntry> = serde_json::from_str(&data)?;
        let map = entries
            .into_iter()
            .map(|e| (e.key, e.snapshot))
            .collect::<HashMap<_, _>>();
        Ok(Self {
            inner: Arc::new(RwLock::new(map)),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SerEntry {
    key: ConversationKey,
    snapshot: ConversationSnapshot,
}

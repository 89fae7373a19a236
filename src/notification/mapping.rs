//! 通知 → 告警映射缓存 - 本地 JSON 文件持久化
//!
//! 跨页面重载保留的唯一状态。写入是尽力而为的：
//! 任何 IO 错误只记录日志，不影响调用方。

use anyhow::Result;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// 通知 ID → 关联实体 ID 的持久映射（last-write-wins）
#[derive(Debug)]
pub struct MappingCache {
    /// 持久化路径，`None` 表示仅内存
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, String>>,
}

impl MappingCache {
    /// 默认存储路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("notification-sync")
            .join("mappings.json")
    }

    /// 打开（或新建）指定路径的缓存
    ///
    /// 文件缺失或损坏时从空缓存开始
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load mapping cache, starting empty");
                HashMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "Mapping cache opened");
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// 仅内存的缓存（测试或无持久化场景）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 记录一条映射，相同通知 ID 的旧值被覆盖
    pub fn record(&self, notification_id: &str, entity_id: &str) {
        self.record_many([(notification_id, entity_id)]);
    }

    /// 批量记录，至多落盘一次；返回实际变化的条数
    pub fn record_many<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> usize {
        let (changed, snapshot) = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let mut changed = 0;
            for (notification_id, entity_id) in pairs {
                if entries.get(notification_id).map(String::as_str) == Some(entity_id) {
                    continue;
                }
                entries.insert(notification_id.to_string(), entity_id.to_string());
                changed += 1;
            }
            if changed == 0 {
                return 0;
            }
            (changed, entries.clone())
        };

        if let Some(path) = &self.path {
            if let Err(e) = Self::persist(path, &snapshot) {
                warn!(path = %path.display(), error = %e, "Failed to persist mapping cache");
            }
        }
        changed
    }

    /// 查询映射
    pub fn get(&self, notification_id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(notification_id)
            .cloned()
    }

    /// 全部映射（按通知 ID 排序）
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort();
        all
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(path: &Path) -> Result<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let mut file = File::open(path)?;
        FileExt::lock_shared(&file)?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        FileExt::unlock(&file)?;
        read?;

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// 写入临时文件后原子替换
    fn persist(path: &Path, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // 锁文件保证多个进程不会交错写入
        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&lock)?;

        let temp_path = path.with_extension("tmp");
        let result = (|| -> Result<()> {
            let mut temp_file = File::create(&temp_path)?;
            writeln!(temp_file, "{}", serde_json::to_string(entries)?)?;
            temp_file.sync_all()?;
            fs::rename(&temp_path, path)?;
            Ok(())
        })();

        FileExt::unlock(&lock)?;
        result
    }
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::open(Self::default_path())
    }
}

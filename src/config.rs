//! 配置加载
//!
//! 读取优先级（后者覆盖前者）：
//! 1. 配置文件 `~/.config/notification-sync/config.json`（JSON，所有字段可选）
//! 2. 环境变量 `NSYNC_API_URL` / `NSYNC_PUSH_URL` / `NSYNC_TOKEN` / `NSYNC_USER_ID` / `NSYNC_USER_TYPE`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::notification::{AuthSession, MappingCache, PushConfig, RateLimitGuard};

/// 默认 REST 地址
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// 默认推送地址
pub const DEFAULT_PUSH_URL: &str = "ws://localhost:5000/ws";

/// 默认请求超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// 默认重连间隔（秒）
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// 同步配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// REST 基础地址
    pub api_base_url: String,
    /// WebSocket 推送地址
    pub push_url: String,
    /// 会话 token
    pub token: Option<String>,
    /// 当前用户 ID
    pub user_id: Option<String>,
    /// 当前用户类型
    pub user_type: Option<String>,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 推送重连间隔（秒）
    pub reconnect_delay_secs: u64,
    /// 限流熔断冷却时间（秒），不设置则整个会话有效
    pub rate_limit_cooldown_secs: Option<u64>,
    /// 映射缓存文件路径
    pub mapping_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            token: None,
            user_id: None,
            user_type: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            rate_limit_cooldown_secs: None,
            mapping_path: None,
        }
    }
}

impl SyncConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("notification-sync")
            .join("config.json")
    }

    /// 从默认路径和环境变量加载
    pub fn auto_load() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    /// 指定了路径就用指定的，否则用默认路径
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::auto_load(),
        }
    }

    /// 从指定路径和环境变量加载
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 只读取配置文件；文件不存在时返回默认配置
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// 用环境变量覆盖，空值忽略
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NSYNC_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = get("NSYNC_PUSH_URL") {
            self.push_url = url;
        }
        if let Some(token) = get("NSYNC_TOKEN") {
            self.token = Some(token);
        }
        if let Some(user_id) = get("NSYNC_USER_ID") {
            self.user_id = Some(user_id);
        }
        if let Some(user_type) = get("NSYNC_USER_TYPE") {
            self.user_type = Some(user_type);
        }
    }

    /// 配置中的会话，token 或用户 ID 缺失时为 `None`
    pub fn session(&self) -> Option<AuthSession> {
        let session = AuthSession {
            token: self.token.clone()?,
            user_id: self.user_id.clone()?,
            user_type: self.user_type.clone(),
        };
        session.is_valid().then_some(session)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn push_config(&self) -> PushConfig {
        PushConfig {
            url: self.push_url.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }

    pub fn rate_limit_guard(&self) -> RateLimitGuard {
        match self.rate_limit_cooldown_secs {
            Some(secs) => RateLimitGuard::with_cooldown(Duration::from_secs(secs)),
            None => RateLimitGuard::new(),
        }
    }

    pub fn mapping_cache(&self) -> MappingCache {
        match &self.mapping_path {
            Some(path) => MappingCache::open(path),
            None => MappingCache::default(),
        }
    }
}

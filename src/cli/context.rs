// src/cli/context.rs
//! 命令共享的运行上下文：配置、工作集与同步门面

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::notification::{HttpNotificationApi, NotificationStore, NotificationSync};

pub struct SyncContext {
    pub config: SyncConfig,
    pub store: Arc<NotificationStore>,
    pub sync: NotificationSync,
}

impl SyncContext {
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let store = Arc::new(NotificationStore::new(
            config.mapping_cache(),
            config.rate_limit_guard(),
        ));
        let api = HttpNotificationApi::new(config.api_base_url.clone(), config.timeout())?;
        store.set_session(config.session());
        debug!(api = %config.api_base_url, has_session = store.session().is_some(), "Context ready");

        let sync = NotificationSync::new(store.clone(), Arc::new(api));
        Ok(Self {
            config,
            store,
            sync,
        })
    }

    /// 需要网络的命令必须有会话
    pub fn require_session(&self) -> Result<()> {
        if self.store.session().is_none() {
            return Err(anyhow!(
                "未配置会话\n请设置 NSYNC_TOKEN 和 NSYNC_USER_ID，或在 {} 中配置 token / user_id",
                SyncConfig::default_path().display()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SyncConfig {
        SyncConfig {
            mapping_path: Some(dir.path().join("mappings.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_context_without_session() {
        let dir = TempDir::new().unwrap();
        let ctx = SyncContext::from_config(config_in(&dir)).unwrap();
        assert!(ctx.store.session().is_none());
        assert!(ctx.require_session().is_err());
    }

    #[test]
    fn test_context_with_session() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig {
            token: Some("t".to_string()),
            user_id: Some("u1".to_string()),
            ..config_in(&dir)
        };
        let ctx = SyncContext::from_config(config).unwrap();
        assert_eq!(ctx.store.session().unwrap().user_id, "u1");
        assert!(ctx.require_session().is_ok());
    }

    #[test]
    fn test_invalid_api_url() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig {
            api_base_url: "not a url".to_string(),
            ..config_in(&dir)
        };
        assert!(SyncContext::from_config(config).is_err());
    }
}

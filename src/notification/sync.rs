//! 同步门面 - 拉取、标记已读、用户名补全的统一入口
//!
//! 所有异步操作都在自身边界内消化错误：返回结果枚举并记录日志，不向调用方抛错。
//! 绑定在界面上的请求接受 `CancellationToken`，界面卸载后结果被丢弃。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::NotificationApi;
use super::merge::MergeReport;
use super::payload::Notification;
use super::rate_limit::EndpointClass;
use super::read_state::{MarkReadOutcome, ReadStateSynchronizer};
use super::store::NotificationStore;

/// 拉取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 已合并到工作集
    Merged(MergeReport),
    /// 未登录，未发请求
    NoSession,
    /// 接口已熔断，未发请求
    Suppressed,
    /// 界面已卸载，结果被丢弃
    Cancelled,
    /// 请求期间切换了会话，结果被丢弃
    Stale,
    /// 请求失败，工作集保持不变
    Failed(String),
}

/// 同步门面
pub struct NotificationSync {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApi>,
    reads: ReadStateSynchronizer,
    /// 用户 ID -> 显示名（查询过但没有名字的记为 None）
    profiles: Mutex<HashMap<String, Option<String>>>,
}

impl NotificationSync {
    pub fn new(store: Arc<NotificationStore>, api: Arc<dyn NotificationApi>) -> Self {
        let reads = ReadStateSynchronizer::new(store.clone(), api.clone());
        Self {
            store,
            api,
            reads,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    pub fn reads(&self) -> &ReadStateSynchronizer {
        &self.reads
    }

    /// 拉取未读通知并合并
    pub async fn refresh(&self, cancel: &CancellationToken) -> FetchOutcome {
        let Some(session) = self.store.session() else {
            debug!("No session, skipping notification fetch");
            return FetchOutcome::NoSession;
        };
        let guard = self.store.guard();
        if !guard.should_attempt(EndpointClass::NotificationFetch) {
            return FetchOutcome::Suppressed;
        }

        let generation = self.store.generation();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Notification fetch cancelled");
                return FetchOutcome::Cancelled;
            }
            result = self.api.fetch_notifications(&session) => result,
        };
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        match result {
            Ok(response) => {
                let fetched = response.notifications.len();
                match self.store.apply_fetch_for(
                    Some(generation),
                    response.notifications,
                    response.unread_count,
                ) {
                    Some(report) => {
                        info!(fetched, unread = self.store.unread_count(), "Notifications fetched");
                        FetchOutcome::Merged(report)
                    }
                    None => FetchOutcome::Stale,
                }
            }
            Err(e) => {
                if e.is_throttled() {
                    guard.record_throttled(EndpointClass::NotificationFetch);
                }
                warn!(error = %e, "Notification fetch failed");
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    /// 标记已读
    pub async fn mark_read(&self, identity: &str) -> MarkReadOutcome {
        self.reads.mark_read(identity).await
    }

    /// 全部标记已读
    pub async fn mark_all_read(&self) -> Vec<(String, MarkReadOutcome)> {
        self.reads.mark_all_read().await
    }

    /// 发送者显示名：payload 自带的优先，否则按发送者 ID 查询用户
    pub async fn display_name(
        &self,
        notification: &Notification,
        cancel: &CancellationToken,
    ) -> Option<String> {
        if let Some(name) = notification.sender_name() {
            return Some(name);
        }
        let user_id = notification.sender_id()?;

        if let Some(cached) = self.lock_profiles().get(&user_id) {
            return cached.clone();
        }

        let session = self.store.session()?;
        let guard = self.store.guard();
        if !guard.should_attempt(EndpointClass::UserLookup) {
            return None;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(user_id = %user_id, "User lookup cancelled");
                return None;
            }
            result = self.api.fetch_user(&session, &user_id) => result,
        };

        match result {
            Ok(profile) => {
                self.lock_profiles()
                    .insert(user_id, profile.display_name.clone());
                profile.display_name
            }
            Err(e) => {
                if e.is_throttled() {
                    guard.record_throttled(EndpointClass::UserLookup);
                }
                warn!(user_id = %user_id, error = %e, "User lookup failed");
                None
            }
        }
    }

    fn lock_profiles(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<String>>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

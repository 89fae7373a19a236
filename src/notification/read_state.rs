//! 已读同步 - 标记已读的乐观更新与服务端确认
//!
//! ## 状态机
//! ```text
//! Unread --begin--> Pending --commit 成功--> Removed
//!                   Pending --commit 失败--> Unread
//! ```
//! `begin` 同步完成：立即从工作集移除、未读数减一并广播，不等待网络。
//! 失败时不把通知放回界面，只把账本恢复为 Unread，之后的拉取可以重新带回它。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::api::NotificationApi;
use super::bus::SyncEvent;
use super::identity;
use super::rate_limit::EndpointClass;
use super::store::NotificationStore;

/// 单条通知的已读状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadState {
    Unread,
    /// 已乐观移除，等待服务端确认
    Pending,
    /// 服务端已确认（或无会话时本地视为已读）
    Removed,
}

/// 标记已读的结果，都不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MarkReadOutcome {
    /// 工作集中没有该通知（重复调用等）
    NotFound,
    /// 无会话，只在本地移除
    LocalOnly { unread_count: u64 },
    /// 接口已被限流熔断，未发请求
    Suppressed { unread_count: u64 },
    /// 服务端确认
    Confirmed { unread_count: u64 },
    /// 请求失败，本地移除仍然生效
    Failed { unread_count: u64, reason: String },
}

/// `begin` 之后等待提交的已读操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
    pub identity: String,
    /// 深链目标
    pub related_entity_id: Option<String>,
    /// 乐观计算的未读数
    pub optimistic_count: u64,
    generation: u64,
}

/// 已读同步器
pub struct ReadStateSynchronizer {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApi>,
}

impl ReadStateSynchronizer {
    pub fn new(store: Arc<NotificationStore>, api: Arc<dyn NotificationApi>) -> Self {
        Self { store, api }
    }

    /// 深链目标：优先取通知自身字段，其次查映射缓存
    pub fn deep_link_target(&self, identity: &str) -> Option<String> {
        self.store
            .find(identity)
            .and_then(|n| n.related_entity_id)
            .or_else(|| self.store.mappings().get(identity))
    }

    /// 乐观移除并广播，不等待网络
    ///
    /// 工作集中没有该通知时返回 `None`
    pub fn begin(&self, identity: &str) -> Option<PendingRead> {
        let (notification, count, generation) = self.store.take_for_read(identity)?;
        let related_entity_id = notification
            .related_entity_id
            .clone()
            .or_else(|| self.store.mappings().get(identity));

        debug!(identity = %identity, unread = count, "Notification removed optimistically");
        self.store.bus().publish(&SyncEvent::NotificationRead {
            identity: identity.to_string(),
            related_entity_id: related_entity_id.clone(),
        });
        self.store
            .bus()
            .publish(&SyncEvent::UnreadCountChanged { count });

        Some(PendingRead {
            identity: identity.to_string(),
            related_entity_id,
            optimistic_count: count,
            generation,
        })
    }

    /// 与服务端确认
    pub async fn commit(&self, pending: PendingRead) -> MarkReadOutcome {
        let PendingRead {
            identity,
            optimistic_count,
            generation,
            ..
        } = pending;

        let Some(session) = self.store.session() else {
            debug!(identity = %identity, "No session, marking read locally");
            self.store.settle_read(generation, &identity, ReadState::Removed);
            return MarkReadOutcome::LocalOnly {
                unread_count: optimistic_count,
            };
        };

        let guard = self.store.guard();
        if !guard.should_attempt(EndpointClass::MarkRead) {
            self.store.settle_read(generation, &identity, ReadState::Unread);
            return MarkReadOutcome::Suppressed {
                unread_count: optimistic_count,
            };
        }

        match self.api.mark_read(&session, &identity).await {
            Ok(response) => {
                self.store.settle_read(generation, &identity, ReadState::Removed);

                if let Some(alert_id) = &response.alert_id {
                    if response.notification_id.as_deref().is_some_and(|id| id != identity) {
                        debug!(
                            identity = %identity,
                            response_id = ?response.notification_id,
                            "Mark read response names a different id, keeping local identity"
                        );
                    }
                    self.store.mappings().record(&identity, alert_id);
                }

                let unread_count = match response.unread_count {
                    Some(count) => {
                        if self.store.set_count_for(generation, count) {
                            self.store
                                .bus()
                                .publish(&SyncEvent::UnreadCountChanged { count });
                        }
                        count
                    }
                    None => optimistic_count,
                };

                info!(identity = %identity, unread = unread_count, "Notification marked read");
                MarkReadOutcome::Confirmed { unread_count }
            }
            Err(e) => {
                if e.is_throttled() {
                    guard.record_throttled(EndpointClass::MarkRead);
                }
                warn!(identity = %identity, error = %e, "Mark read failed, keeping local removal");
                self.store.settle_read(generation, &identity, ReadState::Unread);
                MarkReadOutcome::Failed {
                    unread_count: optimistic_count,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 标记已读（begin + commit）
    pub async fn mark_read(&self, identity: &str) -> MarkReadOutcome {
        match self.begin(identity) {
            Some(pending) => self.commit(pending).await,
            None => {
                debug!(identity = %identity, "Mark read on unknown notification, no-op");
                MarkReadOutcome::NotFound
            }
        }
    }

    /// 以原始 payload 标记已读，身份按 `identity::resolve_identity` 解析
    pub async fn mark_read_payload(&self, payload: &Value) -> MarkReadOutcome {
        match identity::resolve_identity(payload) {
            Some(id) => self.mark_read(&id).await,
            None => MarkReadOutcome::NotFound,
        }
    }

    /// 全部标记已读，按工作集顺序逐条处理
    pub async fn mark_all_read(&self) -> Vec<(String, MarkReadOutcome)> {
        let identities: Vec<String> = self
            .store
            .snapshot()
            .into_iter()
            .map(|n| n.identity)
            .collect();

        let mut outcomes = Vec::with_capacity(identities.len());
        for identity in identities {
            let outcome = self.mark_read(&identity).await;
            outcomes.push((identity, outcome));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SyncError, SyncResult};
    use crate::notification::api::{FetchResponse, MarkReadResponse, UserProfile};
    use crate::notification::bus::Topic;
    use crate::notification::session::AuthSession;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 按预设脚本返回 mark_read 结果
    struct ScriptedApi {
        mark_read_calls: AtomicUsize,
        responses: Mutex<Vec<SyncResult<MarkReadResponse>>>,
    }

    impl ScriptedApi {
        fn new(responses: Vec<SyncResult<MarkReadResponse>>) -> Arc<Self> {
            Arc::new(Self {
                mark_read_calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> usize {
            self.mark_read_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationApi for ScriptedApi {
        async fn fetch_notifications(&self, _: &AuthSession) -> SyncResult<FetchResponse> {
            Ok(FetchResponse::default())
        }

        async fn mark_read(&self, _: &AuthSession, _: &str) -> SyncResult<MarkReadResponse> {
            self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(MarkReadResponse::default())
            } else {
                responses.remove(0)
            }
        }

        async fn fetch_user(&self, _: &AuthSession, id: &str) -> SyncResult<UserProfile> {
            Ok(UserProfile {
                id: id.to_string(),
                display_name: None,
            })
        }
    }

    fn setup(api: Arc<ScriptedApi>) -> (Arc<NotificationStore>, ReadStateSynchronizer) {
        let store = Arc::new(NotificationStore::in_memory());
        store.set_session(Some(AuthSession::new("tok", "u1")));
        store.apply_fetch(
            vec![
                json!({"id": "n1", "alertId": "a1"}),
                json!({"id": "n2"}),
                json!({"id": "n3"}),
            ],
            None,
        );
        let sync = ReadStateSynchronizer::new(store.clone(), api);
        (store, sync)
    }

    #[tokio::test]
    async fn test_begin_removes_synchronously() {
        let api = ScriptedApi::new(vec![Err(SyncError::Status(500))]);
        let (store, sync) = setup(api.clone());

        let pending = sync.begin("n2").unwrap();
        // 网络请求尚未发出，界面已看不到该通知
        assert!(store.find("n2").is_none());
        assert_eq!(store.unread_count(), 2);
        assert_eq!(store.read_state("n2"), ReadState::Pending);
        assert_eq!(api.calls(), 0);

        let outcome = sync.commit(pending).await;
        assert!(matches!(outcome, MarkReadOutcome::Failed { unread_count: 2, .. }));
        assert!(store.find("n2").is_none());
        assert_eq!(store.read_state("n2"), ReadState::Unread);
    }

    #[tokio::test]
    async fn test_server_count_is_adopted() {
        let api = ScriptedApi::new(vec![Ok(MarkReadResponse {
            unread_count: Some(7),
            notification_id: Some("n1".to_string()),
            alert_id: Some("a9".to_string()),
        })]);
        let (store, sync) = setup(api);

        let outcome = sync.mark_read("n1").await;
        assert_eq!(outcome, MarkReadOutcome::Confirmed { unread_count: 7 });
        assert_eq!(store.unread_count(), 7);
        assert_eq!(store.read_state("n1"), ReadState::Removed);
        assert_eq!(store.mappings().get("n1"), Some("a9".to_string()));
    }

    #[tokio::test]
    async fn test_mapping_recorded_under_local_identity() {
        let api = ScriptedApi::new(vec![Ok(MarkReadResponse::from_value(&json!({
            "notificationId": "n9",
            "recipientId": "r1",
            "alertId": "a1"
        })))]);
        let (store, sync) = setup(api);
        store.apply_push(json!({"recipientId": "r1", "notificationId": "n9"}), None);

        let outcome = sync.mark_read("r1").await;
        assert!(matches!(outcome, MarkReadOutcome::Confirmed { .. }));
        assert_eq!(store.mappings().get("r1"), Some("a1".to_string()));
        assert_eq!(store.mappings().get("n9"), None);
        assert_eq!(sync.deep_link_target("r1"), Some("a1".to_string()));
    }

    #[tokio::test]
    async fn test_local_decrement_without_server_count() {
        let api = ScriptedApi::new(vec![]);
        let (store, sync) = setup(api);

        assert_eq!(sync.mark_read("n3").await, MarkReadOutcome::Confirmed { unread_count: 2 });
        assert_eq!(store.unread_count(), 2);
    }

    #[tokio::test]
    async fn test_second_mark_read_is_noop() {
        let api = ScriptedApi::new(vec![Err(SyncError::Status(504))]);
        let (store, sync) = setup(api.clone());

        sync.mark_read("n1").await;
        assert_eq!(sync.mark_read("n1").await, MarkReadOutcome::NotFound);
        assert_eq!(api.calls(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_no_session_skips_network() {
        let api = ScriptedApi::new(vec![]);
        // 登出会清空工作集，这里直接构造无会话的 store
        let store = Arc::new(NotificationStore::in_memory());
        store.apply_fetch(vec![json!({"id": "x"})], None);
        let sync = ReadStateSynchronizer::new(store.clone(), api.clone());

        assert_eq!(
            sync.mark_read("x").await,
            MarkReadOutcome::LocalOnly { unread_count: 0 }
        );
        assert_eq!(store.read_state("x"), ReadState::Removed);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_throttle_trips_guard_and_suppresses() {
        let api = ScriptedApi::new(vec![Err(SyncError::Throttled)]);
        let (store, sync) = setup(api.clone());

        assert!(matches!(sync.mark_read("n1").await, MarkReadOutcome::Failed { .. }));
        assert!(store.guard().is_tripped(EndpointClass::MarkRead));

        assert_eq!(
            sync.mark_read("n2").await,
            MarkReadOutcome::Suppressed { unread_count: 1 }
        );
        assert_eq!(api.calls(), 1);
        assert!(store.find("n2").is_none());
    }

    #[tokio::test]
    async fn test_events_published_on_begin() {
        let api = ScriptedApi::new(vec![]);
        let (store, sync) = setup(api);
        let (_read_sub, mut read_rx) = store.bus().subscribe_channel(Topic::NotificationRead);
        let (_count_sub, mut count_rx) = store.bus().subscribe_channel(Topic::UnreadCountChanged);

        sync.begin("n1").unwrap();
        assert_eq!(
            read_rx.try_recv().unwrap(),
            SyncEvent::NotificationRead {
                identity: "n1".to_string(),
                related_entity_id: Some("a1".to_string())
            }
        );
        assert_eq!(
            count_rx.try_recv().unwrap(),
            SyncEvent::UnreadCountChanged { count: 2 }
        );
    }

    #[tokio::test]
    async fn test_deep_link_falls_back_to_mapping_cache() {
        let api = ScriptedApi::new(vec![]);
        let (store, sync) = setup(api);
        store.mappings().record("n2", "a2");

        assert_eq!(sync.deep_link_target("n1"), Some("a1".to_string()));
        assert_eq!(sync.deep_link_target("n2"), Some("a2".to_string()));
        assert_eq!(sync.deep_link_target("missing"), None);
    }

    #[tokio::test]
    async fn test_mark_read_payload_resolves_identity() {
        let api = ScriptedApi::new(vec![]);
        let (store, sync) = setup(api);

        let outcome = sync.mark_read_payload(&json!({"recipientId": "n2", "title": "x"})).await;
        assert!(matches!(outcome, MarkReadOutcome::Confirmed { .. }));
        assert!(store.find("n2").is_none());
        assert_eq!(sync.mark_read_payload(&json!({"title": "x"})).await, MarkReadOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let api = ScriptedApi::new(vec![]);
        let (store, sync) = setup(api.clone());

        let outcomes = sync.mark_all_read().await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].0, "n1");
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
        assert_eq!(api.calls(), 3);
    }
}

//! 同步流程集成测试 - 拉取、推送、标记已读与多界面一致性

use async_trait::async_trait;
use notification_sync::error::{SyncError, SyncResult};
use notification_sync::notification::api::{FetchResponse, MarkReadResponse, UserProfile};
use notification_sync::notification::{
    AuthSession, FetchOutcome, MappingCache, MarkReadOutcome, Notification, NotificationApi,
    NotificationStore, NotificationSync, PushApplied, RateLimitGuard, ReadState, Surface,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// 按顺序返回预设结果的 API，队列为空时返回成功的空响应
#[derive(Default)]
struct MockApi {
    fetches: Mutex<VecDeque<SyncResult<FetchResponse>>>,
    mark_reads: Mutex<VecDeque<SyncResult<MarkReadResponse>>>,
    users: Mutex<VecDeque<SyncResult<UserProfile>>>,
    fetch_calls: AtomicUsize,
    mark_read_calls: AtomicUsize,
    user_calls: AtomicUsize,
}

impl MockApi {
    fn with_fetch(self, response: SyncResult<FetchResponse>) -> Self {
        self.fetches.lock().unwrap().push_back(response);
        self
    }

    fn with_mark_read(self, response: SyncResult<MarkReadResponse>) -> Self {
        self.mark_reads.lock().unwrap().push_back(response);
        self
    }

    fn with_user(self, response: SyncResult<UserProfile>) -> Self {
        self.users.lock().unwrap().push_back(response);
        self
    }
}

#[async_trait]
impl NotificationApi for MockApi {
    async fn fetch_notifications(&self, _session: &AuthSession) -> SyncResult<FetchResponse> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResponse::default()))
    }

    async fn mark_read(
        &self,
        _session: &AuthSession,
        _identity: &str,
    ) -> SyncResult<MarkReadResponse> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.mark_reads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(MarkReadResponse::default()))
    }

    async fn fetch_user(&self, _session: &AuthSession, user_id: &str) -> SyncResult<UserProfile> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.users.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(UserProfile {
                id: user_id.to_string(),
                display_name: None,
            })
        })
    }
}

fn fetched(items: serde_json::Value, unread_count: Option<u64>) -> SyncResult<FetchResponse> {
    Ok(FetchResponse {
        notifications: items.as_array().cloned().unwrap_or_default(),
        unread_count,
    })
}

fn setup(api: MockApi) -> (Arc<NotificationStore>, Arc<MockApi>, NotificationSync) {
    let store = Arc::new(NotificationStore::in_memory());
    store.set_session(Some(AuthSession::new("token", "user-1").with_user_type("buyer")));
    let api = Arc::new(api);
    let sync = NotificationSync::new(store.clone(), api.clone());
    (store, api, sync)
}

#[tokio::test]
async fn test_fetch_deduplicates_across_field_names() {
    let api = MockApi::default().with_fetch(fetched(
        json!([{"recipientId": "r1", "title": "A"}, {"id": "r1", "title": "A"}]),
        None,
    ));
    let (store, _api, sync) = setup(api);

    let outcome = sync.refresh(&CancellationToken::new()).await;
    assert!(matches!(outcome, FetchOutcome::Merged(_)));
    assert_eq!(store.len(), 1);
    assert_eq!(store.unread_count(), 1);
}

#[tokio::test]
async fn test_push_replaces_fetched_notification() {
    let api = MockApi::default().with_fetch(fetched(
        json!([{"id": "r1", "message": "old"}, {"id": "r2"}]),
        Some(2),
    ));
    let (store, _api, sync) = setup(api);
    sync.refresh(&CancellationToken::new()).await;

    let applied = store.apply_push(json!({"recipient_id": "r1", "message": "new"}), None);
    assert_eq!(applied, PushApplied::Replaced);
    assert_eq!(store.len(), 2);
    assert_eq!(store.unread_count(), 2);
    assert_eq!(store.find("r1").unwrap().message, "new");
}

#[tokio::test]
async fn test_mark_read_failure_keeps_optimistic_removal() {
    let api = MockApi::default()
        .with_fetch(fetched(json!([{"id": "n1"}, {"id": "n2"}]), Some(2)))
        .with_mark_read(Err(SyncError::Status(504)));
    let (store, api, sync) = setup(api);
    sync.refresh(&CancellationToken::new()).await;

    let popup = Surface::mount("popup", &store);
    let outcome = sync.mark_read("n1").await;
    assert!(matches!(outcome, MarkReadOutcome::Failed { unread_count: 1, .. }));
    assert_eq!(popup.identities(), vec!["n2"]);
    assert_eq!(popup.unread_count(), 1);
    assert_eq!(store.read_state("n1"), ReadState::Unread);

    // 重试找不到可移除的项
    assert_eq!(sync.mark_read("n1").await, MarkReadOutcome::NotFound);
    assert_eq!(api.mark_read_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_read_comes_back_on_next_fetch() {
    let api = MockApi::default()
        .with_fetch(fetched(json!([{"id": "n1"}]), None))
        .with_mark_read(Err(SyncError::Status(500)))
        .with_fetch(fetched(json!([{"id": "n1"}]), None));
    let (store, _api, sync) = setup(api);
    let cancel = CancellationToken::new();

    sync.refresh(&cancel).await;
    sync.mark_read("n1").await;
    assert!(store.is_empty());

    sync.refresh(&cancel).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_user_lookup_throttle_is_per_class() {
    let api = MockApi::default()
        .with_user(Err(SyncError::Throttled))
        .with_user(Err(SyncError::Throttled));
    let (store, api, sync) = setup(api);
    let cancel = CancellationToken::new();

    let from_u1 = Notification::from_value(json!({"id": "n1", "senderId": "u1"}));
    let from_u2 = Notification::from_value(json!({"id": "n2", "senderId": "u2"}));

    assert_eq!(sync.display_name(&from_u1, &cancel).await, None);
    assert_eq!(sync.display_name(&from_u2, &cancel).await, None);
    assert_eq!(api.user_calls.load(Ordering::SeqCst), 1);

    // 其它接口类别不受影响
    assert!(matches!(sync.refresh(&cancel).await, FetchOutcome::Merged(_)));
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
    assert!(store.guard().is_tripped(notification_sync::notification::EndpointClass::UserLookup));
}

#[tokio::test]
async fn test_display_name_prefers_payload_and_caches_lookup() {
    let api = MockApi::default().with_user(Ok(UserProfile {
        id: "u9".to_string(),
        display_name: Some("Ana".to_string()),
    }));
    let (_store, api, sync) = setup(api);
    let cancel = CancellationToken::new();

    let named = Notification::from_value(json!({"id": "n1", "senderName": "Bo", "senderId": "u9"}));
    assert_eq!(sync.display_name(&named, &cancel).await.as_deref(), Some("Bo"));
    assert_eq!(api.user_calls.load(Ordering::SeqCst), 0);

    let unnamed = Notification::from_value(json!({"id": "n2", "userId": "u9"}));
    assert_eq!(sync.display_name(&unnamed, &cancel).await.as_deref(), Some("Ana"));
    assert_eq!(sync.display_name(&unnamed, &cancel).await.as_deref(), Some("Ana"));
    assert_eq!(api.user_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_surfaces_stay_consistent() {
    let api = MockApi::default()
        .with_fetch(fetched(json!([{"id": "a"}, {"id": "b"}, {"id": "c"}]), Some(3)))
        .with_mark_read(Ok(MarkReadResponse {
            unread_count: Some(5),
            ..Default::default()
        }));
    let (store, _api, sync) = setup(api);

    let popup = Surface::mount("popup", &store);
    let page = Surface::mount("page", &store);
    sync.refresh(&popup.cancel_token()).await;
    store.apply_push(json!({"id": "d"}), None);

    let outcome = sync.mark_read("b").await;
    assert_eq!(outcome, MarkReadOutcome::Confirmed { unread_count: 5 });

    for surface in [&popup, &page] {
        assert_eq!(surface.identities(), vec!["d", "a", "c"]);
        assert_eq!(surface.unread_count(), 5);
    }
    assert_eq!(store.unread_count(), 5);

    // 卸载一个界面不影响另一个
    popup.unmount();
    store.apply_push(json!({"id": "e"}), Some(6));
    assert_eq!(page.identities(), vec!["e", "d", "a", "c"]);
    assert_eq!(page.unread_count(), 6);
}

#[tokio::test]
async fn test_push_after_read_is_ignored() {
    let api = MockApi::default().with_fetch(fetched(json!([{"id": "n1"}]), None));
    let (store, _api, sync) = setup(api);
    sync.refresh(&CancellationToken::new()).await;

    assert!(matches!(
        sync.mark_read("n1").await,
        MarkReadOutcome::Confirmed { .. }
    ));
    assert_eq!(store.apply_push(json!({"id": "n1"}), None), PushApplied::AlreadyRead);
    assert!(store.is_empty());
    assert_eq!(store.unread_count(), 0);
}

#[tokio::test]
async fn test_logout_clears_and_skips_network() {
    let api = MockApi::default().with_fetch(fetched(json!([{"id": "n1"}]), Some(1)));
    let (store, api, sync) = setup(api);
    let page = Surface::mount("page", &store);
    sync.refresh(&page.cancel_token()).await;
    assert_eq!(page.unread_count(), 1);

    store.set_session(None);
    assert!(page.items().is_empty());
    assert_eq!(page.unread_count(), 0);

    assert_eq!(sync.refresh(&page.cancel_token()).await, FetchOutcome::NoSession);
    assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unmounted_surface_discards_fetch() {
    let api = MockApi::default().with_fetch(fetched(json!([{"id": "n1"}]), None));
    let (store, api, sync) = setup(api);

    let popup = Surface::mount("popup", &store);
    let cancel = popup.cancel_token();
    popup.unmount();

    assert_eq!(sync.refresh(&cancel).await, FetchOutcome::Cancelled);
    assert!(store.is_empty());
    assert!(api.fetch_calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn test_confirmed_read_records_mapping_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mappings.json");

    let store = Arc::new(NotificationStore::new(
        MappingCache::open(&path),
        RateLimitGuard::new(),
    ));
    store.set_session(Some(AuthSession::new("token", "user-1")));
    let api = Arc::new(
        MockApi::default()
            .with_fetch(fetched(json!([{"id": "n1"}]), None))
            .with_mark_read(Ok(MarkReadResponse {
                unread_count: Some(0),
                notification_id: Some("n1".to_string()),
                alert_id: Some("alert-7".to_string()),
            })),
    );
    let sync = NotificationSync::new(store.clone(), api);
    sync.refresh(&CancellationToken::new()).await;
    sync.mark_read("n1").await;

    let reopened = MappingCache::open(&path);
    assert_eq!(reopened.get("n1").as_deref(), Some("alert-7"));
}

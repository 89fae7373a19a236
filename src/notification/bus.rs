//! 跨界面事件总线 - 让互不相关的界面观察未读数和已读变化
//!
//! # 设计目标
//! 1. 按主题订阅：`Topic` 决定哪些回调收到事件
//! 2. 同步发布：`publish` 按订阅顺序依次调用回调后返回
//! 3. 回调隔离：某个回调 panic 不影响其它回调
//! 4. 生命周期：`subscribe` 返回 `Subscription`，drop 时自动退订

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::merge::MergePosition;
use super::payload::Notification;

/// 事件主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    UnreadCountChanged,
    NotificationRead,
    SessionChanged,
    NotificationsMerged,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::UnreadCountChanged,
        Topic::NotificationRead,
        Topic::SessionChanged,
        Topic::NotificationsMerged,
    ];
}

/// 总线事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// 未读数变化（携带的是绝对值，不是增量）
    UnreadCountChanged { count: u64 },
    /// 某条通知已从未读视图移除
    NotificationRead {
        identity: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        related_entity_id: Option<String>,
    },
    /// 登录 / 登出
    SessionChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// 工作集合并了新数据，订阅者可以按同样的位置合并到自己的视图
    NotificationsMerged {
        notifications: Vec<Notification>,
        position: MergePosition,
    },
}

impl SyncEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SyncEvent::UnreadCountChanged { .. } => Topic::UnreadCountChanged,
            SyncEvent::NotificationRead { .. } => Topic::NotificationRead,
            SyncEvent::SessionChanged { .. } => Topic::SessionChanged,
            SyncEvent::NotificationsMerged { .. } => Topic::NotificationsMerged,
        }
    }
}

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    topic: Topic,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl BusInner {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }
}

/// 事件总线（克隆后共享同一组订阅者）
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅主题
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber {
                id,
                topic,
                callback: Arc::new(callback),
            });
        debug!(?topic, subscription = id, "Subscribed");

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 订阅主题，事件转发到 channel（供异步消费者使用）
    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> (Subscription, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(topic, move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// 发布事件，返回成功执行的回调数
    ///
    /// 回调在锁外执行，因此回调内可以订阅或退订
    pub fn publish(&self, event: &SyncEvent) -> usize {
        let topic = event.topic();
        let targets: Vec<(u64, Callback)> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| (s.id, s.callback.clone()))
            .collect();

        let mut delivered = 0;
        for (id, callback) in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(?topic, subscription = id, "Subscriber panicked, continuing with the rest");
                }
            }
        }
        delivered
    }

    /// 指定主题的订阅者数量
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }
}

/// 订阅句柄，drop 时退订
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// 显式退订
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!(subscription = self.id, "Unsubscribed");
            }
        }
    }
}

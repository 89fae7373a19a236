//! 界面视图 - 弹窗列表、通知页等独立挂载的消费者
//!
//! 每个界面维护自己的列表副本，只通过事件总线获知变化，
//! 与其它界面之间没有任何直接引用。卸载时退订并取消绑定的请求。

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bus::{Subscription, SyncEvent, Topic};
use super::merge;
use super::payload::Notification;
use super::store::NotificationStore;

#[derive(Debug, Default)]
struct SurfaceView {
    items: Vec<Notification>,
    unread_count: u64,
}

/// 已挂载的界面
pub struct Surface {
    name: String,
    view: Arc<Mutex<SurfaceView>>,
    cancel: CancellationToken,
    _subscriptions: Vec<Subscription>,
}

impl Surface {
    /// 挂载：先订阅所有主题，再在视图锁内取快照
    ///
    /// 快照期间发布的事件会排在锁后重放一次，合并按身份原位替换，结果不变
    pub fn mount(name: impl Into<String>, store: &NotificationStore) -> Self {
        let name = name.into();
        let view = Arc::new(Mutex::new(SurfaceView::default()));

        let subscriptions: Vec<Subscription> = Topic::ALL
            .into_iter()
            .map(|topic| {
                let view = view.clone();
                store
                    .bus()
                    .subscribe(topic, move |event| Self::apply(&view, event))
            })
            .collect();

        {
            let mut initial = view.lock().unwrap_or_else(|e| e.into_inner());
            initial.items = store.snapshot();
            initial.unread_count = store.unread_count();
        }

        debug!(surface = %name, "Surface mounted");
        Self {
            name,
            view,
            cancel: CancellationToken::new(),
            _subscriptions: subscriptions,
        }
    }

    fn apply(view: &Mutex<SurfaceView>, event: &SyncEvent) {
        let mut view = view.lock().unwrap_or_else(|e| e.into_inner());
        match event {
            SyncEvent::UnreadCountChanged { count } => view.unread_count = *count,
            SyncEvent::NotificationRead { identity, .. } => {
                view.items.retain(|n| &n.identity != identity);
            }
            SyncEvent::SessionChanged { .. } => {
                view.items.clear();
                view.unread_count = 0;
            }
            SyncEvent::NotificationsMerged {
                notifications,
                position,
            } => {
                merge::merge_into(&mut view.items, notifications.iter().cloned(), *position);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 绑定到该界面生命周期的取消令牌
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn items(&self) -> Vec<Notification> {
        self.view().items.clone()
    }

    pub fn identities(&self) -> Vec<String> {
        self.view().items.iter().map(|n| n.identity.clone()).collect()
    }

    pub fn unread_count(&self) -> u64 {
        self.view().unread_count
    }

    /// 卸载：退订并取消进行中的请求
    pub fn unmount(self) {
        drop(self);
    }

    fn view(&self) -> MutexGuard<'_, SurfaceView> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!(surface = %self.name, "Surface unmounted");
    }
}

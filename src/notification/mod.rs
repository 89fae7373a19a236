//! 通知同步核心 - 合并拉取、推送与跨界面的已读状态
//!
//! # 组成
//! 1. `identity`：从字段命名不一致的 payload 中解析规范身份
//! 2. `merge`：去重合并，推送置顶、拉取保序
//! 3. `read_state`：标记已读的乐观移除与服务端确认
//! 4. `rate_limit`：收到 429 后按接口类别熔断
//! 5. `bus`：跨界面的类型化发布 / 订阅
//! 6. `push`：跟随会话的 WebSocket 推送客户端
//! 7. `mapping`：持久化的通知 → 告警映射
//!
//! # 使用示例
//! ```ignore
//! use notification_sync::notification::{NotificationStore, NotificationSync, HttpNotificationApi, Surface};
//!
//! let store = Arc::new(NotificationStore::new(MappingCache::default(), RateLimitGuard::new()));
//! let api = Arc::new(HttpNotificationApi::new(base_url, timeout)?);
//! let sync = NotificationSync::new(store.clone(), api);
//!
//! let popup = Surface::mount("popup", &store);
//! sync.refresh(&popup.cancel_token()).await;
//! sync.mark_read("n1").await;
//! ```

pub mod api;
pub mod bus;
pub mod formatter;
pub mod identity;
pub mod mapping;
pub mod merge;
pub mod payload;
pub mod push;
pub mod rate_limit;
pub mod read_state;
pub mod session;
pub mod store;
pub mod surface;
pub mod sync;

pub use api::{FetchResponse, HttpNotificationApi, MarkReadResponse, NotificationApi, UserProfile};
pub use bus::{EventBus, Subscription, SyncEvent, Topic};
pub use identity::{resolve_identity, resolve_related_entity, KeySource};
pub use mapping::MappingCache;
pub use merge::{merge_batch, MergePosition, MergeReport};
pub use payload::Notification;
pub use push::{PushClient, PushConfig, PushMessage, PushState};
pub use rate_limit::{EndpointClass, RateLimitGuard};
pub use read_state::{MarkReadOutcome, PendingRead, ReadState, ReadStateSynchronizer};
pub use session::AuthSession;
pub use store::{NotificationStore, PushApplied};
pub use surface::Surface;
pub use sync::{FetchOutcome, NotificationSync};

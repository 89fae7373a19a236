//! Notification Sync - 未读通知的客户端同步核心

pub mod cli;
pub mod config;
pub mod error;
pub mod notification;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use notification::{
    AuthSession, EventBus, FetchOutcome, HttpNotificationApi, MappingCache, MarkReadOutcome,
    Notification, NotificationApi, NotificationStore, NotificationSync, PushClient, PushConfig,
    PushState, RateLimitGuard, Surface, SyncEvent, Topic,
};

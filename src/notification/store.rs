//! 通知状态存储 - 工作集、未读数、已读账本和会话的唯一持有者
//!
//! 所有变更都通过这里的类型化 API 完成，变更结果只通过 `EventBus` 广播，
//! 界面之间不互相持有引用。
//!
//! 发布事件前一定先释放内部锁，订阅者可以在回调里重新读取 store。

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::bus::{EventBus, SyncEvent};
use super::mapping::MappingCache;
use super::merge::{self, MergePosition, MergeReport};
use super::payload::Notification;
use super::rate_limit::RateLimitGuard;
use super::read_state::ReadState;
use super::session::{self, AuthSession};

#[derive(Debug, Default)]
struct StoreState {
    /// 有序、无重复的未读通知
    working_set: Vec<Notification>,
    unread_count: u64,
    /// 身份 -> 已读状态；不在账本中的视为 Unread
    ledger: HashMap<String, ReadState>,
    /// 每次切换会话递增，用于丢弃旧会话发起的异步结果
    generation: u64,
}

/// 推送事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushApplied {
    /// 新通知，已插入到最前
    Inserted,
    /// 已有通知，原地替换
    Replaced,
    /// 本会话内已标记已读，忽略
    AlreadyRead,
    /// payload 本身标记为已读，忽略
    ReadPayload,
    /// 来自旧会话的连接，丢弃
    Stale,
}

/// 通知状态存储
pub struct NotificationStore {
    state: Mutex<StoreState>,
    session: watch::Sender<Option<AuthSession>>,
    guard: RateLimitGuard,
    bus: EventBus,
    mappings: MappingCache,
}

impl NotificationStore {
    /// 创建 store
    pub fn new(mappings: MappingCache, guard: RateLimitGuard) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            state: Mutex::new(StoreState::default()),
            session,
            guard,
            bus: EventBus::new(),
            mappings,
        }
    }

    /// 仅内存的 store（测试用）
    pub fn in_memory() -> Self {
        Self::new(MappingCache::in_memory(), RateLimitGuard::new())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn guard(&self) -> &RateLimitGuard {
        &self.guard
    }

    pub fn mappings(&self) -> &MappingCache {
        &self.mappings
    }

    // ==================== 会话 ====================

    /// 当前有效会话
    pub fn session(&self) -> Option<AuthSession> {
        session::valid_session(&self.session.borrow()).cloned()
    }

    /// 订阅会话变化（推送客户端使用）
    pub fn watch_session(&self) -> watch::Receiver<Option<AuthSession>> {
        self.session.subscribe()
    }

    /// 当前会话代数
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// 切换会话（登录 / 登出），重置工作集、未读数和已读账本
    ///
    /// 与当前会话相同时不做任何事
    pub fn set_session(&self, next: Option<AuthSession>) {
        let next = next.filter(AuthSession::is_valid);
        if *self.session.borrow() == next {
            return;
        }

        let user_id = next.as_ref().map(|s| s.user_id.clone());
        {
            let mut state = self.lock();
            state.working_set.clear();
            state.ledger.clear();
            state.unread_count = 0;
            state.generation += 1;
        }
        self.session.send_replace(next);

        info!(user_id = ?user_id, "Session changed");
        self.bus.publish(&SyncEvent::SessionChanged { user_id });
        self.bus.publish(&SyncEvent::UnreadCountChanged { count: 0 });
    }

    // ==================== 读取 ====================

    /// 工作集快照
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().working_set.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.lock().unread_count
    }

    pub fn len(&self) -> usize {
        self.lock().working_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, identity: &str) -> Option<Notification> {
        self.lock()
            .working_set
            .iter()
            .find(|n| n.identity == identity)
            .cloned()
    }

    pub fn read_state(&self, identity: &str) -> ReadState {
        self.lock()
            .ledger
            .get(identity)
            .copied()
            .unwrap_or(ReadState::Unread)
    }

    // ==================== 合并 ====================

    /// 合并一次批量拉取的结果
    ///
    /// 已读的 payload 和本会话内已标记已读的通知不会进入工作集。
    /// 未读数优先采用服务端值，否则取工作集长度。
    pub fn apply_fetch(&self, payloads: Vec<Value>, server_count: Option<u64>) -> MergeReport {
        self.apply_fetch_for(None, payloads, server_count)
            .unwrap_or_default()
    }

    /// 仅当会话代数未变化时合并，返回 `None` 表示结果已过期被丢弃
    pub(crate) fn apply_fetch_for(
        &self,
        generation: Option<u64>,
        payloads: Vec<Value>,
        server_count: Option<u64>,
    ) -> Option<MergeReport> {
        let (report, merged, count) = {
            let mut state = self.lock();
            if generation.is_some_and(|g| g != state.generation) {
                debug!("Discarding fetch result from a previous session");
                return None;
            }

            let incoming: Vec<Notification> = payloads
                .into_iter()
                .map(Notification::from_value)
                .filter(|n| !n.is_read)
                .filter(|n| !Self::is_settled(&state.ledger, &n.identity))
                .collect();

            let report = merge::merge_into(
                &mut state.working_set,
                incoming.iter().cloned(),
                MergePosition::Append,
            );
            state.unread_count = server_count.unwrap_or(state.working_set.len() as u64);
            (report, incoming, state.unread_count)
        };
        self.record_mappings(&merged);

        debug!(
            inserted = report.inserted,
            replaced = report.replaced,
            unread = count,
            "Fetch merged"
        );
        if !merged.is_empty() {
            self.bus.publish(&SyncEvent::NotificationsMerged {
                notifications: merged,
                position: MergePosition::Append,
            });
        }
        self.bus.publish(&SyncEvent::UnreadCountChanged { count });
        Some(report)
    }

    /// 合并一条实时推送
    ///
    /// 被忽略的推送（已读 payload、本会话已标记已读）携带的服务端未读数仍然生效
    pub fn apply_push(&self, payload: Value, server_count: Option<u64>) -> PushApplied {
        self.apply_push_for(None, payload, server_count)
    }

    /// 仅当会话代数未变化时合并推送，否则返回 `Stale`
    pub(crate) fn apply_push_for(
        &self,
        generation: Option<u64>,
        payload: Value,
        server_count: Option<u64>,
    ) -> PushApplied {
        let notification = Notification::from_value(payload);

        let (applied, count, count_changed) = {
            let mut state = self.lock();
            if generation.is_some_and(|g| g != state.generation) {
                debug!(identity = %notification.identity, "Discarding push from a previous session");
                return PushApplied::Stale;
            }
            let before = state.unread_count;

            let applied = if notification.is_read {
                PushApplied::ReadPayload
            } else if Self::is_settled(&state.ledger, &notification.identity) {
                debug!(identity = %notification.identity, "Ignoring push for notification already read in this session");
                PushApplied::AlreadyRead
            } else {
                let report = merge::merge_into(
                    &mut state.working_set,
                    [notification.clone()],
                    MergePosition::Prepend,
                );
                if report.inserted > 0 {
                    PushApplied::Inserted
                } else {
                    PushApplied::Replaced
                }
            };

            state.unread_count = match (server_count, applied) {
                (Some(count), _) => count,
                (None, PushApplied::Inserted) => state.unread_count + 1,
                (None, _) => state.unread_count,
            };
            (applied, state.unread_count, state.unread_count != before)
        };

        debug!(identity = %notification.identity, ?applied, unread = count, "Push handled");
        if matches!(applied, PushApplied::Inserted | PushApplied::Replaced) {
            self.record_mappings(std::slice::from_ref(&notification));
            self.bus.publish(&SyncEvent::NotificationsMerged {
                notifications: vec![notification],
                position: MergePosition::Prepend,
            });
            self.bus.publish(&SyncEvent::UnreadCountChanged { count });
        } else if count_changed {
            self.bus.publish(&SyncEvent::UnreadCountChanged { count });
        }
        applied
    }

    /// 采用服务端推送的权威未读数
    pub fn apply_server_count(&self, count: u64) {
        if self.set_count(count) {
            self.bus.publish(&SyncEvent::UnreadCountChanged { count });
        }
    }

    /// 同上，会话已切换时忽略
    pub(crate) fn apply_server_count_for(&self, generation: u64, count: u64) {
        if self.set_count_for(generation, count) {
            self.bus.publish(&SyncEvent::UnreadCountChanged { count });
        }
    }

    /// 在锁外批量写入映射缓存（落盘至多一次）
    fn record_mappings(&self, notifications: &[Notification]) {
        let recorded = self
            .mappings
            .record_many(notifications.iter().filter_map(Notification::mapping));
        if recorded > 0 {
            debug!(recorded, "Mapping cache updated");
        }
    }

    // ==================== 已读状态（由 read_state 调用） ====================

    /// 乐观移除：从工作集删除，账本置为 Pending，未读数减一（不低于 0）
    ///
    /// 找不到时返回 `None`
    pub(crate) fn take_for_read(&self, identity: &str) -> Option<(Notification, u64, u64)> {
        let mut state = self.lock();
        let index = state
            .working_set
            .iter()
            .position(|n| n.identity == identity)?;
        let notification = state.working_set.remove(index);
        state.ledger.insert(identity.to_string(), ReadState::Pending);
        state.unread_count = state.unread_count.saturating_sub(1);
        Some((notification, state.unread_count, state.generation))
    }

    /// 更新账本，会话已切换时忽略
    pub(crate) fn settle_read(&self, generation: u64, identity: &str, read_state: ReadState) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.ledger.insert(identity.to_string(), read_state);
    }

    /// 设置未读数，会话已切换时忽略；返回值是否发生变化
    pub(crate) fn set_count_for(&self, generation: u64, count: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.unread_count == count {
            return false;
        }
        state.unread_count = count;
        true
    }

    fn set_count(&self, count: u64) -> bool {
        let mut state = self.lock();
        if state.unread_count == count {
            return false;
        }
        state.unread_count = count;
        true
    }

    fn is_settled(ledger: &HashMap<String, ReadState>, identity: &str) -> bool {
        matches!(
            ledger.get(identity),
            Some(ReadState::Pending) | Some(ReadState::Removed)
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

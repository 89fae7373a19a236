//! 限流熔断 - 收到 429 后停止重试对应类别的接口
//!
//! 每个接口类别一个标记。默认标记在整个会话内有效（只有重新加载才会清除），
//! 避免一个长时间打开的页面持续冲击已被限流的后端。
//! 可选的冷却时间到期后，下一次检查清除标记；再次收到 429 会重新熔断。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 接口类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointClass {
    /// 拉取通知列表
    NotificationFetch,
    /// 标记已读
    MarkRead,
    /// 用户信息查询
    UserLookup,
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointClass::NotificationFetch => "notification_fetch",
            EndpointClass::MarkRead => "mark_read",
            EndpointClass::UserLookup => "user_lookup",
        };
        f.write_str(name)
    }
}

/// 限流熔断器
#[derive(Debug, Default)]
pub struct RateLimitGuard {
    /// 类别 -> 被限流的时间
    tripped: Mutex<HashMap<EndpointClass, Instant>>,
    /// 冷却时间，`None` 表示整个会话有效
    cooldown: Option<Duration>,
}

impl RateLimitGuard {
    /// 创建会话级熔断器
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带冷却时间的熔断器
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            tripped: Mutex::new(HashMap::new()),
            cooldown: Some(cooldown),
        }
    }

    /// 是否应该发起请求
    pub fn should_attempt(&self, class: EndpointClass) -> bool {
        self.should_attempt_at(class, Instant::now())
    }

    /// 是否应该发起请求（带时间戳，用于测试）
    pub fn should_attempt_at(&self, class: EndpointClass, now: Instant) -> bool {
        let mut tripped = self.tripped.lock().unwrap_or_else(|e| e.into_inner());
        let Some(since) = tripped.get(&class).copied() else {
            return true;
        };

        match self.cooldown {
            Some(cooldown) if now.duration_since(since) >= cooldown => {
                tripped.remove(&class);
                debug!(endpoint = %class, "Rate limit cooldown elapsed");
                true
            }
            _ => {
                debug!(endpoint = %class, "Request suppressed by rate limit guard");
                false
            }
        }
    }

    /// 记录一次限流响应
    pub fn record_throttled(&self, class: EndpointClass) {
        self.record_throttled_at(class, Instant::now());
    }

    /// 记录一次限流响应（带时间戳，用于测试）
    pub fn record_throttled_at(&self, class: EndpointClass, now: Instant) {
        let mut tripped = self.tripped.lock().unwrap_or_else(|e| e.into_inner());
        if tripped.insert(class, now).is_none() {
            warn!(endpoint = %class, "Endpoint throttled, suppressing further calls");
        }
    }

    /// 当前是否处于熔断状态
    pub fn is_tripped(&self, class: EndpointClass) -> bool {
        self.tripped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&class)
    }
}

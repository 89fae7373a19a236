//! Output formatting for CLI commands

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::notification::formatter::format_row;
use crate::notification::{MarkReadOutcome, MergePosition, Notification, PushState, SyncEvent};

/// Format output as pretty JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// 通知列表
pub fn format_notifications(
    notifications: &[Notification],
    unread_count: u64,
    now: DateTime<Utc>,
) -> String {
    if notifications.is_empty() {
        return format!("没有未读通知（未读数: {}）", unread_count);
    }
    let mut out = format!("未读通知 {} 条:\n", unread_count);
    for n in notifications {
        out.push_str("\n  ");
        out.push_str(&format_row(n, now));
    }
    out
}

/// 单条标记已读结果
pub fn format_outcome(identity: &str, outcome: &MarkReadOutcome) -> String {
    match outcome {
        MarkReadOutcome::NotFound => format!("未找到通知 {}", identity),
        MarkReadOutcome::LocalOnly { unread_count } => {
            format!("{} 已在本地标记为已读（未登录），未读数: {}", identity, unread_count)
        }
        MarkReadOutcome::Suppressed { unread_count } => {
            format!("{} 未同步：接口已被限流，未读数: {}", identity, unread_count)
        }
        MarkReadOutcome::Confirmed { unread_count } => {
            format!("{} 已标记为已读，未读数: {}", identity, unread_count)
        }
        MarkReadOutcome::Failed {
            unread_count,
            reason,
        } => format!("{} 同步失败: {}，未读数: {}", identity, reason, unread_count),
    }
}

/// 批量标记结果汇总
pub fn format_batch_summary(outcomes: &[(String, MarkReadOutcome)]) -> String {
    let confirmed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, MarkReadOutcome::Confirmed { .. }))
        .count();
    let failed = outcomes.len() - confirmed;
    let mut out = format!("已处理 {} 条通知：成功 {}，未同步 {}", outcomes.len(), confirmed, failed);
    for (identity, outcome) in outcomes {
        if !matches!(outcome, MarkReadOutcome::Confirmed { .. }) {
            out.push_str("\n  ");
            out.push_str(&format_outcome(identity, outcome));
        }
    }
    out
}

/// 总线事件（watch 命令）
pub fn format_event(event: &SyncEvent, now: DateTime<Utc>) -> String {
    match event {
        SyncEvent::UnreadCountChanged { count } => format!("未读数: {}", count),
        SyncEvent::NotificationRead {
            identity,
            related_entity_id,
        } => match related_entity_id {
            Some(entity) => format!("已读: {} → {}", identity, entity),
            None => format!("已读: {}", identity),
        },
        SyncEvent::SessionChanged { user_id } => match user_id {
            Some(user_id) => format!("会话切换: {}", user_id),
            None => "已登出".to_string(),
        },
        SyncEvent::NotificationsMerged {
            notifications,
            position,
        } => {
            let label = match position {
                MergePosition::Prepend => "新通知",
                MergePosition::Append => "已拉取",
            };
            notifications
                .iter()
                .map(|n| format!("{} {}", label, format_row(n, now)))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

pub fn format_push_state(state: PushState) -> &'static str {
    match state {
        PushState::Disconnected => "推送已断开",
        PushState::Connecting => "推送连接中...",
        PushState::Connected => "推送已连接",
        PushState::Registered => "推送已注册",
    }
}

/// 通知 → 告警映射
pub fn format_mappings(entries: &[(String, String)]) -> String {
    if entries.is_empty() {
        return "没有已记录的映射".to_string();
    }
    let mut out = format!("已记录 {} 条映射:\n", entries.len());
    for (notification_id, entity_id) in entries {
        out.push_str(&format!("\n  {} → {}", notification_id, entity_id));
    }
    out
}

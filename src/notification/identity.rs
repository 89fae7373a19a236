//! 通知身份解析 - 从字段命名不一致的 payload 中提取规范 key
//!
//! 后端在不同接口里使用不同字段名表示同一个通知 ID：
//! `recipientId` / `recipient_id`（按接收者维度的 ID，最具体）、
//! `id` / `_id`（通用 ID）、`notificationId` / `notification_id`。
//!
//! 解析按固定优先级依次尝试 `KeySource` 列表，第一个命中的值即为身份。
//! 解析是纯函数：同一个 payload 在任何调用点都得到同一个身份。

use serde_json::Value;

/// 单个 key 提取器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// 顶层字段
    Field(&'static str),
    /// 嵌套对象中的字段，例如 `alert.id`
    Nested(&'static str, &'static str),
}

impl KeySource {
    /// 从 payload 中提取值
    ///
    /// 只接受非空字符串（去除首尾空白）或整数，其它类型视为缺失
    pub fn extract(&self, payload: &Value) -> Option<String> {
        let value = match self {
            KeySource::Field(name) => payload.get(name)?,
            KeySource::Nested(parent, name) => payload.get(parent)?.get(name)?,
        };
        scalar_to_key(value)
    }

    /// 提取器名称（用于日志）
    pub fn name(&self) -> String {
        match self {
            KeySource::Field(name) => (*name).to_string(),
            KeySource::Nested(parent, name) => format!("{}.{}", parent, name),
        }
    }
}

/// 通知身份提取顺序
pub const IDENTITY_SOURCES: &[KeySource] = &[
    KeySource::Field("recipientId"),
    KeySource::Field("recipient_id"),
    KeySource::Field("id"),
    KeySource::Field("_id"),
    KeySource::Field("notificationId"),
    KeySource::Field("notification_id"),
];

/// 关联实体（告警）ID 提取顺序，用于深链跳转
pub const RELATED_ENTITY_SOURCES: &[KeySource] = &[
    KeySource::Field("alertId"),
    KeySource::Field("alert_id"),
    KeySource::Field("relatedEntityId"),
    KeySource::Field("related_entity_id"),
    KeySource::Nested("alert", "id"),
    KeySource::Nested("alert", "_id"),
];

/// 发送者显示名提取顺序
pub const DISPLAY_NAME_SOURCES: &[KeySource] = &[
    KeySource::Field("senderName"),
    KeySource::Field("sender_name"),
    KeySource::Field("userName"),
    KeySource::Field("user_name"),
];

/// 发送者 ID 提取顺序（显示名缺失时用于查询用户）
pub const SENDER_ID_SOURCES: &[KeySource] = &[
    KeySource::Field("senderId"),
    KeySource::Field("sender_id"),
    KeySource::Field("userId"),
    KeySource::Field("user_id"),
];

/// 按顺序尝试提取器，返回第一个命中的值
pub fn first_match(payload: &Value, sources: &[KeySource]) -> Option<String> {
    sources.iter().find_map(|source| source.extract(payload))
}

/// 解析通知的规范身份
pub fn resolve_identity(payload: &Value) -> Option<String> {
    first_match(payload, IDENTITY_SOURCES)
}

/// 解析通知关联的实体 ID
pub fn resolve_related_entity(payload: &Value) -> Option<String> {
    first_match(payload, RELATED_ENTITY_SOURCES)
}

/// 判断两个 payload 是否为同一条通知
///
/// 无法解析身份的 payload 永远不相同
pub fn same_notification(a: &Value, b: &Value) -> bool {
    match (resolve_identity(a), resolve_identity(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn scalar_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

//! 通知模型 - 从后端原始 JSON 构造

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use super::identity::{self, KeySource};

const TITLE_SOURCES: &[KeySource] = &[KeySource::Field("title"), KeySource::Field("subject")];

const MESSAGE_SOURCES: &[KeySource] = &[
    KeySource::Field("message"),
    KeySource::Field("body"),
    KeySource::Field("content"),
];

const CREATED_AT_FIELDS: &[&str] = &["createdAt", "created_at", "timestamp"];

/// 无法解析身份的通知使用的本地序号
static LOCAL_IDENTITY_SEQ: AtomicU64 = AtomicU64::new(0);

/// 一条通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// 规范身份（见 `identity::resolve_identity`）
    pub identity: String,
    /// 身份是否来自 payload；为 false 时是本地生成的占位身份，不参与去重
    pub resolved: bool,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// 关联实体（告警）ID，用于深链跳转
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<String>,
    pub is_read: bool,
    /// 原始 payload
    pub raw: Value,
}

impl Notification {
    /// 从原始 payload 构造
    pub fn from_value(raw: Value) -> Self {
        let (identity, resolved) = match identity::resolve_identity(&raw) {
            Some(id) => (id, true),
            None => {
                let seq = LOCAL_IDENTITY_SEQ.fetch_add(1, Ordering::Relaxed);
                (format!("local-{}", seq), false)
            }
        };

        Self {
            identity,
            resolved,
            title: identity::first_match(&raw, TITLE_SOURCES).unwrap_or_default(),
            message: identity::first_match(&raw, MESSAGE_SOURCES).unwrap_or_default(),
            created_at: parse_created_at(&raw),
            related_entity_id: identity::resolve_related_entity(&raw),
            is_read: parse_is_read(&raw),
            raw,
        }
    }

    /// 可用于写入映射缓存的 (通知 ID, 关联实体 ID)
    pub fn mapping(&self) -> Option<(&str, &str)> {
        if !self.resolved {
            return None;
        }
        self.related_entity_id
            .as_deref()
            .map(|entity| (self.identity.as_str(), entity))
    }

    /// payload 自带的发送者显示名
    pub fn sender_name(&self) -> Option<String> {
        identity::first_match(&self.raw, identity::DISPLAY_NAME_SOURCES)
    }

    /// 发送者 ID
    pub fn sender_id(&self) -> Option<String> {
        identity::first_match(&self.raw, identity::SENDER_ID_SOURCES)
    }
}

fn parse_created_at(raw: &Value) -> Option<DateTime<Utc>> {
    CREATED_AT_FIELDS
        .iter()
        .filter_map(|field| raw.get(field).and_then(|v| v.as_str()))
        .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_is_read(raw: &Value) -> bool {
    let flagged = ["isRead", "is_read", "read"]
        .iter()
        .any(|field| raw.get(field).and_then(|v| v.as_bool()) == Some(true));
    let stamped = ["readAt", "read_at"]
        .iter()
        .any(|field| raw.get(field).is_some_and(|v| !v.is_null()));
    flagged || stamped
}

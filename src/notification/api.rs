//! REST 接口客户端
//!
//! 后端字段命名不统一，所有响应都先取成 `serde_json::Value` 再宽松解析。
//! 状态码映射：429 → `Throttled`，401/403 → `Unauthorized`，其它非 2xx → `Status`。

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::identity::{self, KeySource};
use super::session::AuthSession;
use crate::error::{SyncError, SyncResult};

const UNREAD_COUNT_FIELDS: &[&str] = &["unreadCount", "unread_count"];

const NOTIFICATION_LIST_FIELDS: &[&str] = &["notifications", "data", "items"];

const USER_NAME_SOURCES: &[KeySource] = &[
    KeySource::Field("displayName"),
    KeySource::Field("display_name"),
    KeySource::Field("fullName"),
    KeySource::Field("full_name"),
    KeySource::Field("name"),
    KeySource::Field("username"),
];

/// `GET /notifications` 响应
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    pub notifications: Vec<Value>,
    /// 服务端权威未读数
    pub unread_count: Option<u64>,
}

impl FetchResponse {
    /// 接受 `[...]` 或 `{ notifications: [...], unreadCount }`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self {
                notifications: items,
                unread_count: None,
            },
            Value::Object(mut map) => {
                let unread_count = UNREAD_COUNT_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(parse_count));
                let notifications = NOTIFICATION_LIST_FIELDS
                    .iter()
                    .find_map(|field| match map.remove(*field) {
                        Some(Value::Array(items)) => Some(items),
                        _ => None,
                    })
                    .unwrap_or_default();
                Self {
                    notifications,
                    unread_count,
                }
            }
            _ => Self::default(),
        }
    }
}

/// `POST /notifications/mark-read/{id}` 响应
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkReadResponse {
    pub unread_count: Option<u64>,
    pub notification_id: Option<String>,
    pub alert_id: Option<String>,
}

impl MarkReadResponse {
    pub fn from_value(value: &Value) -> Self {
        // 有些接口把通知对象包在 `notification` 字段里
        let nested = value.get("notification").filter(|v| v.is_object());
        let pick = |sources: &[KeySource]| {
            identity::first_match(value, sources)
                .or_else(|| nested.and_then(|n| identity::first_match(n, sources)))
        };

        Self {
            unread_count: UNREAD_COUNT_FIELDS
                .iter()
                .find_map(|field| value.get(*field).and_then(parse_count)),
            notification_id: pick(identity::IDENTITY_SOURCES),
            alert_id: pick(identity::RELATED_ENTITY_SOURCES),
        }
    }
}

/// `GET /users/{id}` 响应
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn from_value(id: &str, value: &Value) -> Self {
        let body = value.get("user").filter(|v| v.is_object()).unwrap_or(value);
        let display_name = identity::first_match(body, USER_NAME_SOURCES).or_else(|| {
            let first = body.get("firstName").and_then(|v| v.as_str())?;
            let last = body.get("lastName").and_then(|v| v.as_str()).unwrap_or("");
            Some(format!("{} {}", first, last).trim().to_string())
        });
        Self {
            id: id.to_string(),
            display_name,
        }
    }
}

/// REST 协作方接口
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// 拉取未读通知
    async fn fetch_notifications(&self, session: &AuthSession) -> SyncResult<FetchResponse>;

    /// 标记已读
    async fn mark_read(&self, session: &AuthSession, identity: &str)
        -> SyncResult<MarkReadResponse>;

    /// 查询用户（用于补全显示名）
    async fn fetch_user(&self, session: &AuthSession, user_id: &str) -> SyncResult<UserProfile>;
}

/// 把状态码映射为错误
pub fn check_status(status: u16) -> SyncResult<()> {
    match status {
        200..=299 => Ok(()),
        429 => Err(SyncError::Throttled),
        401 | 403 => Err(SyncError::Unauthorized),
        other => Err(SyncError::Status(other)),
    }
}

fn parse_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_i64().map(|n| n.max(0) as u64))
}

/// 基于 reqwest 的 HTTP 实现
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
}

impl HttpNotificationApi {
    /// 创建客户端
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// 拼接路径，逐段编码
    pub fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, session: &AuthSession) -> SyncResult<Value> {
        let response = request
            .header("Authorization", format!("Bearer {}", session.token))
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(status, url = %response.url(), "REST response");
        check_status(status)?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_notifications(&self, session: &AuthSession) -> SyncResult<FetchResponse> {
        let url = self.endpoint(&["notifications"])?;
        let value = self.send_json(self.client.get(url), session).await?;
        Ok(FetchResponse::from_value(value))
    }

    async fn mark_read(
        &self,
        session: &AuthSession,
        identity: &str,
    ) -> SyncResult<MarkReadResponse> {
        let url = self.endpoint(&["notifications", "mark-read", identity])?;
        let value = self.send_json(self.client.post(url), session).await?;
        Ok(MarkReadResponse::from_value(&value))
    }

    async fn fetch_user(&self, session: &AuthSession, user_id: &str) -> SyncResult<UserProfile> {
        let url = self.endpoint(&["users", user_id])?;
        let value = self.send_json(self.client.get(url), session).await?;
        Ok(UserProfile::from_value(user_id, &value))
    }
}

//! 实时推送客户端 - WebSocket 长连接
//!
//! ## 状态机
//! ```text
//! Disconnected --有效会话--> Connecting --> Connected --注册确认--> Registered
//! Connected/Registered --会话清除 / 取消--> Disconnected
//! ```
//! 连接跟随 store 的会话：登录后连接并立即发送注册消息，登出后断开，
//! 切换用户时重连。传输错误后按固定间隔重连。
//! 取消后不再向 store 投递任何事件。

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{self, AuthSession};
use super::store::NotificationStore;
use crate::error::{SyncError, SyncResult};

/// 推送客户端配置
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket 地址（如 wss://shop.example.com/ws）
    pub url: String,
    /// 断线重连间隔
    pub reconnect_delay: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000/ws".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Connected,
    Registered,
}

/// 可识别的入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// 新通知（`newAlert` / `newNotification`），payload 原样交给合并引擎
    Notification {
        payload: Value,
        unread_count: Option<u64>,
    },
    /// 注册确认
    Registered,
    /// 服务端推送的未读数
    UnreadCount(u64),
}

impl PushMessage {
    /// 解析入站文本帧，无法识别的消息返回 `None`
    ///
    /// 信封格式 `{"type": ..., "payload": ...}`，也接受 `event` / `data`
    pub fn parse(text: &str) -> Option<Self> {
        let envelope: Value = serde_json::from_str(text).ok()?;
        let kind = envelope
            .get("type")
            .or_else(|| envelope.get("event"))?
            .as_str()?;
        let payload = envelope.get("payload").or_else(|| envelope.get("data"));

        match kind {
            "newAlert" | "newNotification" => {
                let payload = payload.filter(|p| p.is_object())?.clone();
                let unread_count = envelope
                    .get("unreadCount")
                    .or_else(|| envelope.get("unread_count"))
                    .and_then(Value::as_u64);
                Some(PushMessage::Notification {
                    payload,
                    unread_count,
                })
            }
            "registered" => Some(PushMessage::Registered),
            "unreadCount" => payload?
                .get("count")
                .and_then(Value::as_u64)
                .map(PushMessage::UnreadCount),
            _ => None,
        }
    }

    /// 连接后发送的注册消息
    pub fn register(session: &AuthSession) -> Value {
        json!({
            "type": "register",
            "payload": {
                "userId": session.user_id,
                "userType": session.user_type,
            }
        })
    }
}

/// 一次连接的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Cancelled,
    SessionChanged,
    Closed,
}

/// 推送客户端
pub struct PushClient {
    config: PushConfig,
    store: Arc<NotificationStore>,
    state: watch::Sender<PushState>,
}

impl PushClient {
    pub fn new(config: PushConfig, store: Arc<NotificationStore>) -> Self {
        let (state, _) = watch::channel(PushState::Disconnected);
        Self {
            config,
            store,
            state,
        }
    }

    /// 当前连接状态
    pub fn state(&self) -> PushState {
        *self.state.borrow()
    }

    /// 订阅连接状态变化
    pub fn watch_state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    /// 在后台运行，直到 `cancel` 被触发
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// 主循环：等待会话 → 连接 → 断开后重连
    pub async fn run(&self, cancel: CancellationToken) {
        let mut session_rx = self.store.watch_session();

        loop {
            let session = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                session = wait_for_session(&mut session_rx) => match session {
                    Some(session) => session,
                    None => break,
                },
            };

            match self.connect_once(&session, &mut session_rx, &cancel).await {
                Ok(ConnectionEnd::Cancelled) => break,
                Ok(ConnectionEnd::SessionChanged) => {
                    self.set_state(PushState::Disconnected);
                    continue;
                }
                Ok(ConnectionEnd::Closed) => {
                    info!(url = %self.config.url, "Push channel closed by server");
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "Push channel error");
                }
            }

            self.set_state(PushState::Disconnected);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {
                    debug!("Reconnecting push channel");
                }
            }
        }

        self.set_state(PushState::Disconnected);
        debug!("Push client stopped");
    }

    async fn connect_once(
        &self,
        session: &AuthSession,
        session_rx: &mut watch::Receiver<Option<AuthSession>>,
        cancel: &CancellationToken,
    ) -> SyncResult<ConnectionEnd> {
        self.set_state(PushState::Connecting);
        // 本连接的帧只作用于建立时的会话
        let generation = self.store.generation();
        info!(url = %self.config.url, user_id = %session.user_id, generation, "Connecting push channel");

        let request = build_request(&self.config.url, &session.token)?;
        let (ws_stream, _) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ConnectionEnd::Cancelled),
            connected = connect_async(request) => connected?,
        };
        self.set_state(PushState::Connected);

        let (mut write, mut read) = ws_stream.split();
        let register = PushMessage::register(session).to_string();
        write.send(Message::Text(register.into())).await?;
        debug!(user_id = %session.user_id, "Sent register message");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(ConnectionEnd::Cancelled);
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(ConnectionEnd::Cancelled);
                    }
                    let next = session::valid_session(&session_rx.borrow_and_update()).cloned();
                    if next.as_ref() != Some(session) {
                        info!("Session changed, closing push channel");
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(ConnectionEnd::SessionChanged);
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str(), generation, cancel),
                    Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    fn handle_text(&self, text: &str, generation: u64, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        match PushMessage::parse(text) {
            Some(PushMessage::Notification {
                payload,
                unread_count,
            }) => {
                let applied = self.store.apply_push_for(Some(generation), payload, unread_count);
                debug!(?applied, "Push notification delivered");
            }
            Some(PushMessage::Registered) => {
                info!("Push channel registered");
                self.set_state(PushState::Registered);
            }
            Some(PushMessage::UnreadCount(count)) => {
                self.store.apply_server_count_for(generation, count)
            }
            None => debug!("Dropping unrecognized push message"),
        }
    }

    fn set_state(&self, next: PushState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn wait_for_session(
    session_rx: &mut watch::Receiver<Option<AuthSession>>,
) -> Option<AuthSession> {
    loop {
        let current = session::valid_session(&session_rx.borrow_and_update()).cloned();
        if current.is_some() {
            return current;
        }
        if session_rx.changed().await.is_err() {
            return None;
        }
    }
}

fn build_request(
    url: &str,
    token: &str,
) -> SyncResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = url.into_client_request()?;
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| SyncError::InvalidHeader(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

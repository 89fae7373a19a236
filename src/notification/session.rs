//! 登录会话 - 由外部维护，这里只读取 token 和用户身份

use serde::{Deserialize, Serialize};

/// 当前登录会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    /// Bearer token
    pub token: String,
    /// 用户 ID（推送注册时使用）
    pub user_id: String,
    /// 用户类型，例如 "buyer" / "seller" / "admin"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            user_type: None,
        }
    }

    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }

    /// token 和用户 ID 都非空才算有效会话
    pub fn is_valid(&self) -> bool {
        !self.token.trim().is_empty() && !self.user_id.trim().is_empty()
    }
}

/// 取出有效会话；空 token 等同于未登录
pub fn valid_session(session: &Option<AuthSession>) -> Option<&AuthSession> {
    session.as_ref().filter(|s| s.is_valid())
}

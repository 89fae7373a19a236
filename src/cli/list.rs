// src/cli/list.rs
//! List 命令 - 拉取并显示未读通知

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::context::SyncContext;
use super::output::{format_notifications, format_output};
use crate::notification::{FetchOutcome, Notification};

/// List 命令参数
#[derive(Args)]
pub struct ListArgs {
    /// 补全发送者显示名（会额外查询用户接口）
    #[arg(long)]
    pub senders: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedNotification {
    #[serde(flatten)]
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

/// List 命令输出
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOutput {
    pub unread_count: u64,
    pub notifications: Vec<ListedNotification>,
}

/// 拉取一次；限流或失败时报错
pub async fn fetch_once(ctx: &SyncContext, cancel: &CancellationToken) -> Result<()> {
    match ctx.sync.refresh(cancel).await {
        FetchOutcome::Merged(_) => Ok(()),
        FetchOutcome::NoSession => Err(anyhow!("未登录，无法拉取通知")),
        FetchOutcome::Suppressed => Err(anyhow!("通知接口已被限流，本次会话不再请求")),
        FetchOutcome::Cancelled | FetchOutcome::Stale => Err(anyhow!("拉取已取消")),
        FetchOutcome::Failed(reason) => Err(anyhow!("拉取通知失败: {}", reason)),
    }
}

/// 处理 list 命令
pub async fn handle_list(ctx: &SyncContext, args: ListArgs) -> Result<()> {
    ctx.require_session()?;
    let cancel = CancellationToken::new();
    fetch_once(ctx, &cancel).await?;

    let notifications = ctx.store.snapshot();
    let unread_count = ctx.store.unread_count();

    let mut listed = Vec::with_capacity(notifications.len());
    for notification in notifications {
        let sender = if args.senders {
            ctx.sync.display_name(&notification, &cancel).await
        } else {
            notification.sender_name()
        };
        listed.push(ListedNotification {
            notification,
            sender,
        });
    }

    if args.json {
        println!(
            "{}",
            format_output(&ListOutput {
                unread_count,
                notifications: listed,
            })
        );
        return Ok(());
    }

    let plain: Vec<Notification> = listed
        .iter()
        .map(|l| {
            let mut n = l.notification.clone();
            if let Some(sender) = &l.sender {
                n.title = if n.title.is_empty() {
                    sender.clone()
                } else {
                    format!("{}: {}", sender, n.title)
                };
            }
            n
        })
        .collect();
    println!("{}", format_notifications(&plain, unread_count, Utc::now()));
    Ok(())
}

// src/cli/watch.rs
//! watch 命令 - 挂载一个界面，拉取一次后持续接收推送
//!
//! 按 Ctrl+C 退出：卸载界面、取消推送连接。

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::context::SyncContext;
use super::list::fetch_once;
use super::output::{format_event, format_notifications, format_push_state};
use crate::notification::{PushClient, Subscription, Surface, SyncEvent, Topic};

/// watch 命令参数
#[derive(Args)]
pub struct WatchArgs {
    /// 每个事件输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

/// 处理 watch 命令
pub async fn handle_watch(ctx: &SyncContext, args: WatchArgs) -> Result<()> {
    ctx.require_session()?;

    let surface = Surface::mount("watch", &ctx.store);
    let cancel = surface.cancel_token();

    let (tx, mut events) = mpsc::unbounded_channel::<SyncEvent>();
    let _subscriptions: Vec<Subscription> = Topic::ALL
        .into_iter()
        .map(|topic| {
            let tx = tx.clone();
            ctx.store.bus().subscribe(topic, move |event| {
                let _ = tx.send(event.clone());
            })
        })
        .collect();
    drop(tx);

    if let Err(e) = fetch_once(ctx, &cancel).await {
        warn!(error = %e, "Initial fetch failed, waiting for push");
    }
    // 初次拉取的事件已体现在界面快照里
    while events.try_recv().is_ok() {}
    if !args.json {
        println!(
            "{}",
            format_notifications(&surface.items(), surface.unread_count(), Utc::now())
        );
        println!("\n正在监听推送，按 Ctrl+C 退出...");
    }

    let push = Arc::new(PushClient::new(ctx.config.push_config(), ctx.store.clone()));
    let mut push_state = push.watch_state();
    let handle = push.clone().spawn(cancel.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping watch");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{}", format_event(&event, Utc::now()));
                }
            }
            changed = push_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *push_state.borrow_and_update();
                if !args.json {
                    println!("{}", format_push_state(state));
                }
            }
        }
    }

    surface.unmount();
    if let Err(e) = handle.await {
        warn!(error = %e, "Push task ended abnormally");
    }
    if !args.json {
        println!("已停止监听");
    }
    Ok(())
}

// src/cli/mark_read.rs
//! mark-read / mark-all-read 命令

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::context::SyncContext;
use super::list::fetch_once;
use super::output::{format_batch_summary, format_outcome, format_output};
use crate::notification::MarkReadOutcome;

/// mark-read 命令参数
#[derive(Args)]
pub struct MarkReadArgs {
    /// 通知 ID
    pub id: String,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// mark-all-read 命令参数
#[derive(Args)]
pub struct MarkAllReadArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadOutput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    #[serde(flatten)]
    pub outcome: MarkReadOutcome,
}

/// 处理 mark-read 命令
pub async fn handle_mark_read(ctx: &SyncContext, args: MarkReadArgs) -> Result<()> {
    ctx.require_session()?;
    fetch_once(ctx, &CancellationToken::new()).await?;

    let deep_link = ctx.sync.reads().deep_link_target(&args.id);
    let outcome = ctx.sync.mark_read(&args.id).await;
    if outcome == MarkReadOutcome::NotFound {
        return Err(anyhow!("未找到未读通知 {}", args.id));
    }

    if args.json {
        println!(
            "{}",
            format_output(&MarkReadOutput {
                id: args.id,
                deep_link,
                outcome,
            })
        );
    } else {
        println!("{}", format_outcome(&args.id, &outcome));
        if let Some(target) = deep_link {
            println!("关联告警: {}", target);
        }
    }
    Ok(())
}

/// 处理 mark-all-read 命令
pub async fn handle_mark_all_read(ctx: &SyncContext, args: MarkAllReadArgs) -> Result<()> {
    ctx.require_session()?;
    fetch_once(ctx, &CancellationToken::new()).await?;

    let outcomes = ctx.sync.mark_all_read().await;
    if args.json {
        let output: Vec<MarkReadOutput> = outcomes
            .into_iter()
            .map(|(id, outcome)| MarkReadOutput {
                id,
                deep_link: None,
                outcome,
            })
            .collect();
        println!("{}", format_output(&output));
    } else if outcomes.is_empty() {
        println!("没有未读通知");
    } else {
        println!("{}", format_batch_summary(&outcomes));
    }
    Ok(())
}

//! Notification Sync CLI
//!
//! 拉取、标记和监听未读通知

use anyhow::Result;
use clap::{Parser, Subcommand};
use notification_sync::cli::{
    handle_list, handle_mappings, handle_mark_all_read, handle_mark_read, handle_watch, ListArgs,
    MappingsArgs, MarkAllReadArgs, MarkReadArgs, SyncContext, WatchArgs,
};
use notification_sync::SyncConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "nsync")]
#[command(about = "Notification Sync - 未读通知同步客户端")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/notification-sync/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 拉取并列出未读通知
    List(ListArgs),
    /// 标记单条通知为已读
    MarkRead(MarkReadArgs),
    /// 全部标记为已读
    MarkAllRead(MarkAllReadArgs),
    /// 持续接收推送并输出变化
    Watch(WatchArgs),
    /// 查看本地记录的通知 → 告警映射
    Mappings(MappingsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志，默认只输出 info 及以上，写到 stderr 以免干扰 --json 输出
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notification_sync=info,nsync=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    debug!(config = ?cli.config, "Starting nsync");

    let config = SyncConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::List(args) => handle_list(&SyncContext::from_config(config)?, args).await?,
        Commands::MarkRead(args) => {
            handle_mark_read(&SyncContext::from_config(config)?, args).await?
        }
        Commands::MarkAllRead(args) => {
            handle_mark_all_read(&SyncContext::from_config(config)?, args).await?
        }
        Commands::Watch(args) => handle_watch(&SyncContext::from_config(config)?, args).await?,
        Commands::Mappings(args) => handle_mappings(&config, args)?,
    }

    Ok(())
}

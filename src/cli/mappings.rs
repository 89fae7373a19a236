// src/cli/mappings.rs
//! mappings 命令 - 查看本地记录的通知 → 告警映射

use anyhow::Result;
use clap::Args;
use std::collections::BTreeMap;

use super::output::{format_mappings, format_output};
use crate::config::SyncConfig;

/// mappings 命令参数
#[derive(Args)]
pub struct MappingsArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 处理 mappings 命令（不需要会话，也不访问网络）
pub fn handle_mappings(config: &SyncConfig, args: MappingsArgs) -> Result<()> {
    let entries = config.mapping_cache().entries();
    if args.json {
        let map: BTreeMap<String, String> = entries.into_iter().collect();
        println!("{}", format_output(&map));
    } else {
        println!("{}", format_mappings(&entries));
    }
    Ok(())
}

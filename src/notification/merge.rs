//! 去重合并 - 把批量拉取和实时推送的通知合并成无重复的有序列表
//!
//! ## 合并规则
//! 1. 身份相同的通知原地替换（保留位置），后到的调用总是覆盖先到的
//! 2. 新通知：推送到达的放在最前面，批量拉取的追加到末尾以保留服务端顺序
//! 3. 无法解析身份的通知总是视为新通知

use serde::{Deserialize, Serialize};

use super::payload::Notification;

/// 新通知插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePosition {
    /// 插入到最前（实时推送）
    Prepend,
    /// 追加到末尾（批量拉取）
    Append,
}

/// 一次合并的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub replaced: usize,
}

/// 合并到已有列表的副本，返回新列表
pub fn merge_batch(
    existing: &[Notification],
    incoming: impl IntoIterator<Item = Notification>,
    position: MergePosition,
) -> Vec<Notification> {
    let mut merged = existing.to_vec();
    merge_into(&mut merged, incoming, position);
    merged
}

/// 原地合并
pub fn merge_into(
    target: &mut Vec<Notification>,
    incoming: impl IntoIterator<Item = Notification>,
    position: MergePosition,
) -> MergeReport {
    let mut report = MergeReport::default();

    for item in incoming {
        let existing = if item.resolved {
            target
                .iter()
                .position(|n| n.resolved && n.identity == item.identity)
        } else {
            None
        };

        match existing {
            Some(index) => {
                target[index] = item;
                report.replaced += 1;
            }
            None => {
                match position {
                    MergePosition::Prepend => target.insert(0, item),
                    MergePosition::Append => target.push(item),
                }
                report.inserted += 1;
            }
        }
    }

    report
}

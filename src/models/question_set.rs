//! 题组（Question Set）
//!
//! 题组以从 1 开始的整数编号，存储为 `set_<id>.jsonl`

use crate::models::record::{Decision, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 题组编号（从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetId(u32);

impl SetId {
    pub const FIRST: SetId = SetId(1);

    /// 编号 0 会被提升为 1
    pub fn new(id: u32) -> Self {
        Self(id.max(1))
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// 存储文件名，例如 `set_3.jsonl`
    pub fn file_name(self) -> String {
        format!("set_{}.jsonl", self.0)
    }
}

impl Default for SetId {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 题组作答统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetSummary {
    pub total: usize,
    pub unset: usize,
    pub skipped: usize,
    pub resolved: usize,
}

impl SetSummary {
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = SetSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            match record.decision() {
                Decision::Unset => summary.unset += 1,
                Decision::Skipped => summary.skipped += 1,
                _ => summary.resolved += 1,
            }
        }
        summary
    }

    /// 是否还有未作答的题目
    pub fn has_unset(&self) -> bool {
        self.unset > 0
    }

    /// 是否已完成
    ///
    /// `skip_counts_as_resolved` 为 false 时，跳过的题目也必须最终作答
    pub fn is_complete(&self, skip_counts_as_resolved: bool) -> bool {
        if skip_counts_as_resolved {
            self.unset == 0
        } else {
            self.unset == 0 && self.skipped == 0
        }
    }
}

impl fmt::Display for SetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "共 {} 题 | 已作答 {} | 已跳过 {} | 未作答 {}",
            self.total, self.resolved, self.skipped, self.unset
        )
    }
}

//! 出题顺序
//!
//! 顺序策略：
//! 1. 当前位置之后第一道未作答的题
//! 2. 回绕，从 0 到当前位置之前找未作答的题
//! 3. 仍然没有时，若跳过的题需要最终作答，选位置最小的已跳过题
//! 4. 都没有则题组完成

use crate::models::Record;

/// 刚加载题组时的位置
pub fn first_position(records: &[Record], skip_counts_as_resolved: bool) -> Option<usize> {
    records
        .iter()
        .position(Record::is_unset)
        .or_else(|| lowest_skipped(records, skip_counts_as_resolved))
}

/// 当前题处理完之后的下一个位置
pub fn next_position(
    records: &[Record],
    current: usize,
    skip_counts_as_resolved: bool,
) -> Option<usize> {
    let len = records.len();
    let current = current.min(len);
    let forward = (current + 1)..len;
    let wrapped = 0..current;

    forward
        .chain(wrapped)
        .find(|&idx| records[idx].is_unset())
        .or_else(|| lowest_skipped(records, skip_counts_as_resolved))
}

/// 再次跳过一道已跳过的题时：当前位置之后（回绕）的下一道已跳过题
pub fn next_skipped_after(records: &[Record], current: usize) -> Option<usize> {
    if records.is_empty() {
        return None;
    }
    let len = records.len();
    let current = current.min(len - 1);
    ((current + 1)..len)
        .chain(0..=current)
        .find(|&idx| records[idx].is_skipped())
}

fn lowest_skipped(records: &[Record], skip_counts_as_resolved: bool) -> Option<usize> {
    if skip_counts_as_resolved {
        None
    } else {
        records.iter().position(Record::is_skipped)
    }
}

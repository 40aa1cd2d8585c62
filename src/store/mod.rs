//! 存储适配层
//!
//! 题组的唯一持久化出口：加载整组记录、按位置更新单条记录。
//! 存储是唯一可信来源，内存中的题组只是缓存。
//!
//! 读取时兼容 CRLF 行尾，但写回时统一使用 LF：
//! CRLF 文件在第一次更新后会整体变为 LF 行尾。

pub mod http_store;
pub mod jsonl_store;

use crate::error::StoreResult;
use crate::models::{FieldChanges, Record, SetId};
use std::future::Future;

pub use http_store::HttpStore;
pub use jsonl_store::JsonlStore;

/// 记录存储
///
/// - `load_set`: 题组不存在返回 `NotFound`，任意一行不合法返回 `Parse`（不返回部分结果）
/// - `apply_update`: 只覆盖 `changes` 中指定的字段，返回写入后的记录；
///   `position` 越界返回 `OutOfRange`
/// - `apply_updates`: 批量版本，返回值与 `updates` 一一对应
pub trait RecordStore {
    fn load_set(&self, set_id: SetId) -> impl Future<Output = StoreResult<Vec<Record>>> + Send;

    fn apply_update(
        &self,
        set_id: SetId,
        position: usize,
        changes: &FieldChanges,
    ) -> impl Future<Output = StoreResult<Record>> + Send;

    fn apply_updates(
        &self,
        set_id: SetId,
        updates: &[(usize, FieldChanges)],
    ) -> impl Future<Output = StoreResult<Vec<Record>>> + Send;
}

/// 按配置选择的存储后端
pub enum AnyStore {
    File(JsonlStore),
    Http(HttpStore),
}

impl RecordStore for AnyStore {
    async fn load_set(&self, set_id: SetId) -> StoreResult<Vec<Record>> {
        match self {
            AnyStore::File(store) => store.load_set(set_id).await,
            AnyStore::Http(store) => store.load_set(set_id).await,
        }
    }

    async fn apply_update(
        &self,
        set_id: SetId,
        position: usize,
        changes: &FieldChanges,
    ) -> StoreResult<Record> {
        match self {
            AnyStore::File(store) => store.apply_update(set_id, position, changes).await,
            AnyStore::Http(store) => store.apply_update(set_id, position, changes).await,
        }
    }

    async fn apply_updates(
        &self,
        set_id: SetId,
        updates: &[(usize, FieldChanges)],
    ) -> StoreResult<Vec<Record>> {
        match self {
            AnyStore::File(store) => store.apply_updates(set_id, updates).await,
            AnyStore::Http(store) => store.apply_updates(set_id, updates).await,
        }
    }
}

/// 解析 JSONL 文本（文件后端和 HTTP 后端共用）
///
/// 只忽略结尾的换行；中间的空行视为解析错误。
pub(crate) fn parse_set(set_id: SetId, content: &str) -> StoreResult<Vec<Record>> {
    split_lines(content)
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
            Record::from_json_line(line).map_err(|source| crate::error::StoreError::Parse {
                set_id,
                line: idx + 1,
                source,
            })
        })
        .collect()
}

pub(crate) fn split_lines(content: &str) -> Vec<&str> {
    let body = content.trim_end_matches(['\n', '\r']);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

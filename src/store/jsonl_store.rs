//! 本地 JSONL 文件存储
//!
//! 每个题组对应数据目录下的一个 `set_<id>.jsonl` 文件，一行一个 JSON 对象。
//! 更新时整文件重写：先写同目录下的临时文件，再原子 rename 覆盖。

use crate::error::{StoreError, StoreResult};
use crate::models::{FieldChanges, Record, SetId};
use crate::store::{parse_set, split_lines, RecordStore};
use regex::Regex;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// 本地文件存储
#[derive(Debug, Clone)]
pub struct JsonlStore {
    data_dir: PathBuf,
}

impl JsonlStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// 题组文件路径
    pub fn set_path(&self, set_id: SetId) -> PathBuf {
        self.data_dir.join(set_id.file_name())
    }

    /// 扫描数据目录，返回所有已存在的题组编号（升序）
    pub async fn list_sets(&self) -> StoreResult<Vec<SetId>> {
        let pattern = Regex::new(r"^set_(\d+)\.jsonl$")
            .map_err(|e| StoreError::persistence(self.data_dir.display().to_string(), e))?;

        let mut entries = fs::read_dir(&self.data_dir).await.map_err(|e| {
            StoreError::persistence(self.data_dir.display().to_string(), e)
        })?;

        let mut set_ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::persistence(self.data_dir.display().to_string(), e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = pattern
                .captures(name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
                .filter(|id| *id > 0)
            {
                set_ids.push(SetId::new(id));
            }
        }

        set_ids.sort();
        Ok(set_ids)
    }

    async fn read_content(&self, set_id: SetId) -> StoreResult<String> {
        let path = self.set_path(set_id);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                set_id,
                location: path.display().to_string(),
            }),
            Err(e) => Err(StoreError::persistence(path.display().to_string(), e)),
        }
    }

    /// 原子写入：临时文件 + rename
    async fn write_lines(&self, set_id: SetId, lines: &[String]) -> StoreResult<()> {
        let path = self.set_path(set_id);
        let tmp_path = self
            .data_dir
            .join(format!(".{}.{}.tmp", set_id.file_name(), std::process::id()));

        let mut content = lines.join("\n");
        content.push('\n');

        if let Err(e) = fs::write(&tmp_path, content).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::persistence(tmp_path.display().to_string(), e));
        }

        if let Err(e) = fs::rename(&tmp_path, &path).await {
            warn!("替换题组文件失败，清理临时文件: {}", tmp_path.display());
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::persistence(path.display().to_string(), e));
        }

        debug!("已写入 {} ({} 行)", path.display(), lines.len());
        Ok(())
    }
}

/// 对指定行做浅合并，返回新的行文本和合并后的记录
fn merge_line(
    set_id: SetId,
    position: usize,
    line: &str,
    changes: &FieldChanges,
) -> StoreResult<(String, Record)> {
    let parse_err = |source| StoreError::Parse {
        set_id,
        line: position + 1,
        source,
    };

    let mut object: Map<String, Value> = serde_json::from_str(line).map_err(parse_err)?;
    changes.merge_into(&mut object);

    let merged = Value::Object(object);
    let record: Record = serde_json::from_value(merged.clone()).map_err(parse_err)?;
    let text = serde_json::to_string(&merged).map_err(parse_err)?;
    Ok((text, record))
}

impl RecordStore for JsonlStore {
    async fn load_set(&self, set_id: SetId) -> StoreResult<Vec<Record>> {
        let content = self.read_content(set_id).await?;
        let records = parse_set(set_id, &content)?;
        debug!("题组 {} 加载完成，共 {} 条记录", set_id, records.len());
        Ok(records)
    }

    async fn apply_update(
        &self,
        set_id: SetId,
        position: usize,
        changes: &FieldChanges,
    ) -> StoreResult<Record> {
        let updates = [(position, changes.clone())];
        let mut records = self.apply_updates(set_id, &updates).await?;
        records.pop().ok_or(StoreError::OutOfRange {
            set_id,
            position,
            len: 0,
        })
    }

    async fn apply_updates(
        &self,
        set_id: SetId,
        updates: &[(usize, FieldChanges)],
    ) -> StoreResult<Vec<Record>> {
        let content = self.read_content(set_id).await?;
        let mut lines: Vec<String> = split_lines(&content)
            .into_iter()
            .map(str::to_string)
            .collect();

        // 先检查全部位置，避免写入一半
        if let Some((position, _)) = updates.iter().find(|(pos, _)| *pos >= lines.len()) {
            return Err(StoreError::OutOfRange {
                set_id,
                position: *position,
                len: lines.len(),
            });
        }

        let mut updated = Vec::with_capacity(updates.len());
        for (position, changes) in updates {
            let (text, record) = merge_line(set_id, *position, &lines[*position], changes)?;
            lines[*position] = text;
            updated.push(record);
        }

        if !updates.is_empty() {
            self.write_lines(set_id, &lines).await?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    const LINE_1: &str = r#"{"instruction":"1+1=?","output-o1":"2","output-qwen":"3","flag":null,"Feedback":null}"#;
    const LINE_2: &str = r#"{"instruction":"天空的颜色","output-o1":"蓝色","output-qwen":"绿色","flag":null,"Feedback":null,"source":"demo"}"#;

    async fn store_with(content: &str) -> (tempfile::TempDir, JsonlStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        fs::write(store.set_path(SetId::FIRST), content).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_load_set_and_idempotence() {
        let (_dir, store) = store_with(&format!("{}\n{}\n", LINE_1, LINE_2)).await;
        let first = store.load_set(SetId::FIRST).await.unwrap();
        let second = store.load_set(SetId::FIRST).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_missing_set_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let err = store.load_set(SetId::new(5)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_line_fails_whole_load() {
        let (_dir, store) = store_with(&format!("{}\n{{\"instruction\":\n{}\n", LINE_1, LINE_2)).await;
        match store.load_set(SetId::FIRST).await {
            Err(StoreError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_apply_update_merges_named_fields_only() {
        let (_dir, store) = store_with(&format!("{}\n{}\n", LINE_1, LINE_2)).await;

        let changes = FieldChanges::decision(Decision::Neither).with_feedback("都不对");
        let record = store.apply_update(SetId::FIRST, 1, &changes).await.unwrap();
        assert_eq!(record.flag, Decision::Neither);
        assert_eq!(record.feedback.as_deref(), Some("都不对"));

        let content = fs::read_to_string(store.set_path(SetId::FIRST)).await.unwrap();
        assert!(content.ends_with("}\n"));
        assert!(!content.ends_with("\n\n"));

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], LINE_1);
        assert_eq!(
            lines[1],
            r#"{"instruction":"天空的颜色","output-o1":"蓝色","output-qwen":"绿色","flag":2,"Feedback":"都不对","source":"demo"}"#
        );
    }

    #[tokio::test]
    async fn test_apply_update_out_of_range() {
        let (_dir, store) = store_with(&format!("{}\n{}\n", LINE_1, LINE_2)).await;
        let err = store
            .apply_update(SetId::FIRST, 2, &FieldChanges::decision(Decision::ChooseA))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::OutOfRange {
                position: 2,
                len: 2,
                ..
            }
        ));

        // 文件保持不变
        let content = fs::read_to_string(store.set_path(SetId::FIRST)).await.unwrap();
        assert_eq!(content, format!("{}\n{}\n", LINE_1, LINE_2));
    }

    #[tokio::test]
    async fn test_apply_update_on_missing_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        let err = store
            .apply_update(SetId::new(9), 0, &FieldChanges::decision(Decision::ChooseA))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bulk_update_leaves_no_temp_file() {
        let (dir, store) = store_with(&format!("{}\n{}\n", LINE_1, LINE_2)).await;
        let updates = vec![
            (0, FieldChanges::decision(Decision::Skipped)),
            (1, FieldChanges::decision(Decision::Skipped)),
        ];
        let records = store.apply_updates(SetId::FIRST, &updates).await.unwrap();
        assert!(records.iter().all(|r| r.flag == Decision::Skipped));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["set_1.jsonl".to_string()]);
    }

    fn file_names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        // 目标位置是非空目录，rename 必然失败
        let target = store.set_path(SetId::new(2));
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "").unwrap();

        let err = store
            .write_lines(SetId::new(2), &[LINE_1.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert!(err.to_string().contains("set_2.jsonl"));
        assert_eq!(file_names(dir.path()), vec!["set_2.jsonl".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_temp_write_keeps_set_file() {
        let (dir, store) = store_with(&format!("{}\n{}\n", LINE_1, LINE_2)).await;
        // 临时文件路径被目录占用，写入失败
        let tmp_path = dir
            .path()
            .join(format!(".set_1.jsonl.{}.tmp", std::process::id()));
        std::fs::create_dir(&tmp_path).unwrap();

        let err = store
            .apply_update(SetId::FIRST, 0, &FieldChanges::decision(Decision::ChooseA))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));

        let records = store.load_set(SetId::FIRST).await.unwrap();
        assert!(records.iter().all(Record::is_unset));
    }

    #[tokio::test]
    async fn test_list_sets_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["set_10.jsonl", "set_2.jsonl", "set_1.jsonl", "notes.txt", "set_x.jsonl"] {
            fs::write(dir.path().join(name), "").await.unwrap();
        }
        let store = JsonlStore::new(dir.path());
        let ids = store.list_sets().await.unwrap();
        assert_eq!(ids, vec![SetId::new(1), SetId::new(2), SetId::new(10)]);
    }
}

//! HTTP 存储（对接前端开发服务器）
//!
//! 题组文件以静态文件方式读取：`GET {base_url}{data_prefix}/set_<id>.jsonl`；
//! 更新通过补丁接口：`POST {base_url}/api/updateJSONL`，
//! 请求体 `{ filePath, index, updates }`，响应 `{ success, message? }`。

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{FieldChanges, Record, SetId};
use crate::store::{parse_set, RecordStore};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

const PATCH_ENDPOINT: &str = "/api/updateJSONL";

/// 补丁接口请求体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub file_path: String,
    pub index: usize,
    pub updates: Map<String, Value>,
}

/// 补丁接口响应
#[derive(Debug, Clone, Deserialize)]
pub struct PatchResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// HTTP 存储客户端
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    data_prefix: String,
}

impl HttpStore {
    /// 创建 HTTP 存储客户端
    pub fn new(
        base_url: impl Into<String>,
        data_prefix: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::persistence(base_url.clone(), e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            data_prefix: normalize_prefix(&data_prefix.into()),
        })
    }

    pub fn from_config(config: &Config) -> StoreResult<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.data_url_prefix.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// 补丁接口使用的文件路径，例如 `/data/set_1.jsonl`
    pub fn file_path(&self, set_id: SetId) -> String {
        format!("{}/{}", self.data_prefix, set_id.file_name())
    }

    pub fn set_url(&self, set_id: SetId) -> String {
        format!("{}{}", self.base_url, self.file_path(set_id))
    }

    fn patch_url(&self) -> String {
        format!("{}{}", self.base_url, PATCH_ENDPOINT)
    }

    async fn post_patch(&self, request: &PatchRequest) -> StoreResult<()> {
        let url = self.patch_url();
        debug!("提交补丁: {} index={}", request.file_path, request.index);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| StoreError::persistence(url.clone(), e))?;

        let status = response.status();
        let body: Option<PatchResponse> = response.json().await.ok();

        match body {
            Some(PatchResponse { success: true, .. }) if status.is_success() => Ok(()),
            Some(PatchResponse { message, .. }) => Err(StoreError::persistence(
                url,
                message.unwrap_or_else(|| format!("HTTP {}", status)),
            )),
            None => Err(StoreError::persistence(url, format!("HTTP {}，响应无法解析", status))),
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

impl RecordStore for HttpStore {
    async fn load_set(&self, set_id: SetId) -> StoreResult<Vec<Record>> {
        let url = self.set_url(set_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::persistence(url.clone(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                set_id,
                location: url,
            });
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(StoreError::persistence(url, format!("HTTP {}", status)));
        }

        let content = response
            .text()
            .await
            .map_err(|e| StoreError::persistence(url.clone(), e))?;
        parse_set(set_id, &content)
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

    /// 接口没有批量形式，逐条提交后重新读取一次
    async fn apply_updates(
        &self,
        set_id: SetId,
        updates: &[(usize, FieldChanges)],
    ) -> StoreResult<Vec<Record>> {
        let len = self.load_set(set_id).await?.len();
        if let Some((position, _)) = updates.iter().find(|(pos, _)| *pos >= len) {
            return Err(StoreError::OutOfRange {
                set_id,
                position: *position,
                len,
            });
        }

        for (position, changes) in updates {
            let request = PatchRequest {
                file_path: self.file_path(set_id),
                index: *position,
                updates: changes.to_json(),
            };
            self.post_patch(&request).await?;
        }

        let records = self.load_set(set_id).await?;
        updates
            .iter()
            .map(|(position, _)| {
                records.get(*position).cloned().ok_or(StoreError::OutOfRange {
                    set_id,
                    position: *position,
                    len: records.len(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;
    use crate::workflow::{Current, Sequencer, SequencerOptions};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    const LINE: &str = r#"{"instruction":"i","output-o1":"a","output-qwen":"b","flag":null,"Feedback":null}"#;
    const LINE_CHOSEN_B: &str = r#"{"instruction":"i","output-o1":"a","output-qwen":"b","flag":1,"Feedback":null}"#;
    const LINE_SKIPPED: &str = r#"{"instruction":"i","output-o1":"a","output-qwen":"b","flag":3,"Feedback":null}"#;

    fn set_body(lines: &[&str]) -> (u16, String) {
        (200, lines.iter().map(|line| format!("{}\n", line)).collect())
    }

    fn ok_patch() -> (u16, String) {
        (200, r#"{"success":true}"#.to_string())
    }

    /// 按顺序返回预设响应的最小 HTTP 服务，收集收到的请求原文
    async fn serve(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Internal Server Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            requests
        });
        (format!("http://{}", addr), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn store(base_url: &str) -> HttpStore {
        HttpStore::new(base_url, "data/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_paths() {
        let store = store("http://localhost:3101/");
        assert_eq!(store.file_path(SetId::new(2)), "/data/set_2.jsonl");
        assert_eq!(store.set_url(SetId::new(2)), "http://localhost:3101/data/set_2.jsonl");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/public/data/"), "/public/data");
    }

    #[test]
    fn test_patch_request_body() {
        let request = PatchRequest {
            file_path: "/data/set_1.jsonl".to_string(),
            index: 4,
            updates: FieldChanges::decision(Decision::Skipped).to_json(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"filePath": "/data/set_1.jsonl", "index": 4, "updates": {"flag": 3}})
        );
    }

    #[tokio::test]
    async fn test_load_missing_set() {
        let (base_url, handle) = serve(vec![(404, String::new())]).await;
        let err = store(&base_url).load_set(SetId::new(7)).await.unwrap_err();
        assert!(err.is_not_found());
        let requests = handle.await.unwrap();
        assert!(requests[0].starts_with("GET /data/set_7.jsonl"));
    }

    #[tokio::test]
    async fn test_apply_update_posts_patch_and_rereads() {
        let (base_url, handle) = serve(vec![
            (200, format!("{}\n", LINE)),
            (200, r#"{"success":true}"#.to_string()),
            (200, format!("{}\n", LINE_CHOSEN_B)),
        ])
        .await;

        let record = store(&base_url)
            .apply_update(SetId::FIRST, 0, &FieldChanges::decision(Decision::ChooseB))
            .await
            .unwrap();
        assert_eq!(record.flag, Decision::ChooseB);

        let requests = handle.await.unwrap();
        assert!(requests[1].starts_with("POST /api/updateJSONL"));
        assert!(requests[1].contains(r#""filePath":"/data/set_1.jsonl""#));
        assert!(requests[1].contains(r#""updates":{"flag":1}"#));
    }

    #[tokio::test]
    async fn test_apply_update_failure_is_persistence_error() {
        let (base_url, _handle) = serve(vec![
            (200, format!("{}\n", LINE)),
            (500, r#"{"success":false,"message":"磁盘已满"}"#.to_string()),
        ])
        .await;

        let err = store(&base_url)
            .apply_update(SetId::FIRST, 0, &FieldChanges::decision(Decision::ChooseA))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
        assert!(err.to_string().contains("磁盘已满"));
    }

    #[tokio::test]
    async fn test_apply_update_out_of_range() {
        let (base_url, _handle) = serve(vec![(200, format!("{}\n", LINE))]).await;
        let err = store(&base_url)
            .apply_update(SetId::FIRST, 1, &FieldChanges::decision(Decision::ChooseA))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { position: 1, len: 1, .. }));
    }

    #[tokio::test]
    async fn test_partial_skip_remaining_resyncs_with_server() {
        let (base_url, handle) = serve(vec![
            // open
            set_body(&[LINE, LINE]),
            // skip_remaining：第 2 条补丁失败
            set_body(&[LINE, LINE]),
            ok_patch(),
            (500, r#"{"success":false,"message":"boom"}"#.to_string()),
            set_body(&[LINE_SKIPPED, LINE]),
            // 重试只提交剩下的一条
            set_body(&[LINE_SKIPPED, LINE]),
            ok_patch(),
            set_body(&[LINE_SKIPPED, LINE_SKIPPED]),
        ])
        .await;

        let mut sequencer = Sequencer::open(store(&base_url), SetId::FIRST, SequencerOptions::default())
            .await
            .unwrap();

        let err = sequencer.skip_remaining().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(sequencer.records()[0].is_skipped());
        assert!(sequencer.records()[1].is_unset());
        assert!(matches!(sequencer.current(), Current::Record { position: 1, .. }));

        assert_eq!(sequencer.skip_remaining().await.unwrap(), 1);
        assert!(sequencer.is_complete());

        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 8);
        assert!(requests[6].contains(r#""index":1"#));
    }

    #[tokio::test]
    async fn test_decide_resyncs_when_reread_fails() {
        let (base_url, _handle) = serve(vec![
            set_body(&[LINE, LINE]),
            // 补丁成功，但随后的读取失败
            set_body(&[LINE, LINE]),
            ok_patch(),
            (500, String::new()),
            set_body(&[LINE_CHOSEN_B, LINE]),
        ])
        .await;

        let mut sequencer = Sequencer::open(store(&base_url), SetId::FIRST, SequencerOptions::default())
            .await
            .unwrap();

        let err = sequencer
            .decide(crate::models::Verdict::ChooseB, None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(sequencer.records()[0].flag, Decision::ChooseB);
        assert!(matches!(sequencer.current(), Current::Record { position: 1, .. }));
    }
}

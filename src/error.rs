use crate::models::{Decision, SetId};
use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 题组不存在
    #[error("题组 {set_id} 不存在: {location}")]
    NotFound { set_id: SetId, location: String },

    /// 某一行不是合法的记录（整组加载失败）
    #[error("题组 {set_id} 第 {line} 行解析失败: {source}")]
    Parse {
        set_id: SetId,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// 位置超出题组范围
    #[error("题组 {set_id} 的位置 {position} 超出范围 (共 {len} 条)")]
    OutOfRange {
        set_id: SetId,
        position: usize,
        len: usize,
    },

    /// 写入失败或网络传输失败
    #[error("保存失败 ({target}): {source}")]
    Persistence {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    pub fn persistence(
        target: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StoreError::Persistence {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// 评审流程错误
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 选择"都不好"时必须填写反馈
    #[error("选择\"都不好\"时必须填写反馈")]
    MissingFeedback,

    /// 非法的状态迁移
    #[error("第 {position} 题不能从 {from} 变为 {to}")]
    IllegalTransition {
        position: usize,
        from: Decision,
        to: Decision,
    },

    /// 当前题组已全部完成
    #[error("题组 {0} 已完成，没有当前题目")]
    SetComplete(SetId),
}

impl ReviewError {
    /// 评审员重复同一操作即可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReviewError::Store(StoreError::Persistence { .. }))
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件解析失败 ({path}): {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("未知的存储后端: {0}")]
    UnknownBackend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type ReviewResult<T> = Result<T, ReviewError>;

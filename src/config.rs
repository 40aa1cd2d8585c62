use crate::error::ConfigError;
use crate::models::SetId;
use serde::Deserialize;
use std::path::Path;

/// 存储后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 直接读写本地 JSONL 文件
    File,
    /// 通过前端开发服务器的补丁接口读写
    Http,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "http" => Ok(StoreBackend::Http),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 题组文件目录（`set_<id>.jsonl`）
    pub data_dir: String,
    /// 启动时打开的题组
    pub start_set: u32,
    /// 跳过的题目是否算作已完成
    pub skip_counts_as_resolved: bool,
    /// 存储后端
    pub backend: StoreBackend,
    // --- HTTP 后端配置 ---
    pub api_base_url: String,
    pub data_url_prefix: String,
    pub request_timeout_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 评审日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            start_set: 1,
            skip_counts_as_resolved: false,
            backend: StoreBackend::File,
            api_base_url: "http://localhost:3101".to_string(),
            data_url_prefix: "/data".to_string(),
            request_timeout_secs: 10,
            verbose_logging: false,
            output_log_file: "review_log.txt".to_string(),
        }
    }
}

impl Config {
    pub fn start_set_id(&self) -> SetId {
        SetId::new(self.start_set)
    }

    /// 从 TOML 文件加载，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 仅从环境变量加载
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 加载配置：`REVIEW_CONFIG` 指向的 TOML 文件（可选）+ 环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("REVIEW_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(self.data_dir),
            start_set: std::env::var("START_SET").ok().and_then(|v| v.parse().ok()).unwrap_or(self.start_set),
            skip_counts_as_resolved: std::env::var("SKIP_COUNTS_AS_RESOLVED").ok().and_then(|v| v.parse().ok()).unwrap_or(self.skip_counts_as_resolved),
            backend: std::env::var("STORE_BACKEND").ok().and_then(|v| v.parse().ok()).unwrap_or(self.backend),
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(self.api_base_url),
            data_url_prefix: std::env::var("DATA_URL_PREFIX").unwrap_or(self.data_url_prefix),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.request_timeout_secs),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
        }
    }
}

//! # Pairwise Review
//!
//! 一个用于对比两条模型回答、记录评审偏好的命令行工具
//!
//! ## 架构设计
//!
//! ### ① 数据层（Models）
//! - `models/` - 记录、结论、题组编号
//!
//! ### ② 存储层（Store）
//! - `store/` - 加载题组、按位置部分更新记录
//! - `JsonlStore` - 本地 `set_<id>.jsonl` 文件，原子写入
//! - `HttpStore` - 通过补丁接口读写
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 决定当前题目以及作答 / 跳过后的下一道题
//! - `Sequencer` - 持有题组、当前位置
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/review_session` - 终端交互
//! - `orchestrator/app` - 构建存储、运行会话
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, StoreBackend};
pub use error::{ReviewError, StoreError};
pub use models::{Decision, FieldChanges, Record, SetId, Verdict};
pub use orchestrator::{App, ReviewSession};
pub use store::{AnyStore, HttpStore, JsonlStore, RecordStore};
pub use workflow::{Current, Sequencer, SequencerOptions};

//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 按配置构建存储后端（本地文件 / HTTP）
//! - 打开起始题组
//! - 输出会话统计
//!
//! ### `review_session` - 终端评审会话
//! - 渲染当前题目和进度
//! - 把命令映射为出题器操作
//! - 错误只提示、不退出
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! review_session (处理输入输出)
//!     ↓
//! workflow::Sequencer (决定下一道题)
//!     ↓
//! store (持久化：JSONL 文件 / HTTP 补丁接口)
//! ```

pub mod app;
pub mod review_session;

pub use app::App;
pub use review_session::{Command, ReviewSession, SessionStats};

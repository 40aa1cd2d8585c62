/// 日志工具模块
///
/// 提供日志初始化、评审日志文件和输出辅助函数
use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::{Decision, SetId, SetSummary};

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info。
/// 日志输出到 stderr，stdout 留给评审界面
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 初始化评审日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n评审日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 追加一条评审记录
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `set_id`: 题组编号
/// - `position`: 题目位置（从 0 开始）
/// - `decision`: 结论
pub fn append_decision(
    log_file_path: &str,
    set_id: SetId,
    position: usize,
    decision: Decision,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;

    writeln!(
        file,
        "[{}] 题组 {} | 第 {} 题 | {}",
        chrono::Local::now().format("%H:%M:%S"),
        set_id,
        position + 1,
        decision
    )?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(data_location: &str, start_set: SetId) {
    info!("{}", "=".repeat(60));
    info!("🚀 评审程序启动");
    info!("📁 数据位置: {}", data_location);
    info!("📋 起始题组: {}", start_set);
    info!("{}", "=".repeat(60));
}

/// 记录题组加载信息
pub fn log_set_loaded(set_id: SetId, summary: &SetSummary) {
    info!("✓ 题组 {} 加载完成: {}", set_id, summary);
}

/// 记录题组完成信息
pub fn log_set_complete(set_id: SetId, summary: &SetSummary) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 题组 {} 完成: {}", set_id, summary);
    info!("{}", "─".repeat(60));
}

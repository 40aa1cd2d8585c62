//! 应用入口 - 编排层
//!
//! 负责按配置构建存储、打开起始题组，并在标准输入输出上运行评审会话

use anyhow::{Context, Result};
use tokio::io::{self, BufReader};
use tracing::{info, warn};

use crate::config::{Config, StoreBackend};
use crate::orchestrator::review_session::{ReviewSession, SessionStats};
use crate::store::{AnyStore, HttpStore, JsonlStore};
use crate::utils::logging;
use crate::workflow::{Sequencer, SequencerOptions};

/// 应用主结构
pub struct App {
    config: Config,
    sequencer: Sequencer<AnyStore>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        if let Err(e) = logging::init_log_file(&config.output_log_file) {
            warn!("⚠️ 无法初始化评审日志 {}: {}", config.output_log_file, e);
        }

        let store = build_store(&config).await?;
        let location = match config.backend {
            StoreBackend::File => config.data_dir.clone(),
            StoreBackend::Http => format!("{}{}", config.api_base_url, config.data_url_prefix),
        };
        logging::log_startup(&location, config.start_set_id());

        let options = SequencerOptions {
            skip_counts_as_resolved: config.skip_counts_as_resolved,
        };
        let sequencer = Sequencer::open(store, config.start_set_id(), options)
            .await
            .with_context(|| format!("无法打开题组 {}", config.start_set_id()))?;

        Ok(Self { config, sequencer })
    }

    /// 在标准输入输出上运行评审会话
    pub async fn run(self) -> Result<SessionStats> {
        let input = BufReader::new(io::stdin());
        let mut session = ReviewSession::new(self.sequencer, input, io::stdout())
            .with_log_file(self.config.output_log_file.clone());

        let stats = session.run().await?;
        print_final_stats(&stats, &self.config);
        Ok(stats)
    }
}

/// 按配置构建存储后端
async fn build_store(config: &Config) -> Result<AnyStore> {
    match config.backend {
        StoreBackend::File => {
            let store = JsonlStore::new(&config.data_dir);
            match store.list_sets().await {
                Ok(set_ids) => info!("✓ 找到 {} 个题组", set_ids.len()),
                Err(e) => warn!("⚠️ 无法扫描数据目录 {}: {}", config.data_dir, e),
            }
            Ok(AnyStore::File(store))
        }
        StoreBackend::Http => {
            let store = HttpStore::from_config(config).context("无法创建 HTTP 客户端")?;
            Ok(AnyStore::Http(store))
        }
    }
}

fn print_final_stats(stats: &SessionStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 本次评审统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 作答: {}", stats.decided);
    info!("⏭ 跳过: {}", stats.skipped);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
}

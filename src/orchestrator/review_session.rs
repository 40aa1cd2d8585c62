//! 终端评审会话 - 编排层
//!
//! ## 职责
//!
//! 1. **渲染**：显示当前题目、进度和可用命令
//! 2. **命令解析**：把输入映射为出题器操作
//! 3. **错误提示**：所有错误都只提示不退出，位置不变，重复操作即可重试
//! 4. **统计输出**：记录作答 / 跳过 / 失败数量

use anyhow::Result;
use phf::phf_map;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, warn};

use crate::error::ReviewError;
use crate::models::{Decision, Verdict};
use crate::store::RecordStore;
use crate::utils::logging;
use crate::workflow::{Current, Sequencer};

/// 会话命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ChooseA,
    ChooseB,
    Neither,
    Skip,
    SkipRemaining,
    NextSet,
    Reload,
    Help,
    Quit,
}

static COMMANDS: phf::Map<&'static str, Command> = phf_map! {
    "a" => Command::ChooseA,
    "1" => Command::ChooseA,
    "left" => Command::ChooseA,
    "b" => Command::ChooseB,
    "2" => Command::ChooseB,
    "right" => Command::ChooseB,
    "n" => Command::Neither,
    "3" => Command::Neither,
    "up" => Command::Neither,
    "s" => Command::Skip,
    "down" => Command::Skip,
    "skip-all" => Command::SkipRemaining,
    "next" => Command::NextSet,
    "reload" => Command::Reload,
    "h" => Command::Help,
    "help" => Command::Help,
    "q" => Command::Quit,
    "quit" => Command::Quit,
};

impl Command {
    pub fn parse(input: &str) -> Option<Command> {
        COMMANDS.get(input.trim().to_lowercase().as_str()).copied()
    }
}

const HELP: &str = "\
命令:
  a / 1 / left    选择回答 1
  b / 2 / right   选择回答 2
  n / 3 / up      都不好（需要填写反馈）
  s / down        跳过当前题
  skip-all        跳过本组剩余的题
  next            加载下一组题目
  reload          重新读取当前题组
  q               退出
";

/// 会话统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub decided: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 终端评审会话
pub struct ReviewSession<S, R, W> {
    sequencer: Sequencer<S>,
    input: R,
    output: W,
    log_file: Option<String>,
    stats: SessionStats,
}

impl<S, R, W> ReviewSession<S, R, W>
where
    S: RecordStore,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(sequencer: Sequencer<S>, input: R, output: W) -> Self {
        Self {
            sequencer,
            input,
            output,
            log_file: None,
            stats: SessionStats::default(),
        }
    }

    /// 每次作答追加到评审日志文件
    pub fn with_log_file(mut self, path: impl Into<String>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn sequencer(&self) -> &Sequencer<S> {
        &self.sequencer
    }

    pub fn into_parts(self) -> (Sequencer<S>, W) {
        (self.sequencer, self.output)
    }

    /// 运行会话，直到输入结束或收到退出命令
    pub async fn run(&mut self) -> Result<SessionStats> {
        self.render().await?;

        while let Some(line) = self.read_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(command) = Command::parse(&line) else {
                self.print(&format!("未知命令: {}（输入 h 查看帮助）\n", line.trim()))
                    .await?;
                continue;
            };

            match command {
                Command::Quit => break,
                Command::Help => {
                    self.print(HELP).await?;
                    continue;
                }
                Command::ChooseA => self.decide(Verdict::ChooseA, None).await?,
                Command::ChooseB => self.decide(Verdict::ChooseB, None).await?,
                Command::Neither => {
                    if !matches!(self.sequencer.current(), Current::Record { .. }) {
                        self.print("当前没有可作答的题目\n").await?;
                    } else {
                        self.print("请输入反馈: ").await?;
                        let Some(feedback) = self.read_line().await? else {
                            break;
                        };
                        self.decide(Verdict::Neither, Some(&feedback)).await?;
                    }
                }
                Command::Skip => {
                    let result = self.sequencer.skip().await;
                    if result.is_ok() {
                        self.stats.skipped += 1;
                    }
                    self.report(result).await?;
                }
                Command::SkipRemaining => {
                    let result = self.sequencer.skip_remaining().await;
                    if let Ok(count) = result {
                        self.stats.skipped += count;
                        self.print(&format!("⏭ 已跳过剩余 {} 题\n", count)).await?;
                    }
                    self.report(result.map(|_| ())).await?;
                }
                Command::NextSet => {
                    let result = self.sequencer.advance_to_next_set().await;
                    self.report(result.map(|_| ())).await?;
                }
                Command::Reload => {
                    let result = self.sequencer.reload().await;
                    self.report(result).await?;
                }
            }

            self.render().await?;
        }

        self.output.flush().await?;
        Ok(self.stats)
    }

    async fn decide(&mut self, verdict: Verdict, feedback: Option<&str>) -> Result<()> {
        let position = match self.sequencer.current() {
            Current::Record { position, .. } => Some(position),
            _ => None,
        };
        let set_id = self.sequencer.set_id();

        let result = self.sequencer.decide(verdict, feedback).await;
        if result.is_ok() {
            self.stats.decided += 1;
            if let (Some(path), Some(position)) = (&self.log_file, position) {
                if let Err(e) =
                    logging::append_decision(path, set_id, position, Decision::from(verdict))
                {
                    warn!("写入评审日志失败: {}", e);
                }
            }
        }
        self.report(result).await
    }

    /// 错误只提示，不中断会话
    async fn report(&mut self, result: Result<(), ReviewError>) -> Result<()> {
        let Err(e) = result else {
            return Ok(());
        };
        self.stats.failed += 1;

        let message = if e.is_retryable() {
            error!("❌ 保存失败: {}", e);
            format!("❌ 保存失败，请重试: {}\n", e)
        } else {
            format!("⚠️ {}\n", e)
        };
        self.print(&message).await
    }

    async fn render(&mut self) -> Result<()> {
        let text = self.render_text();
        self.print(&text).await
    }

    fn render_text(&self) -> String {
        let progress = self.sequencer.progress();
        match self.sequencer.current() {
            Current::Record { record, .. } => {
                let skip_hint = if self.sequencer.has_skipped()
                    && !self.sequencer.options().skip_counts_as_resolved
                {
                    "（跳过的题稍后会再出现）"
                } else {
                    ""
                };
                format!(
                    "\n{line}\n{progress}\n{line}\n指令:\n{instruction}\n\n回答 1 (a / ←):\n{a}\n\n回答 2 (b / →):\n{b}\n\n[a] 选回答 1  [b] 选回答 2  [n] 都不好  [s] 跳过{skip_hint}  [skip-all] 跳过剩余  [q] 退出\n> ",
                    line = "=".repeat(60),
                    progress = progress,
                    instruction = record.instruction,
                    a = record.response_a,
                    b = record.response_b,
                    skip_hint = skip_hint,
                )
            }
            Current::Complete => format!(
                "\n🎉 题组 {} 已完成！输入 next 加载下一组题目，q 退出\n> ",
                progress.set_id
            ),
            Current::Unavailable => format!(
                "\n题组 {} 暂无数据，准备好 {} 后输入 reload，q 退出\n> ",
                progress.set_id,
                progress.set_id.file_name()
            ),
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.input.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}

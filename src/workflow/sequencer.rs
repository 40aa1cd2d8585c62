//! 出题器 - 流程层
//!
//! 核心职责：决定评审员当前处理哪一道题，并在作答 / 跳过之后推进。
//!
//! - 持有当前题组的全部记录、当前位置
//! - 所有修改都先经过存储层，写入成功后才用存储返回的记录替换内存中的记录
//! - 写入失败时按存储重新同步：存储没有变化则位置和内存状态都不变，评审员重复操作即可重试

use tracing::{debug, info, warn};

use crate::error::{ReviewError, ReviewResult, StoreError};
use crate::models::{Decision, FieldChanges, Record, SetId, SetSummary, Verdict};
use crate::store::RecordStore;
use crate::utils::logging;
use crate::workflow::selection;

/// 出题选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerOptions {
    /// 跳过的题目是否算作已完成（默认 false：跳过的题最终还要作答）
    pub skip_counts_as_resolved: bool,
}

/// 当前题目
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Current<'a> {
    /// 正在处理的题目
    Record { position: usize, record: &'a Record },
    /// 题组已完成
    Complete,
    /// 题组尚不存在（等待数据后 `reload`）
    Unavailable,
}

/// 进度信息，用于界面显示 "题组 N (i / total)"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub set_id: SetId,
    pub position: Option<usize>,
    pub summary: SetSummary,
}

impl Progress {
    /// 从 1 开始的显示序号，完成时为总数
    pub fn display_index(&self) -> usize {
        match self.position {
            Some(position) => (position + 1).min(self.summary.total),
            None => self.summary.total,
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "题组 {} ({} / {})",
            self.set_id,
            self.display_index(),
            self.summary.total
        )
    }
}

/// 出题器
pub struct Sequencer<S> {
    store: S,
    options: SequencerOptions,
    set_id: SetId,
    records: Vec<Record>,
    pointer: Option<usize>,
    loaded: bool,
}

impl<S: RecordStore> Sequencer<S> {
    /// 加载题组并定位到第一道未作答的题
    pub async fn open(store: S, set_id: SetId, options: SequencerOptions) -> ReviewResult<Self> {
        let records = store.load_set(set_id).await?;
        let mut sequencer = Self {
            store,
            options,
            set_id,
            records: Vec::new(),
            pointer: None,
            loaded: false,
        };
        sequencer.install(set_id, records);
        Ok(sequencer)
    }

    /// 重新从存储读取当前题组
    pub async fn reload(&mut self) -> ReviewResult<()> {
        let records = self.store.load_set(self.set_id).await?;
        self.install(self.set_id, records);
        Ok(())
    }

    fn install(&mut self, set_id: SetId, records: Vec<Record>) {
        self.set_id = set_id;
        self.pointer = selection::first_position(&records, self.options.skip_counts_as_resolved);
        self.records = records;
        self.loaded = true;

        let summary = self.summary();
        logging::log_set_loaded(set_id, &summary);
        if summary.is_complete(self.options.skip_counts_as_resolved) {
            info!("题组 {} 没有待作答的题目", set_id);
        }
    }

    pub fn set_id(&self) -> SetId {
        self.set_id
    }

    pub fn options(&self) -> SequencerOptions {
        self.options
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn summary(&self) -> SetSummary {
        SetSummary::from_records(&self.records)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            set_id: self.set_id,
            position: self.pointer,
            summary: self.summary(),
        }
    }

    /// 当前题组中是否有跳过的题
    pub fn has_skipped(&self) -> bool {
        self.records.iter().any(Record::is_skipped)
    }

    pub fn is_complete(&self) -> bool {
        self.loaded && self.pointer.is_none()
    }

    /// 当前题目或完成信号
    pub fn current(&self) -> Current<'_> {
        if !self.loaded {
            return Current::Unavailable;
        }
        match self.pointer {
            Some(position) => Current::Record {
                position,
                record: &self.records[position],
            },
            None => Current::Complete,
        }
    }

    fn current_position(&self) -> ReviewResult<usize> {
        self.pointer.ok_or(ReviewError::SetComplete(self.set_id))
    }

    fn check_transition(&self, position: usize, to: Decision) -> ReviewResult<()> {
        let from = self.records[position].decision();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(ReviewError::IllegalTransition { position, from, to })
        }
    }

    /// 对当前题作答
    ///
    /// 选择"都不好"时 `feedback` 必须非空，其他结论忽略 `feedback`
    pub async fn decide(&mut self, verdict: Verdict, feedback: Option<&str>) -> ReviewResult<()> {
        let position = self.current_position()?;
        let decision = Decision::from(verdict);

        let mut changes = FieldChanges::decision(decision);
        if verdict == Verdict::Neither {
            let text = feedback
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or(ReviewError::MissingFeedback)?;
            changes = changes.with_feedback(text);
        }
        self.check_transition(position, decision)?;

        let updated = match self.store.apply_update(self.set_id, position, &changes).await {
            Ok(record) => record,
            Err(e) => return Err(self.handle_store_error(position, e).await),
        };
        self.records[position] = updated;

        debug!("题组 {} 第 {} 题: {}", self.set_id, position + 1, decision);
        self.pointer = selection::next_position(
            &self.records,
            position,
            self.options.skip_counts_as_resolved,
        );
        self.log_if_complete();
        Ok(())
    }

    /// 跳过当前题
    ///
    /// 未作答的题会立即写入"已跳过"；已跳过的题再次跳过时不写入，直接切到下一道已跳过的题
    pub async fn skip(&mut self) -> ReviewResult<()> {
        let position = self.current_position()?;

        if self.records[position].is_skipped() {
            self.pointer = selection::next_skipped_after(&self.records, position);
            return Ok(());
        }

        self.check_transition(position, Decision::Skipped)?;
        let changes = FieldChanges::decision(Decision::Skipped);
        let updated = match self.store.apply_update(self.set_id, position, &changes).await {
            Ok(record) => record,
            Err(e) => return Err(self.handle_store_error(position, e).await),
        };
        self.records[position] = updated;

        debug!("题组 {} 第 {} 题已跳过", self.set_id, position + 1);
        self.pointer = selection::next_position(
            &self.records,
            position,
            self.options.skip_counts_as_resolved,
        );
        self.log_if_complete();
        Ok(())
    }

    /// 一次性把剩余未作答的题全部标记为跳过，并结束当前题组
    pub async fn skip_remaining(&mut self) -> ReviewResult<usize> {
        let updates: Vec<(usize, FieldChanges)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_unset())
            .map(|(position, _)| (position, FieldChanges::decision(Decision::Skipped)))
            .collect();

        if !updates.is_empty() {
            let updated = match self.store.apply_updates(self.set_id, &updates).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("⚠️ 题组 {} 批量跳过失败: {}", self.set_id, e);
                    self.resync(&e).await;
                    return Err(e.into());
                }
            };
            for ((position, _), record) in updates.iter().zip(updated) {
                self.records[*position] = record;
            }
        }

        info!("⏭ 题组 {} 剩余 {} 题已全部跳过", self.set_id, updates.len());
        self.pointer = None;
        Ok(updates.len())
    }

    /// 切换到下一个还有未作答题目的题组
    ///
    /// 已全部作答的题组会被直接跳过。遇到不存在的题组时，
    /// 选中该编号并返回 `NotFound`，数据准备好后调用 `reload`。
    pub async fn advance_to_next_set(&mut self) -> ReviewResult<SetId> {
        let mut candidate = self.set_id.next();
        loop {
            match self.store.load_set(candidate).await {
                Ok(records) if SetSummary::from_records(&records).has_unset() => {
                    self.install(candidate, records);
                    return Ok(candidate);
                }
                Ok(_) => {
                    debug!("题组 {} 已全部作答，继续查找", candidate);
                    candidate = candidate.next();
                }
                Err(e) if e.is_not_found() => {
                    warn!("⚠️ 题组 {} 不存在", candidate);
                    self.set_id = candidate;
                    self.records.clear();
                    self.pointer = None;
                    self.loaded = false;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn handle_store_error(&mut self, position: usize, err: StoreError) -> ReviewError {
        warn!(
            "⚠️ 题组 {} 第 {} 题保存失败: {}",
            self.set_id,
            position + 1,
            err
        );
        self.resync(&err).await;
        ReviewError::from(err)
    }

    /// 写入失败后按存储重新同步内存中的记录
    ///
    /// HTTP 后端逐条提交，失败时前面的修改可能已经生效。
    /// 当前题在存储中没有变化时位置不变，否则按出题顺序前进。
    async fn resync(&mut self, err: &StoreError) {
        if !matches!(err, StoreError::Persistence { .. }) {
            return;
        }
        let records = match self.store.load_set(self.set_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!("⚠️ 题组 {} 重新读取失败: {}", self.set_id, e);
                return;
            }
        };
        if records == self.records {
            return;
        }
        if records.len() != self.records.len() {
            self.install(self.set_id, records);
            return;
        }

        info!("题组 {} 部分修改已写入，已按存储同步", self.set_id);
        let skip_counts = self.options.skip_counts_as_resolved;
        self.pointer = match self.pointer {
            Some(position) if records[position] == self.records[position] => Some(position),
            Some(position) => selection::next_position(&records, position, skip_counts),
            None => selection::first_position(&records, skip_counts),
        };
        self.records = records;
    }

    fn log_if_complete(&self) {
        if self.pointer.is_none() {
            logging::log_set_complete(self.set_id, &self.summary());
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 评审结论（存储层的 `flag` 字段）
///
/// 文件中的取值：`null` = 未作答，`0` = 选 A，`1` = 选 B，`2` = 都不好，`3` = 已跳过
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<u8>", into = "Option<u8>")]
pub enum Decision {
    /// 未作答
    #[default]
    Unset,
    /// 选择回答 A
    ChooseA,
    /// 选择回答 B
    ChooseB,
    /// 两个都不好（必须附带反馈）
    Neither,
    /// 已跳过，稍后还会再出现
    Skipped,
}

impl Decision {
    /// 转换为存储层的 flag 值
    pub fn to_flag(self) -> Option<u8> {
        match self {
            Decision::Unset => None,
            Decision::ChooseA => Some(0),
            Decision::ChooseB => Some(1),
            Decision::Neither => Some(2),
            Decision::Skipped => Some(3),
        }
    }

    /// 从存储层的 flag 值解析
    pub fn from_flag(flag: Option<u8>) -> Option<Self> {
        match flag {
            None => Some(Decision::Unset),
            Some(0) => Some(Decision::ChooseA),
            Some(1) => Some(Decision::ChooseB),
            Some(2) => Some(Decision::Neither),
            Some(3) => Some(Decision::Skipped),
            Some(_) => None,
        }
    }

    /// 是否为最终结论（选 A / 选 B / 都不好）
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Decision::ChooseA | Decision::ChooseB | Decision::Neither
        )
    }

    /// 允许的状态迁移
    ///
    /// `Unset` 可以去任何其他状态；`Skipped` 只能被最终结论覆盖；最终结论不可再改。
    pub fn allowed_transitions(self) -> &'static [Decision] {
        use Decision::*;
        match self {
            Unset => &[ChooseA, ChooseB, Neither, Skipped],
            Skipped => &[ChooseA, ChooseB, Neither],
            ChooseA | ChooseB | Neither => &[],
        }
    }

    pub fn can_transition_to(self, next: Decision) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl TryFrom<Option<u8>> for Decision {
    type Error = String;

    fn try_from(flag: Option<u8>) -> Result<Self, Self::Error> {
        Decision::from_flag(flag).ok_or_else(|| format!("未知的 flag 值: {:?}", flag))
    }
}

impl From<Decision> for Option<u8> {
    fn from(decision: Decision) -> Self {
        decision.to_flag()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::Unset => "未作答",
            Decision::ChooseA => "选 A",
            Decision::ChooseB => "选 B",
            Decision::Neither => "都不好",
            Decision::Skipped => "已跳过",
        };
        f.write_str(label)
    }
}

/// 评审员可以给出的最终结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    ChooseA,
    ChooseB,
    Neither,
}

impl From<Verdict> for Decision {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::ChooseA => Decision::ChooseA,
            Verdict::ChooseB => Decision::ChooseB,
            Verdict::Neither => Decision::Neither,
        }
    }
}

/// 一条对比记录：一条指令 + 两个候选回答 + 评审结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(alias = "instruct")]
    pub instruction: String,

    #[serde(rename = "output-o1")]
    pub response_a: String,

    #[serde(rename = "output-qwen")]
    pub response_b: String,

    #[serde(default)]
    pub flag: Decision,

    #[serde(rename = "Feedback", default)]
    pub feedback: Option<String>,

    /// 行内其他字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(
        instruction: impl Into<String>,
        response_a: impl Into<String>,
        response_b: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            response_a: response_a.into(),
            response_b: response_b.into(),
            flag: Decision::Unset,
            feedback: None,
            extra: Map::new(),
        }
    }

    pub fn decision(&self) -> Decision {
        self.flag
    }

    pub fn is_unset(&self) -> bool {
        self.flag == Decision::Unset
    }

    pub fn is_skipped(&self) -> bool {
        self.flag == Decision::Skipped
    }

    /// 解析单行 JSON
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// 对单条记录的部分更新
///
/// 只会写入显式指定的字段，其余字段保持原值。
/// 文本字段（指令、两个回答）不可更新。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    decision: Option<Decision>,
    feedback: Option<String>,
}

impl FieldChanges {
    /// 只更新结论
    pub fn decision(decision: Decision) -> Self {
        Self {
            decision: Some(decision),
            feedback: None,
        }
    }

    /// 附带反馈文本
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// 转换为存储层的 JSON 字段（`flag` / `Feedback`）
    pub fn to_json(&self) -> Map<String, Value> {
        let mut updates = Map::new();
        if let Some(decision) = self.decision {
            updates.insert(
                "flag".to_string(),
                decision.to_flag().map(Value::from).unwrap_or(Value::Null),
            );
        }
        if let Some(feedback) = &self.feedback {
            updates.insert("Feedback".to_string(), Value::String(feedback.clone()));
        }
        updates
    }

    /// 浅合并到一个 JSON 对象上
    pub fn merge_into(&self, target: &mut Map<String, Value>) {
        for (key, value) in self.to_json() {
            target.insert(key, value);
        }
    }
}

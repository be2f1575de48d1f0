//! 评分快照与重算差异

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::analysis::PageAnalysisResult;
use crate::models::issue::Issue;
use crate::models::overrides::OverrideRecord;
use crate::models::rubric::RubricKey;

/// 单个组成部分的得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub points: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// 一次评分的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringOutput {
    pub total_score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentScore>,
    #[serde(default)]
    pub bonus: BTreeMap<String, ComponentScore>,
    /// 问题 → 评分项 → 分数
    #[serde(default)]
    pub issue_scores: BTreeMap<String, BTreeMap<RubricKey, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scored_at: Option<String>,
}

/// 提交给评分方的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    pub job_id: String,
    pub pages: Vec<PageAnalysisResult>,
    pub overrides: Vec<OverrideRecord>,
    pub issues: Vec<Issue>,
    /// TA 针对评分项写的意见，供本次评分使用
    pub rubric_comments: BTreeMap<String, String>,
}

/// 总分变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub old: f64,
    pub new: f64,
    pub delta: f64,
}

/// 某组成部分的变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentChange {
    pub component: String,
    pub old: f64,
    pub new: f64,
    pub delta: f64,
}

/// 两次评分之间的差异
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringDiff {
    pub overall_score_change: ScoreChange,
    pub component_changes: Vec<ComponentChange>,
    pub bonus_changes: Vec<ComponentChange>,
}

impl ScoringDiff {
    pub fn is_unchanged(&self) -> bool {
        self.overall_score_change.delta == 0.0
            && self.component_changes.is_empty()
            && self.bonus_changes.is_empty()
    }
}

/// 重算结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeOutcome {
    pub scoring: ScoringOutput,
    pub changes: ScoringDiff,
}

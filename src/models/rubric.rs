//! 评分细则（Rubric）
//!
//! 10 个固定评分项及其满分。满分是细则常量，分析结果里的 `max` 不可信，
//! 一律以这里为准。

use std::collections::BTreeMap;
use std::fmt;

use phf::phf_map;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// 各评分项满分
static RUBRIC_MAX: phf::Map<&'static str, f64> = phf_map! {
    "coverage" => 15.0,
    "violation_quality" => 20.0,
    "screenshots" => 10.0,
    "severity_analysis" => 10.0,
    "structure_navigation" => 10.0,
    "professional_quality" => 10.0,
    "writing_quality" => 10.0,
    "group_integration" => 15.0,
    "bonus_ai_opportunities" => 3.0,
    "bonus_exceptional_quality" => 2.0,
};

/// 基础分满分
pub const BASE_MAX_SCORE: f64 = 100.0;
/// 加分项满分
pub const BONUS_MAX_SCORE: f64 = 5.0;
/// 覆盖度满分所需的不同启发式数量
pub const REQUIRED_HEURISTICS: usize = 10;
/// 覆盖度满分所需的违规条目数量
pub const REQUIRED_VIOLATIONS: usize = 12;

/// 评分项
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricKey {
    Coverage,
    ViolationQuality,
    Screenshots,
    SeverityAnalysis,
    StructureNavigation,
    ProfessionalQuality,
    WritingQuality,
    GroupIntegration,
    BonusAiOpportunities,
    BonusExceptionalQuality,
}

impl RubricKey {
    /// 全部评分项（固定顺序）
    pub const ALL: [RubricKey; 10] = [
        RubricKey::Coverage,
        RubricKey::ViolationQuality,
        RubricKey::Screenshots,
        RubricKey::SeverityAnalysis,
        RubricKey::StructureNavigation,
        RubricKey::ProfessionalQuality,
        RubricKey::WritingQuality,
        RubricKey::GroupIntegration,
        RubricKey::BonusAiOpportunities,
        RubricKey::BonusExceptionalQuality,
    ];

    /// 计入基础分的 8 项
    pub const BASE: [RubricKey; 8] = [
        RubricKey::Coverage,
        RubricKey::ViolationQuality,
        RubricKey::Screenshots,
        RubricKey::SeverityAnalysis,
        RubricKey::StructureNavigation,
        RubricKey::ProfessionalQuality,
        RubricKey::WritingQuality,
        RubricKey::GroupIntegration,
    ];

    /// 加分项
    pub const BONUS: [RubricKey; 2] = [
        RubricKey::BonusAiOpportunities,
        RubricKey::BonusExceptionalQuality,
    ];

    /// 获取标准名称
    pub fn as_str(self) -> &'static str {
        match self {
            RubricKey::Coverage => "coverage",
            RubricKey::ViolationQuality => "violation_quality",
            RubricKey::Screenshots => "screenshots",
            RubricKey::SeverityAnalysis => "severity_analysis",
            RubricKey::StructureNavigation => "structure_navigation",
            RubricKey::ProfessionalQuality => "professional_quality",
            RubricKey::WritingQuality => "writing_quality",
            RubricKey::GroupIntegration => "group_integration",
            RubricKey::BonusAiOpportunities => "bonus_ai_opportunities",
            RubricKey::BonusExceptionalQuality => "bonus_exceptional_quality",
        }
    }

    /// 从名称解析
    pub fn from_str(name: &str) -> Option<Self> {
        RubricKey::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// 满分
    pub fn max_points(self) -> f64 {
        RUBRIC_MAX.get(self.as_str()).copied().unwrap_or(0.0)
    }

    pub fn is_bonus(self) -> bool {
        RubricKey::BONUS.contains(&self)
    }

    /// 所属分区（score_breakdown / bonus_scores）
    pub fn section(self) -> ScoreSection {
        if self.is_bonus() {
            ScoreSection::BonusScores
        } else {
            ScoreSection::ScoreBreakdown
        }
    }
}

impl fmt::Display for RubricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分数所在分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreSection {
    ScoreBreakdown,
    BonusScores,
}

impl ScoreSection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreSection::ScoreBreakdown => "score_breakdown",
            ScoreSection::BonusScores => "bonus_scores",
        }
    }
}

/// 单项得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    #[serde(default)]
    pub points: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ScoreEntry {
    pub fn new(key: RubricKey, points: f64, comment: Option<String>) -> Self {
        Self {
            points,
            max: key.max_points(),
            comment,
        }
    }

    /// 满分改为细则常量，分数截断到 [0, max]
    pub fn normalized(mut self, key: RubricKey) -> Self {
        self.max = key.max_points();
        self.points = clamp_points(self.points, self.max);
        self
    }
}

/// 分数截断到 [0, max]，非有限值视为 0
pub fn clamp_points(points: f64, max: f64) -> f64 {
    if points.is_finite() {
        points.clamp(0.0, max)
    } else {
        0.0
    }
}

/// 评分项 → 得分
pub type ScoreMap = BTreeMap<RubricKey, ScoreEntry>;

/// 反序列化分数表：未知评分项记录警告后丢弃，不让整页失败
pub fn deserialize_score_map<'de, D>(deserializer: D) -> Result<ScoreMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, ScoreEntry>> = Option::deserialize(deserializer)?;
    let mut map = ScoreMap::new();
    for (name, entry) in raw.unwrap_or_default() {
        match RubricKey::from_str(&name) {
            Some(key) => {
                map.insert(key, entry);
            }
            None => warn!("⚠️ 忽略未知评分项: {}", name),
        }
    }
    Ok(map)
}

/// 反序列化「评分项 → 任意值」的表，同样丢弃未知评分项
pub fn deserialize_keyed<'de, D, T>(deserializer: D) -> Result<BTreeMap<RubricKey, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<BTreeMap<String, T>> = Option::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for (name, value) in raw.unwrap_or_default() {
        match RubricKey::from_str(&name) {
            Some(key) => {
                map.insert(key, value);
            }
            None => warn!("⚠️ 忽略未知评分项: {}", name),
        }
    }
    Ok(map)
}

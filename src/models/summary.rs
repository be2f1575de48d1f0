//! 作业级汇总结果

use serde::{Deserialize, Serialize};

use crate::models::rubric::{RubricKey, ScoreEntry};

/// 固定 10 项的汇总得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryScores {
    pub coverage: ScoreEntry,
    pub violation_quality: ScoreEntry,
    pub screenshots: ScoreEntry,
    pub severity_analysis: ScoreEntry,
    pub structure_navigation: ScoreEntry,
    pub professional_quality: ScoreEntry,
    pub writing_quality: ScoreEntry,
    pub group_integration: ScoreEntry,
    pub bonus_ai_opportunities: ScoreEntry,
    pub bonus_exceptional_quality: ScoreEntry,
}

impl SummaryScores {
    /// 由评分项 → 得分的函数构建
    pub fn from_fn(mut entry: impl FnMut(RubricKey) -> ScoreEntry) -> Self {
        Self {
            coverage: entry(RubricKey::Coverage),
            violation_quality: entry(RubricKey::ViolationQuality),
            screenshots: entry(RubricKey::Screenshots),
            severity_analysis: entry(RubricKey::SeverityAnalysis),
            structure_navigation: entry(RubricKey::StructureNavigation),
            professional_quality: entry(RubricKey::ProfessionalQuality),
            writing_quality: entry(RubricKey::WritingQuality),
            group_integration: entry(RubricKey::GroupIntegration),
            bonus_ai_opportunities: entry(RubricKey::BonusAiOpportunities),
            bonus_exceptional_quality: entry(RubricKey::BonusExceptionalQuality),
        }
    }

    pub fn get(&self, key: RubricKey) -> &ScoreEntry {
        match key {
            RubricKey::Coverage => &self.coverage,
            RubricKey::ViolationQuality => &self.violation_quality,
            RubricKey::Screenshots => &self.screenshots,
            RubricKey::SeverityAnalysis => &self.severity_analysis,
            RubricKey::StructureNavigation => &self.structure_navigation,
            RubricKey::ProfessionalQuality => &self.professional_quality,
            RubricKey::WritingQuality => &self.writing_quality,
            RubricKey::GroupIntegration => &self.group_integration,
            RubricKey::BonusAiOpportunities => &self.bonus_ai_opportunities,
            RubricKey::BonusExceptionalQuality => &self.bonus_exceptional_quality,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RubricKey, &ScoreEntry)> {
        RubricKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }
}

/// 作业级汇总
///
/// 纯函数结果，只做缓存，不作为事实来源持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub scores: SummaryScores,
    pub base_score: f64,
    pub bonus_score: f64,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub analyzed_pages: usize,
    pub skipped_pages: usize,
    pub total_heuristics_count: usize,
    pub total_violations_count: usize,
    pub unique_heuristics_count: usize,
    /// 分析失败、未计入汇总的页
    #[serde(default)]
    pub failed_pages: Vec<u32>,
}

/// 已发布的最终成绩
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGrade {
    pub final_grade: f64,
    pub max_grade: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_round_trip() {
        let scores = SummaryScores::from_fn(|key| ScoreEntry::new(key, key.max_points() / 2.0, None));
        let summary = AssignmentSummary {
            scores,
            base_score: 50.0,
            bonus_score: 2.5,
            total_score: 52.5,
            max_score: 100.0,
            percentage: 50.0,
            analyzed_pages: 3,
            skipped_pages: 1,
            total_heuristics_count: 4,
            total_violations_count: 5,
            unique_heuristics_count: 3,
            failed_pages: vec![7],
        };
        let text = serde_json::to_string(&summary).unwrap();
        assert!(text.contains("\"baseScore\":50.0"));
        let back: AssignmentSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_iter_follows_rubric_order() {
        let scores = SummaryScores::from_fn(|key| ScoreEntry::new(key, 0.0, None));
        let keys: Vec<RubricKey> = scores.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, RubricKey::ALL.to_vec());
    }
}

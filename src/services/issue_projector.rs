//! 问题级分数推算 - 业务能力层
//!
//! 问题没有显式分数时，用其涉及页的评分项相关度推算。
//! 与作业级汇总不同，这里取平均而不是最大值。

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::rubric::clamp_points;
use crate::models::{Issue, PageAnalysisResult, PageRole, RubricKey};

/// 问题级分数
pub type IssueScores = BTreeMap<RubricKey, f64>;

#[derive(Debug, Clone, Copy, Default)]
pub struct IssueScoreProjector;

impl IssueScoreProjector {
    pub fn new() -> Self {
        Self
    }

    /// 推算单个问题的分数
    ///
    /// - 显式分数优先（截断到满分）
    /// - 涉及页中有 `violation_detail` 角色的只用这些页，否则用全部涉及页
    /// - 每个评分项只对给出了相关度的页取平均；没有任何页给出的评分项不输出
    pub fn project(&self, issue: &Issue, pages: &HashMap<u32, &PageAnalysisResult>) -> IssueScores {
        if !issue.scores.is_empty() {
            return issue
                .scores
                .iter()
                .map(|(&key, &points)| (key, clamp_points(points, key.max_points())))
                .collect();
        }

        let involved: Vec<&PageAnalysisResult> = issue
            .pages_involved
            .iter()
            .filter_map(|number| pages.get(number).copied())
            .collect();
        let detail: Vec<&PageAnalysisResult> = involved
            .iter()
            .copied()
            .filter(|page| page.page_role == Some(PageRole::ViolationDetail))
            .collect();
        let selected = if detail.is_empty() { involved } else { detail };

        let mut scores = IssueScores::new();
        for key in RubricKey::ALL {
            let hints: Vec<f64> = selected
                .iter()
                .filter_map(|page| page.rubric_relevance.get(&key))
                .map(|level| level.points(key.max_points()))
                .collect();
            if hints.is_empty() {
                continue;
            }
            let average = hints.iter().sum::<f64>() / hints.len() as f64;
            scores.insert(key, average);
        }

        debug!(
            "问题 {} 推算完成: {} 页参与, {} 个评分项",
            issue.issue_id,
            selected.len(),
            scores.len()
        );
        scores
    }

    /// 推算全部问题（失败页不参与）
    pub fn project_all(
        &self,
        issues: &[Issue],
        results: &[PageAnalysisResult],
    ) -> BTreeMap<String, IssueScores> {
        let pages: HashMap<u32, &PageAnalysisResult> = results
            .iter()
            .filter(|page| !page.is_error())
            .map(|page| (page.page_number, page))
            .collect();
        issues
            .iter()
            .map(|issue| (issue.issue_id.clone(), self.project(issue, &pages)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelevanceLevel;

    fn page(number: u32, role: Option<PageRole>, hints: &[(RubricKey, RelevanceLevel)]) -> PageAnalysisResult {
        let mut page = PageAnalysisResult::new(number);
        page.page_role = role;
        page.rubric_relevance = hints.iter().copied().collect();
        page
    }

    fn issue(pages: &[u32]) -> Issue {
        Issue {
            issue_id: "issue-1".to_string(),
            heuristic_id: "H4".to_string(),
            pages_involved: pages.to_vec(),
            ai_proposed_severity: "major".to_string(),
            ta_review: None,
            scores: BTreeMap::new(),
        }
    }

    #[test]
    fn test_average_over_detail_pages() {
        let results = vec![
            page(
                1,
                Some(PageRole::ViolationDetail),
                &[(RubricKey::ViolationQuality, RelevanceLevel::High)],
            ),
            page(
                2,
                Some(PageRole::ViolationDetail),
                &[(RubricKey::ViolationQuality, RelevanceLevel::Low)],
            ),
            page(
                3,
                Some(PageRole::Overview),
                &[(RubricKey::ViolationQuality, RelevanceLevel::None)],
            ),
        ];
        let scores = IssueScoreProjector::new().project_all(&[issue(&[1, 2, 3])], &results);
        // (20 + 8) / 2，总览页不参与
        assert_eq!(scores["issue-1"][&RubricKey::ViolationQuality], 14.0);
    }

    #[test]
    fn test_all_pages_used_without_detail_role() {
        let results = vec![
            page(1, None, &[(RubricKey::Screenshots, RelevanceLevel::High)]),
            page(
                2,
                Some(PageRole::Overview),
                &[(RubricKey::Screenshots, RelevanceLevel::Med)],
            ),
        ];
        let scores = IssueScoreProjector::new().project_all(&[issue(&[1, 2])], &results);
        assert_eq!(scores["issue-1"][&RubricKey::Screenshots], 8.5);
    }

    #[test]
    fn test_keys_without_hints_are_omitted() {
        let results = vec![
            page(1, None, &[(RubricKey::Screenshots, RelevanceLevel::High)]),
            page(2, None, &[]),
        ];
        let scores = IssueScoreProjector::new().project_all(&[issue(&[1, 2])], &results);
        // 第 2 页没有提示，不拉低平均值
        assert_eq!(scores["issue-1"][&RubricKey::Screenshots], 10.0);
        assert!(!scores["issue-1"].contains_key(&RubricKey::Coverage));
    }

    #[test]
    fn test_explicit_scores_win() {
        let mut explicit = issue(&[1]);
        explicit.scores.insert(RubricKey::SeverityAnalysis, 12.0);
        let results = vec![page(
            1,
            None,
            &[(RubricKey::SeverityAnalysis, RelevanceLevel::Low)],
        )];
        let scores = IssueScoreProjector::new().project_all(&[explicit], &results);
        assert_eq!(scores["issue-1"][&RubricKey::SeverityAnalysis], 10.0);
    }
}

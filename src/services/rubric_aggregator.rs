//! 评分汇总 - 业务能力层
//!
//! 把一个作业的所有页分析结果与覆盖记录合成为一份作业级汇总。
//!
//! 规则：
//! 1. 跳过的页（有效 `skip_analysis` 为真或没有评分）不参与取最大
//! 2. 除覆盖度外，每个评分项取所有已分析页中有效分数的最大值，说明取自提供该最大值的页
//! 3. 覆盖度按全作业统计计算；人工覆盖过覆盖度分数时以人工为准
//! 4. 分析失败的页完全排除，单独列出

use tracing::debug;

use crate::models::rubric::{clamp_points, BASE_MAX_SCORE};
use crate::models::{
    AssignmentSummary, FieldPath, PageAnalysisResult, RubricKey, ScoreEntry, SummaryScores,
};
use crate::services::coverage::{default_extractors, CoverageExtractor, CoverageInput, CoverageTally};
use crate::services::effective_value::OverrideIndex;

const OVERRIDDEN_COVERAGE_COMMENT: &str = "Coverage set by reviewer override";

/// 评分汇总器
pub struct RubricAggregator {
    extractors: Vec<Box<dyn CoverageExtractor>>,
}

impl Default for RubricAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RubricAggregator {
    pub fn new() -> Self {
        Self {
            extractors: default_extractors(),
        }
    }

    /// 使用自定义的覆盖度统计策略（按顺序尝试）
    pub fn with_extractors(extractors: Vec<Box<dyn CoverageExtractor>>) -> Self {
        Self { extractors }
    }

    /// 计算作业级汇总
    ///
    /// 没有任何已分析页时返回 None，而不是全 0 的汇总
    pub fn aggregate(
        &self,
        results: &[PageAnalysisResult],
        overrides: &OverrideIndex,
    ) -> Option<AssignmentSummary> {
        let mut pages: Vec<&PageAnalysisResult> = results.iter().collect();
        pages.sort_by_key(|page| page.page_number);

        let failed_pages: Vec<u32> = pages
            .iter()
            .filter(|page| page.is_error())
            .map(|page| page.page_number)
            .collect();
        let usable: Vec<&PageAnalysisResult> =
            pages.into_iter().filter(|page| !page.is_error()).collect();

        let (analyzed, skipped): (Vec<&PageAnalysisResult>, Vec<&PageAnalysisResult>) =
            usable.iter().copied().partition(|page| {
                !overrides.effective_skip(page.page_number, page.skip_analysis)
                    && !page.score_breakdown.is_empty()
            });

        if analyzed.is_empty() {
            debug!(
                "没有可汇总的页: 跳过 {} 页, 失败 {} 页",
                skipped.len(),
                failed_pages.len()
            );
            return None;
        }

        let tally = self.coverage_tally(&usable, overrides);
        let coverage = coverage_entry(&tally, overrides);

        let scores = SummaryScores::from_fn(|key| match key {
            RubricKey::Coverage => coverage.clone(),
            _ => fold_max(key, &analyzed, overrides),
        });

        let base_score: f64 = RubricKey::BASE.iter().map(|&key| scores.get(key).points).sum();
        let bonus_score: f64 = RubricKey::BONUS.iter().map(|&key| scores.get(key).points).sum();

        debug!(
            "汇总完成: 基础分 {} 加分 {} (已分析 {} 页, 跳过 {} 页)",
            base_score,
            bonus_score,
            analyzed.len(),
            skipped.len()
        );

        Some(AssignmentSummary {
            scores,
            base_score,
            bonus_score,
            total_score: base_score + bonus_score,
            max_score: BASE_MAX_SCORE,
            percentage: (base_score / BASE_MAX_SCORE * 100.0).round(),
            analyzed_pages: analyzed.len(),
            skipped_pages: skipped.len(),
            total_heuristics_count: tally.heuristic_refs,
            total_violations_count: tally.violations,
            unique_heuristics_count: tally.unique_heuristics(),
            failed_pages,
        })
    }

    /// 全作业覆盖度统计：每页使用第一个适用的策略
    fn coverage_tally(&self, pages: &[&PageAnalysisResult], overrides: &OverrideIndex) -> CoverageTally {
        let mut total = CoverageTally::default();
        for page in pages {
            let input = CoverageInput {
                page_number: page.page_number,
                page_type: overrides.effective_text(page.page_number, FieldPath::PageType, &page.page_type),
                feedback: overrides.effective_text(page.page_number, FieldPath::Feedback, &page.feedback),
                violations: &page.extracted_violations,
            };
            let found = self
                .extractors
                .iter()
                .find_map(|extractor| extractor.tally(&input).map(|t| (extractor.name(), t)));
            if let Some((name, tally)) = found {
                debug!(
                    "第 {} 页覆盖度 ({}): {} 个启发式, {} 条违规",
                    page.page_number,
                    name,
                    tally.unique_heuristics(),
                    tally.violations
                );
                total.merge(tally);
            }
        }
        total
    }
}

/// 覆盖度：人工覆盖过就取覆盖值中的最大者，否则按统计计算
fn coverage_entry(tally: &CoverageTally, overrides: &OverrideIndex) -> ScoreEntry {
    let key = RubricKey::Coverage;
    let max = key.max_points();
    let overridden = overrides
        .overridden_pages(&FieldPath::points(key).to_string())
        .into_iter()
        .filter_map(|(page, value)| value.as_f64().map(|points| (page, clamp_points(points, max))))
        .fold(None, |best: Option<(u32, f64)>, (page, points)| match best {
            Some((_, best_points)) if best_points >= points => best,
            _ => Some((page, points)),
        });

    match overridden {
        Some((page, points)) => {
            let comment = overrides
                .effective_comment(page, key, None)
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| OVERRIDDEN_COVERAGE_COMMENT.to_string());
            ScoreEntry::new(key, points, Some(comment))
        }
        None => {
            let points = if tally.is_complete() { max } else { 0.0 };
            ScoreEntry::new(key, points, Some(tally.comment()))
        }
    }
}

/// 取所有已分析页中有效分数的最大值
///
/// 某页没有该评分项时视为缺失（不拉低最大值）；
/// 同分时保留先出现且有说明的那一页
fn fold_max(key: RubricKey, pages: &[&PageAnalysisResult], overrides: &OverrideIndex) -> ScoreEntry {
    let max = key.max_points();
    let mut best: Option<(f64, Option<String>)> = None;

    for page in pages {
        let base = page.score(key);
        let Some(points) =
            overrides.effective_points(page.page_number, key, base.map(|entry| entry.points))
        else {
            continue;
        };
        let points = clamp_points(points, max);
        let comment = overrides
            .effective_comment(
                page.page_number,
                key,
                base.and_then(|entry| entry.comment.as_deref()),
            )
            .filter(|c| !c.trim().is_empty());

        let replace = match &best {
            None => true,
            Some((best_points, best_comment)) => {
                points > *best_points
                    || (points == *best_points && best_comment.is_none() && comment.is_some())
            }
        };
        if replace {
            best = Some((points, comment));
        }
    }

    match best {
        Some((points, comment)) => ScoreEntry::new(key, points, comment),
        None => ScoreEntry::new(key, 0.0, None),
    }
}

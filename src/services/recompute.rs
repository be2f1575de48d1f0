//! 重新评分与差异 - 业务能力层
//!
//! 保留上一次评分快照，重新评分，然后给出总分与各组成部分的变化

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use crate::clients::Scorer;
use crate::error::GradeResult;
use crate::infrastructure::JobRepository;
use crate::models::{
    ComponentChange, ComponentScore, RecomputeOutcome, ScoreChange, ScoringDiff, ScoringOutput,
    ScoringRequest,
};
use crate::services::page_audit::audit_pages;

/// 比较两次评分
///
/// 组成部分取两边键的并集，缺失一侧按 0 计，只输出有变化的项
pub fn diff_scoring(old: Option<&ScoringOutput>, new: &ScoringOutput) -> ScoringDiff {
    let old_total = old.map(|o| o.total_score).unwrap_or(0.0);
    ScoringDiff {
        overall_score_change: ScoreChange {
            old: old_total,
            new: new.total_score,
            delta: new.total_score - old_total,
        },
        component_changes: diff_components(old.map(|o| &o.components), &new.components),
        bonus_changes: diff_components(old.map(|o| &o.bonus), &new.bonus),
    }
}

fn diff_components(
    old: Option<&BTreeMap<String, ComponentScore>>,
    new: &BTreeMap<String, ComponentScore>,
) -> Vec<ComponentChange> {
    let points = |map: Option<&BTreeMap<String, ComponentScore>>, key: &str| {
        map.and_then(|m| m.get(key)).map(|c| c.points).unwrap_or(0.0)
    };
    let mut keys: BTreeSet<&String> = new.keys().collect();
    if let Some(old) = old {
        keys.extend(old.keys());
    }

    keys.into_iter()
        .filter_map(|key| {
            let old_points = points(old, key);
            let new_points = points(Some(new), key);
            let delta = new_points - old_points;
            (delta != 0.0).then(|| ComponentChange {
                component: key.clone(),
                old: old_points,
                new: new_points,
                delta,
            })
        })
        .collect()
}

/// 重新评分器
pub struct RecomputeDiffer {
    repo: Arc<JobRepository>,
    scorer: Arc<dyn Scorer>,
}

impl RecomputeDiffer {
    pub fn new(repo: Arc<JobRepository>, scorer: Arc<dyn Scorer>) -> Self {
        Self { repo, scorer }
    }

    /// 重新评分
    ///
    /// 前提：所有抽取页都已有分析结果，否则报 AggregationGap。
    /// 成功后随请求发出的 TA 评分项意见视为已被消费，随快照一起移除；
    /// 评分期间新写入的意见保留。
    pub async fn recompute(&self, job_id: &str) -> GradeResult<RecomputeOutcome> {
        let doc = self.repo.require(job_id).await?;
        let results = doc.analysis_results();
        if let Some(extraction) = &doc.extraction {
            audit_pages(extraction, &results).ensure_consistent()?;
        }

        let previous = doc.scoring.clone();
        let consumed = doc.rubric_comments.clone();
        let request = ScoringRequest {
            job_id: job_id.to_string(),
            pages: results,
            overrides: doc.overrides,
            issues: doc.issues,
            rubric_comments: doc.rubric_comments,
        };
        let scoring = self.scorer.score(request).await?;
        let changes = diff_scoring(previous.as_ref(), &scoring);

        self.repo
            .commit_scoring(job_id, scoring.clone(), &consumed)
            .await?;
        info!(
            "🔁 {} 重新评分完成: {} → {} ({} 个组成部分变化)",
            job_id,
            changes.overall_score_change.old,
            changes.overall_score_change.new,
            changes.component_changes.len() + changes.bonus_changes.len()
        );
        Ok(RecomputeOutcome { scoring, changes })
    }
}

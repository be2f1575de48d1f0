//! 本地评分器 - 业务能力层
//!
//! 没有配置远程评分服务时使用：由评分汇总与问题级推算直接生成评分快照

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::clients::Scorer;
use crate::error::{GradeError, GradeResult};
use crate::models::{ComponentScore, RubricKey, ScoreEntry, ScoringOutput, ScoringRequest};
use crate::services::effective_value::OverrideIndex;
use crate::services::issue_projector::IssueScoreProjector;
use crate::services::rubric_aggregator::RubricAggregator;

#[derive(Default)]
pub struct SummaryScorer {
    aggregator: RubricAggregator,
    projector: IssueScoreProjector,
}

impl SummaryScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aggregator(aggregator: RubricAggregator) -> Self {
        Self {
            aggregator,
            projector: IssueScoreProjector::new(),
        }
    }

    /// 生成评分快照（不含时间戳以外的任何随机性）
    pub fn build(&self, request: &ScoringRequest) -> GradeResult<ScoringOutput> {
        let overrides = OverrideIndex::new(request.overrides.clone());
        let summary = self
            .aggregator
            .aggregate(&request.pages, &overrides)
            .ok_or_else(|| GradeError::Scoring {
                message: format!("作业 {} 没有可评分的页", request.job_id),
            })?;

        let component = |key: RubricKey| {
            let entry: &ScoreEntry = summary.scores.get(key);
            let comment = match request.rubric_comments.get(key.as_str()) {
                Some(ta) => Some(match &entry.comment {
                    Some(auto) => format!("{} | TA: {}", auto, ta),
                    None => format!("TA: {}", ta),
                }),
                None => entry.comment.clone(),
            };
            (
                key.as_str().to_string(),
                ComponentScore {
                    points: entry.points,
                    max: entry.max,
                    comment,
                },
            )
        };

        let components: BTreeMap<String, ComponentScore> =
            RubricKey::BASE.into_iter().map(component).collect();
        let bonus: BTreeMap<String, ComponentScore> =
            RubricKey::BONUS.into_iter().map(component).collect();

        Ok(ScoringOutput {
            total_score: summary.total_score,
            max_score: summary.max_score,
            components,
            bonus,
            issue_scores: self.projector.project_all(&request.issues, &request.pages),
            scored_at: Some(Utc::now().to_rfc3339()),
        })
    }
}

#[async_trait]
impl Scorer for SummaryScorer {
    async fn score(&self, request: ScoringRequest) -> GradeResult<ScoringOutput> {
        self.build(&request)
    }
}

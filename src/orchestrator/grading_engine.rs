//! 评分引擎 - 编排层
//!
//! 对调用方（CLI / UI）暴露的全部能力：汇总、有效值、覆盖、重新评分、批处理。
//! 只做组合与调度，具体规则都在 services 中。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clients::{PageAnalyzer, PageExtractor, Scorer};
use crate::config::Config;
use crate::error::GradeResult;
use crate::infrastructure::JobRepository;
use crate::models::{
    AssignmentSummary, BatchItem, Correction, FinalGrade, Issue, JobInfo, OverrideDraft,
    OverrideRecord, PageAnalysisResult, RecomputeOutcome, RiskFlag, TaReview,
};
use crate::orchestrator::batch_pipeline::{BatchPipeline, BatchReport, RerunReport};
use crate::services::{
    audit_pages, IssueScoreProjector, IssueScores, OverrideIndex, OverrideStore, PageAudit,
    RecomputeDiffer, ReviewLog, RubricAggregator, SummaryScorer,
};

/// 一次批处理运行
pub struct BatchRun {
    /// 本次加入队列的条目ID
    pub ids: Vec<u64>,
    /// 条目状态变化
    pub updates: broadcast::Receiver<BatchItem>,
    /// 调度循环
    pub handle: JoinHandle<BatchReport>,
}

/// 评分引擎
pub struct GradingEngine {
    repo: Arc<JobRepository>,
    overrides: OverrideStore,
    aggregator: RubricAggregator,
    projector: IssueScoreProjector,
    differ: RecomputeDiffer,
    review_log: ReviewLog,
    pipeline: BatchPipeline,
}

impl GradingEngine {
    pub fn new(
        config: &Config,
        repo: Arc<JobRepository>,
        extractor: Arc<dyn PageExtractor>,
        analyzer: Arc<dyn PageAnalyzer>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            overrides: OverrideStore::new(repo.clone()),
            aggregator: RubricAggregator::new(),
            projector: IssueScoreProjector::new(),
            differ: RecomputeDiffer::new(repo.clone(), scorer),
            review_log: ReviewLog::new(repo.clone()),
            pipeline: BatchPipeline::from_config(config, extractor, analyzer, repo.clone()),
            repo,
        }
    }

    /// 使用本地评分器
    pub fn with_local_scorer(
        config: &Config,
        repo: Arc<JobRepository>,
        extractor: Arc<dyn PageExtractor>,
        analyzer: Arc<dyn PageAnalyzer>,
    ) -> Self {
        Self::new(config, repo, extractor, analyzer, Arc::new(SummaryScorer::new()))
    }

    /// 替换评分汇总器（例如关闭正文兜底统计）
    pub fn with_aggregator(mut self, aggregator: RubricAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn repository(&self) -> &Arc<JobRepository> {
        &self.repo
    }

    pub fn pipeline(&self) -> &BatchPipeline {
        &self.pipeline
    }

    // ========== 汇总与有效值 ==========

    /// 作业级汇总
    ///
    /// 作业不存在或没有已分析页时返回 None，区分「0 分」与「尚未评分」
    pub async fn compute_assignment_summary(&self, job_id: &str) -> GradeResult<Option<AssignmentSummary>> {
        let Some(doc) = self.repo.load(job_id).await? else {
            return Ok(None);
        };
        let index = OverrideIndex::new(doc.overrides.clone());
        Ok(self.aggregator.aggregate(&doc.analysis_results(), &index))
    }

    /// 某页某字段当前生效的值
    pub async fn resolve_effective_value(
        &self,
        job_id: &str,
        page_number: u32,
        field: &str,
        base: JsonValue,
    ) -> GradeResult<JsonValue> {
        let index = self.overrides.index(job_id).await?;
        Ok(index.effective_value(page_number, field, base))
    }

    pub async fn analysis_results(&self, job_id: &str) -> GradeResult<Vec<PageAnalysisResult>> {
        self.repo.analysis_results(job_id).await
    }

    // ========== 覆盖与审阅 ==========

    /// 保存覆盖记录，并追加纠错记录 / 风险标记
    ///
    /// 覆盖记录写入成功即返回；纠错记录写入失败只记警告
    pub async fn save_override(&self, draft: OverrideDraft) -> GradeResult<OverrideRecord> {
        let record = self.overrides.record(draft).await?;
        if let Err(e) = self.review_log.on_override(&record).await {
            warn!(
                "[作业 {}] ⚠️ 覆盖 {} 已保存，但纠错记录写入失败: {}",
                record.job_id, record.id, e
            );
        }
        Ok(record)
    }

    pub async fn overrides(&self, job_id: &str) -> GradeResult<Vec<OverrideRecord>> {
        self.overrides.list(job_id).await
    }

    pub async fn corrections(&self, job_id: Option<&str>) -> GradeResult<Vec<Correction>> {
        self.review_log.corrections(job_id).await
    }

    pub async fn toggle_risk_flag(&self, job_id: &str, page_number: u32, notes: &str) -> GradeResult<bool> {
        self.review_log.toggle_risk_flag(job_id, page_number, notes).await
    }

    pub async fn risk_flags(&self, job_id: &str) -> GradeResult<Vec<RiskFlag>> {
        self.review_log.risk_flags(job_id).await
    }

    /// TA 对某评分项的意见，供下一次重新评分使用
    pub async fn set_rubric_comment(&self, job_id: &str, component: &str, text: &str) -> GradeResult<()> {
        self.repo.set_rubric_comment(job_id, component, text).await
    }

    // ========== 问题 ==========

    pub async fn save_issues(&self, job_id: &str, issues: Vec<Issue>) -> GradeResult<()> {
        self.repo.save_issues(job_id, issues).await
    }

    /// TA 审阅单个问题
    pub async fn set_ta_review(&self, job_id: &str, issue_id: &str, review: TaReview) -> GradeResult<()> {
        self.repo.set_ta_review(job_id, issue_id, review).await?;
        info!("[作业 {}] 📝 问题 {} 已审阅", job_id, issue_id);
        Ok(())
    }

    /// 各问题的分数（显式优先，否则由页面相关度推算）
    pub async fn issue_scores(&self, job_id: &str) -> GradeResult<BTreeMap<String, IssueScores>> {
        let doc = self.repo.require(job_id).await?;
        Ok(self
            .projector
            .project_all(&doc.issues, &doc.analysis_results()))
    }

    // ========== 评分 ==========

    pub async fn recompute_scoring(&self, job_id: &str) -> GradeResult<RecomputeOutcome> {
        self.differ.recompute(job_id).await
    }

    /// 用当前汇总发布最终成绩（没有汇总时不发布）
    pub async fn publish_final_grade(&self, job_id: &str) -> GradeResult<Option<FinalGrade>> {
        let Some(summary) = self.compute_assignment_summary(job_id).await? else {
            warn!("[作业 {}] ⚠️ 没有可用的汇总，未发布最终成绩", job_id);
            return Ok(None);
        };
        let grade = FinalGrade {
            final_grade: summary.total_score,
            max_grade: summary.max_score,
        };
        self.repo.save_final_grade(job_id, grade.clone()).await?;
        info!(
            "[作业 {}] 🎓 最终成绩: {}/{}",
            job_id, grade.final_grade, grade.max_grade
        );
        Ok(Some(grade))
    }

    pub async fn get_final_grade(&self, job_id: &str) -> GradeResult<Option<FinalGrade>> {
        match self.repo.load(job_id).await? {
            Some(doc) => Ok(doc.final_grade),
            None => Ok(None),
        }
    }

    // ========== 作业 ==========

    pub async fn list_jobs(&self) -> GradeResult<Vec<JobInfo>> {
        self.repo.list_jobs().await
    }

    /// 核对抽取页与分析结果（没有抽取结果时为 None）
    pub async fn audit(&self, job_id: &str) -> GradeResult<Option<PageAudit>> {
        let doc = self.repo.require(job_id).await?;
        Ok(doc
            .extraction
            .as_ref()
            .map(|extraction| audit_pages(extraction, &doc.analysis_results())))
    }

    pub async fn delete_job(&self, job_id: &str) -> GradeResult<bool> {
        let deleted = self.repo.delete_job(job_id).await?;
        if deleted {
            info!("[作业 {}] 🗑️ 已删除", job_id);
        }
        Ok(deleted)
    }

    // ========== 批处理 ==========

    /// 加入队列并在后台开始调度，返回状态流
    ///
    /// 每批文档数沿用流水线当前设置（初始为 `Config::batch_size`）
    pub async fn run_batch<I, S>(&self, file_refs: I) -> BatchRun
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let updates = self.pipeline.subscribe();
        let ids = self.pipeline.enqueue(file_refs).await;
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move { pipeline.run().await });
        BatchRun {
            ids,
            updates,
            handle,
        }
    }

    /// 指定每批文档数后运行；该设置保留给之后的 `resume`
    pub async fn run_batch_with_size<I, S>(&self, file_refs: I, batch_size: usize) -> BatchRun
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.set_batch_size(batch_size);
        self.run_batch(file_refs).await
    }

    pub async fn rerun_missing(&self, job_id: &str) -> GradeResult<RerunReport> {
        self.pipeline.rerun_missing(job_id).await
    }
}

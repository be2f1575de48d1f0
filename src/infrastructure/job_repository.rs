//! 作业仓库 - 基础设施层
//!
//! 在 `DocumentStore` 之上提供按作业的类型化读写。
//! 所有写操作在同一把写锁下做「读-改-写」，保证同一作业不会出现并发写；
//! 读操作直接返回完整快照。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{GradeError, GradeResult, StoreError};
use crate::infrastructure::document_store::{DocumentStore, MemoryDocumentStore};
use crate::models::{
    Correction, ExtractionResult, FinalGrade, Issue, JobDocument, JobInfo, OverrideRecord,
    PageAnalysisResult, RiskFlag, ScoringOutput, TaReview,
};

/// 全局纠错记录的文档键（以 `_` 开头，不会与 jobId 冲突）
const CORRECTIONS_KEY: &str = "_corrections";

pub struct JobRepository {
    store: Arc<dyn DocumentStore>,
    write_lock: Mutex<()>,
}

impl JobRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// 内存仓库（测试用）
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDocumentStore::new()))
    }

    // ========== 读 ==========

    pub async fn load(&self, job_id: &str) -> GradeResult<Option<JobDocument>> {
        match self.store.get(job_id).await? {
            Some(value) => Ok(Some(decode(job_id, value)?)),
            None => Ok(None),
        }
    }

    /// 加载作业，不存在时报 JobNotFound
    pub async fn require(&self, job_id: &str) -> GradeResult<JobDocument> {
        self.load(job_id).await?.ok_or_else(|| GradeError::JobNotFound {
            job_id: job_id.to_string(),
        })
    }

    /// 所有作业（按创建时间倒序）
    pub async fn list_jobs(&self) -> GradeResult<Vec<JobInfo>> {
        let mut jobs = Vec::new();
        for key in self.store.keys().await? {
            if key.starts_with('_') {
                continue;
            }
            if let Some(doc) = self.load(&key).await? {
                jobs.push(doc.job);
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    pub async fn extraction(&self, job_id: &str) -> GradeResult<Option<ExtractionResult>> {
        Ok(self.require(job_id).await?.extraction)
    }

    pub async fn analysis_results(&self, job_id: &str) -> GradeResult<Vec<PageAnalysisResult>> {
        Ok(self.require(job_id).await?.analysis_results())
    }

    pub async fn overrides(&self, job_id: &str) -> GradeResult<Vec<OverrideRecord>> {
        Ok(self.require(job_id).await?.overrides)
    }

    pub async fn issues(&self, job_id: &str) -> GradeResult<Vec<Issue>> {
        Ok(self.require(job_id).await?.issues)
    }

    pub async fn scoring(&self, job_id: &str) -> GradeResult<Option<ScoringOutput>> {
        Ok(self.require(job_id).await?.scoring)
    }

    pub async fn rubric_comments(&self, job_id: &str) -> GradeResult<BTreeMap<String, String>> {
        Ok(self.require(job_id).await?.rubric_comments)
    }

    pub async fn risk_flags(&self, job_id: &str) -> GradeResult<Vec<RiskFlag>> {
        Ok(self.require(job_id).await?.risk_flags)
    }

    pub async fn final_grade(&self, job_id: &str) -> GradeResult<Option<FinalGrade>> {
        Ok(self.require(job_id).await?.final_grade)
    }

    pub async fn corrections(&self) -> GradeResult<Vec<Correction>> {
        match self.store.get(CORRECTIONS_KEY).await? {
            Some(value) => decode(CORRECTIONS_KEY, value),
            None => Ok(Vec::new()),
        }
    }

    // ========== 写 ==========

    /// 保存抽取结果；作业不存在时创建
    pub async fn save_extraction(&self, extraction: &ExtractionResult) -> GradeResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self
            .load(&extraction.job_id)
            .await?
            .unwrap_or_else(|| {
                JobDocument::new(JobInfo {
                    job_id: extraction.job_id.clone(),
                    file_name: extraction.file_name.clone(),
                    created_at: extraction.created_at.clone(),
                })
            });
        doc.extraction = Some(extraction.clone());
        self.put(&extraction.job_id, &doc).await
    }

    /// 写入单页分析结果（同一页只保留一条）
    pub async fn save_page_result(&self, job_id: &str, result: PageAnalysisResult) -> GradeResult<()> {
        self.update(job_id, |doc| {
            doc.analysis.insert(result.page_number, result);
        })
        .await
    }

    pub async fn append_override(&self, record: OverrideRecord) -> GradeResult<()> {
        let job_id = record.job_id.clone();
        self.update(&job_id, |doc| doc.overrides.push(record)).await
    }

    pub async fn save_issues(&self, job_id: &str, issues: Vec<Issue>) -> GradeResult<()> {
        self.update(job_id, |doc| doc.issues = issues).await
    }

    /// 写入 TA 对单个问题的审阅，其余字段不变
    pub async fn set_ta_review(&self, job_id: &str, issue_id: &str, review: TaReview) -> GradeResult<()> {
        let found = self
            .update(job_id, |doc| {
                match doc.issues.iter_mut().find(|issue| issue.issue_id == issue_id) {
                    Some(issue) => {
                        issue.ta_review = Some(review);
                        true
                    }
                    None => false,
                }
            })
            .await?;
        if !found {
            return Err(GradeError::IssueNotFound {
                job_id: job_id.to_string(),
                issue_id: issue_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn set_rubric_comment(&self, job_id: &str, component: &str, text: &str) -> GradeResult<()> {
        self.update(job_id, |doc| {
            if text.trim().is_empty() {
                doc.rubric_comments.remove(component);
            } else {
                doc.rubric_comments
                    .insert(component.to_string(), text.to_string());
            }
        })
        .await
    }

    /// 保存评分快照并移除已被本次评分消费的 TA 意见（同一次写入）
    ///
    /// 只移除与 `consumed` 中内容一致的意见；评分期间新写入或改动过的意见保留到下一次评分
    pub async fn commit_scoring(
        &self,
        job_id: &str,
        scoring: ScoringOutput,
        consumed: &BTreeMap<String, String>,
    ) -> GradeResult<()> {
        self.update(job_id, |doc| {
            doc.scoring = Some(scoring);
            doc.rubric_comments
                .retain(|component, text| consumed.get(component) != Some(text));
        })
        .await
    }

    pub async fn save_final_grade(&self, job_id: &str, grade: FinalGrade) -> GradeResult<()> {
        self.update(job_id, |doc| doc.final_grade = Some(grade)).await
    }

    /// 修改风险标记
    pub async fn update_risk_flags<F, T>(&self, job_id: &str, f: F) -> GradeResult<T>
    where
        F: FnOnce(&mut Vec<RiskFlag>) -> T + Send,
        T: Send,
    {
        self.update(job_id, |doc| f(&mut doc.risk_flags)).await
    }

    /// 追加纠错记录；`is_duplicate` 命中任一已有记录时不追加。返回是否追加
    pub async fn append_correction<F>(&self, correction: Correction, is_duplicate: F) -> GradeResult<bool>
    where
        F: Fn(&Correction) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut corrections = self.corrections().await?;
        if corrections.iter().any(is_duplicate) {
            return Ok(false);
        }
        corrections.push(correction);
        let value = serde_json::to_value(&corrections)?;
        self.store.put(CORRECTIONS_KEY, &value).await?;
        Ok(true)
    }

    /// 删除作业（抽取、分析、覆盖记录一并删除）
    pub async fn delete_job(&self, job_id: &str) -> GradeResult<bool> {
        let _guard = self.write_lock.lock().await;
        Ok(self.store.delete(job_id).await?)
    }

    /// 插入一个完整作业文档（导入用）
    pub async fn import(&self, doc: JobDocument) -> GradeResult<()> {
        let _guard = self.write_lock.lock().await;
        let job_id = doc.job.job_id.clone();
        self.put(&job_id, &doc).await
    }

    async fn update<F, T>(&self, job_id: &str, f: F) -> GradeResult<T>
    where
        F: FnOnce(&mut JobDocument) -> T + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.require(job_id).await?;
        let result = f(&mut doc);
        self.put(job_id, &doc).await?;
        Ok(result)
    }

    async fn put(&self, job_id: &str, doc: &JobDocument) -> GradeResult<()> {
        let value = serde_json::to_value(doc)?;
        self.store.put(job_id, &value).await?;
        debug!("作业文档已保存: {}", job_id);
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: JsonValue) -> GradeResult<T> {
    serde_json::from_value(value).map_err(|source| {
        GradeError::Store(StoreError::Corrupted {
            key: key.to_string(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedPage;

    fn extraction(job_id: &str, pages: u32) -> ExtractionResult {
        ExtractionResult {
            job_id: job_id.to_string(),
            file_name: Some(format!("{}.pdf", job_id)),
            created_at: Some(format!("2025-01-0{}T00:00:00", pages)),
            pages: (1..=pages)
                .map(|n| ExtractedPage {
                    page_number: n,
                    snippet: format!("page {}", n),
                    image: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_one_result_per_page() {
        let repo = JobRepository::in_memory();
        repo.save_extraction(&extraction("job-1", 2)).await.unwrap();

        let mut first = PageAnalysisResult::new(1);
        first.page_type = "Intro".to_string();
        repo.save_page_result("job-1", first).await.unwrap();
        let mut second = PageAnalysisResult::new(1);
        second.page_type = "Heuristic Analysis".to_string();
        repo.save_page_result("job-1", second).await.unwrap();

        let results = repo.analysis_results("job-1").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].page_type, "Heuristic Analysis");
    }

    #[tokio::test]
    async fn test_missing_job_is_reported() {
        let repo = JobRepository::in_memory();
        let err = repo
            .save_page_result("nope", PageAnalysisResult::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first_and_skips_internal_docs() {
        let repo = JobRepository::in_memory();
        repo.save_extraction(&extraction("job-a", 1)).await.unwrap();
        repo.save_extraction(&extraction("job-b", 3)).await.unwrap();
        repo.append_correction(
            Correction {
                id: "c1".to_string(),
                job_id: "job-a".to_string(),
                page_number: 1,
                component: "coverage".to_string(),
                reason: "r".to_string(),
                original_value: serde_json::json!(0),
                corrected_value: serde_json::json!(15),
                reviewer_notes: String::new(),
                timestamp: "t".to_string(),
                source: None,
            },
            |_| false,
        )
        .await
        .unwrap();

        let jobs: Vec<String> = repo
            .list_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        assert_eq!(jobs, vec!["job-b".to_string(), "job-a".to_string()]);
    }

    #[tokio::test]
    async fn test_ta_review_updates_one_issue() {
        let repo = JobRepository::in_memory();
        repo.save_extraction(&extraction("job-1", 2)).await.unwrap();
        let issue = |id: &str, heuristic: &str| Issue {
            issue_id: id.to_string(),
            heuristic_id: heuristic.to_string(),
            pages_involved: vec![1, 2],
            ai_proposed_severity: "major".to_string(),
            ta_review: None,
            scores: BTreeMap::new(),
        };
        repo.save_issues("job-1", vec![issue("i-1", "H1"), issue("i-2", "H4")])
            .await
            .unwrap();

        let review = TaReview {
            severity: Some("minor".to_string()),
            notes: Some("only on the settings page".to_string()),
            confirmed: true,
        };
        repo.set_ta_review("job-1", "i-2", review.clone()).await.unwrap();

        let issues = repo.issues("job-1").await.unwrap();
        assert_eq!(issues[0].ta_review, None);
        assert_eq!(issues[1].ta_review, Some(review.clone()));
        assert_eq!(issues[1].ai_proposed_severity, "major");

        let err = repo
            .set_ta_review("job-1", "i-9", review.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::IssueNotFound { ref issue_id, .. } if issue_id == "i-9"));
        let err = repo.set_ta_review("nope", "i-1", review).await.unwrap_err();
        assert!(matches!(err, GradeError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_commit_scoring_clears_comments() {
        let repo = JobRepository::in_memory();
        repo.save_extraction(&extraction("job-1", 1)).await.unwrap();
        repo.set_rubric_comment("job-1", "coverage", "too harsh")
            .await
            .unwrap();
        assert_eq!(repo.rubric_comments("job-1").await.unwrap().len(), 1);

        let scoring = ScoringOutput {
            total_score: 80.0,
            max_score: 100.0,
            components: BTreeMap::new(),
            bonus: BTreeMap::new(),
            issue_scores: BTreeMap::new(),
            scored_at: None,
        };
        let consumed = repo.rubric_comments("job-1").await.unwrap();
        repo.commit_scoring("job-1", scoring.clone(), &consumed)
            .await
            .unwrap();
        assert!(repo.rubric_comments("job-1").await.unwrap().is_empty());
        assert_eq!(repo.scoring("job-1").await.unwrap(), Some(scoring));
    }

    #[tokio::test]
    async fn test_commit_scoring_keeps_comments_written_meanwhile() {
        let repo = JobRepository::in_memory();
        repo.save_extraction(&extraction("job-1", 1)).await.unwrap();
        repo.set_rubric_comment("job-1", "coverage", "too harsh")
            .await
            .unwrap();
        repo.set_rubric_comment("job-1", "writing_quality", "fine")
            .await
            .unwrap();
        let consumed = repo.rubric_comments("job-1").await.unwrap();

        // 评分进行中：新增一条，改写一条
        repo.set_rubric_comment("job-1", "screenshots", "missing alt text")
            .await
            .unwrap();
        repo.set_rubric_comment("job-1", "writing_quality", "typos on p3")
            .await
            .unwrap();

        let scoring = ScoringOutput {
            total_score: 70.0,
            max_score: 100.0,
            components: BTreeMap::new(),
            bonus: BTreeMap::new(),
            issue_scores: BTreeMap::new(),
            scored_at: None,
        };
        repo.commit_scoring("job-1", scoring, &consumed).await.unwrap();

        let left = repo.rubric_comments("job-1").await.unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left["screenshots"], "missing alt text");
        assert_eq!(left["writing_quality"], "typos on p3");
        assert!(!left.contains_key("coverage"));
    }
}

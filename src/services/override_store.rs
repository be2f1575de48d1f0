//! 覆盖记录服务 - 业务能力层
//!
//! 只负责「校验并追加」覆盖记录，不关心记录被谁消费

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{GradeError, GradeResult};
use crate::infrastructure::JobRepository;
use crate::models::{OverrideDraft, OverrideRecord};
use crate::services::effective_value::OverrideIndex;

/// 覆盖记录服务
///
/// 职责：
/// - 校验字段路径与取值，不合法的直接拒绝，不落盘
/// - 分配 id 与服务端时间戳后追加
/// - 同一字段重复提交不拒绝，由索引取最后一条
pub struct OverrideStore {
    repo: Arc<JobRepository>,
    seq: AtomicU64,
}

impl OverrideStore {
    pub fn new(repo: Arc<JobRepository>) -> Self {
        Self {
            repo,
            seq: AtomicU64::new(0),
        }
    }

    /// 追加一条覆盖记录
    pub async fn record(&self, draft: OverrideDraft) -> GradeResult<OverrideRecord> {
        let path = draft.validate().map_err(|e| {
            warn!("⚠️ 覆盖记录被拒绝: {}", e);
            GradeError::Validation(e)
        })?;

        let now = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = OverrideRecord {
            id: format!("override_{}_{}", now.timestamp_millis(), seq),
            job_id: draft.job_id,
            page_number: draft.page_number,
            field: path.to_string(),
            original_value: draft.original_value,
            override_value: draft.override_value,
            reviewer_name: draft.reviewer_name,
            reviewer_notes: draft.reviewer_notes,
            timestamp: now.to_rfc3339(),
        };

        self.repo.append_override(record.clone()).await?;
        debug!(
            "覆盖记录已保存: {} 第 {} 页 {}",
            record.job_id, record.page_number, record.field
        );
        Ok(record)
    }

    /// 某作业的全部覆盖记录（日志顺序）
    pub async fn list(&self, job_id: &str) -> GradeResult<Vec<OverrideRecord>> {
        self.repo.overrides(job_id).await
    }

    /// 建立某作业的覆盖索引
    pub async fn index(&self, job_id: &str) -> GradeResult<OverrideIndex> {
        Ok(OverrideIndex::new(self.list(job_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::models::ExtractionResult;
    use serde_json::json;

    async fn store_with_job() -> OverrideStore {
        let repo = Arc::new(JobRepository::in_memory());
        repo.save_extraction(&ExtractionResult {
            job_id: "job-1".to_string(),
            file_name: None,
            created_at: None,
            pages: Vec::new(),
        })
        .await
        .unwrap();
        OverrideStore::new(repo)
    }

    #[tokio::test]
    async fn test_record_assigns_unique_ids() {
        let store = store_with_job().await;
        let draft = OverrideDraft::new(
            "job-1",
            1,
            "score_breakdown.screenshots.points",
            json!(5),
            json!(8),
        );
        let first = store.record(draft.clone()).await.unwrap();
        let second = store.record(draft).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list("job-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_override_is_not_persisted() {
        let store = store_with_job().await;
        let draft = OverrideDraft::new(
            "job-1",
            1,
            "score_breakdown.coverage.points",
            json!(0),
            json!(16),
        );
        let err = store.record(draft).await.unwrap_err();
        assert!(matches!(
            err,
            GradeError::Validation(ValidationError::ScoreOutOfRange { .. })
        ));
        assert!(store.list("job-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected() {
        let store = store_with_job().await;
        let draft = OverrideDraft::new("job-2", 1, "feedback", json!(""), json!("ok"));
        let err = store.record(draft).await.unwrap_err();
        assert!(matches!(err, GradeError::JobNotFound { .. }));
    }
}

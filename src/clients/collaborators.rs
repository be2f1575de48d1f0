//! 协作方接口
//!
//! 抽取、分析、评分都由外部服务完成，这里只约定输入输出。

use async_trait::async_trait;

use crate::error::GradeResult;
use crate::models::{ExtractedPage, ExtractionResult, PageAnalysisResult, ScoringOutput, ScoringRequest};

/// PDF 页面抽取
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// 抽取一份文档的所有页，返回新分配的 jobId 与页列表
    async fn extract_pages(&self, file_ref: &str) -> GradeResult<ExtractionResult>;
}

/// 单页分析
///
/// 返回 `Ok` 且 `error` 非空表示该页分析失败但可以继续；
/// 返回 `Err(QuotaExceeded)` 表示应停止继续提交。
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    async fn analyze_page(&self, job_id: &str, page: &ExtractedPage) -> GradeResult<PageAnalysisResult>;
}

/// 作业评分
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: ScoringRequest) -> GradeResult<ScoringOutput>;
}

//! 页面分析流程 - 流程层
//!
//! 核心职责：定义"一个窗口的页"的完整处理流程
//!
//! 流程顺序：
//! 1. 窗口内的页同时提交分析
//! 2. 每页结果归一化后立即写入（写入完成前读方看不到）
//! 3. 非配额错误记为失败页，配额错误交给上层停止提交

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::clients::PageAnalyzer;
use crate::error::{GradeError, GradeResult};
use crate::infrastructure::JobRepository;
use crate::models::{ExtractedPage, PageAnalysisResult};
use crate::utils::logging::truncate_text;
use crate::workflow::item_ctx::ItemCtx;

/// 单页处理结果
enum PageOutcome {
    Analyzed,
    Failed,
    Quota(GradeError),
}

/// 一个窗口的处理结果
#[derive(Debug, Default)]
pub struct WindowReport {
    pub analyzed: usize,
    pub failed: usize,
    /// 窗口内遇到的配额错误（窗口内其他页照常写入）
    pub quota: Option<GradeError>,
}

/// 页面分析流程
///
/// - 窗口大小固定，窗口全部结束后才进入下一个窗口
/// - 不持有批处理状态，只依赖分析能力与作业仓库
pub struct PageFlow {
    analyzer: Arc<dyn PageAnalyzer>,
    repo: Arc<JobRepository>,
    window: usize,
}

impl PageFlow {
    pub fn new(analyzer: Arc<dyn PageAnalyzer>, repo: Arc<JobRepository>, window: usize) -> Self {
        Self {
            analyzer,
            repo,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// 处理一个窗口
    pub async fn run_window(
        &self,
        ctx: &ItemCtx,
        job_id: &str,
        pages: &[ExtractedPage],
    ) -> GradeResult<WindowReport> {
        let outcomes = join_all(
            pages
                .iter()
                .map(|page| self.analyze_and_commit(ctx, job_id, page)),
        )
        .await;

        let mut report = WindowReport::default();
        for outcome in outcomes {
            match outcome? {
                PageOutcome::Analyzed => report.analyzed += 1,
                PageOutcome::Failed => report.failed += 1,
                PageOutcome::Quota(e) => {
                    if report.quota.is_none() {
                        report.quota = Some(e);
                    }
                }
            }
        }
        Ok(report)
    }

    /// 按窗口依次处理所有页，遇到配额错误立即停止
    pub async fn run_all(
        &self,
        ctx: &ItemCtx,
        job_id: &str,
        pages: &[ExtractedPage],
    ) -> GradeResult<WindowReport> {
        let mut total = WindowReport::default();
        for window in pages.chunks(self.window) {
            let report = self.run_window(ctx, job_id, window).await?;
            total.analyzed += report.analyzed;
            total.failed += report.failed;
            if let Some(quota) = report.quota {
                return Err(quota);
            }
        }
        Ok(total)
    }

    async fn analyze_and_commit(
        &self,
        ctx: &ItemCtx,
        job_id: &str,
        page: &ExtractedPage,
    ) -> GradeResult<PageOutcome> {
        debug!(
            "{} 📄 正在分析第 {} 页: {}",
            ctx,
            page.page_number,
            truncate_text(&page.snippet, 40)
        );

        match self.analyzer.analyze_page(job_id, page).await {
            Ok(result) => {
                let result = result.normalized(page.page_number);
                let failed = result.error.clone();
                self.repo.save_page_result(job_id, result).await?;
                match failed {
                    Some(message) => {
                        warn!("{} ⚠️ 第 {} 页分析失败: {}", ctx, page.page_number, message);
                        Ok(PageOutcome::Failed)
                    }
                    None => {
                        info!("{} ✓ 第 {} 页分析完成", ctx, page.page_number);
                        Ok(PageOutcome::Analyzed)
                    }
                }
            }
            Err(e) if e.is_quota() => {
                warn!("{} ⛔ 第 {} 页遇到配额限制: {}", ctx, page.page_number, e);
                Ok(PageOutcome::Quota(e))
            }
            Err(e) => {
                warn!("{} ⚠️ 第 {} 页分析失败: {}", ctx, page.page_number, e);
                self.repo
                    .save_page_result(
                        job_id,
                        PageAnalysisResult::failed(page.page_number, e.to_string()),
                    )
                    .await?;
                Ok(PageOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 第 3 页网络错误，第 5 页配额错误，其余正常
    struct ScriptedAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageAnalyzer for ScriptedAnalyzer {
        async fn analyze_page(&self, _job_id: &str, page: &ExtractedPage) -> GradeResult<PageAnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match page.page_number {
                3 => Err(GradeError::transient("analyze", "connection reset")),
                5 => Err(GradeError::QuotaExceeded {
                    message: "quota".to_string(),
                }),
                // 分析服务返回的页码不可信
                n => Ok(PageAnalysisResult::new(n + 100)),
            }
        }
    }

    async fn setup(pages: u32) -> (Arc<JobRepository>, Vec<ExtractedPage>) {
        let repo = Arc::new(JobRepository::in_memory());
        let extraction = ExtractionResult {
            job_id: "job-1".to_string(),
            file_name: None,
            created_at: None,
            pages: (1..=pages)
                .map(|n| ExtractedPage {
                    page_number: n,
                    snippet: String::new(),
                    image: None,
                })
                .collect(),
        };
        repo.save_extraction(&extraction).await.unwrap();
        (repo, extraction.pages)
    }

    #[tokio::test]
    async fn test_failed_pages_are_recorded() {
        let (repo, pages) = setup(4).await;
        let analyzer = Arc::new(ScriptedAnalyzer {
            calls: AtomicUsize::new(0),
        });
        let flow = PageFlow::new(analyzer, repo.clone(), 2);

        let report = flow
            .run_all(&ItemCtx::for_job("job-1"), "job-1", &pages)
            .await
            .unwrap();
        assert_eq!(report.analyzed, 3);
        assert_eq!(report.failed, 1);

        let results = repo.analysis_results("job-1").await.unwrap();
        let numbers: Vec<u32> = results.iter().map(|r| r.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(results[2].is_error());
    }

    #[tokio::test]
    async fn test_quota_stops_after_current_window() {
        let (repo, pages) = setup(8).await;
        let analyzer = Arc::new(ScriptedAnalyzer {
            calls: AtomicUsize::new(0),
        });
        let flow = PageFlow::new(analyzer.clone(), repo.clone(), 2);

        let err = flow
            .run_all(&ItemCtx::for_job("job-1"), "job-1", &pages)
            .await
            .unwrap_err();
        assert!(err.is_quota());
        // 窗口 [5, 6] 结束后不再提交 7、8
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 6);
        let results = repo.analysis_results("job-1").await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.page_number != 5));
    }
}

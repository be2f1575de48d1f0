//! 单个文档处理器 - 编排层
//!
//! ## 职责
//!
//! 驱动一个批处理条目走完状态机：
//! pending → extracting → analyzing → completed，抽取或分析中的异常直接转入 error。
//!
//! ## 处理流程
//!
//! 1. 调用抽取服务，拿到 jobId 与页列表并保存
//! 2. 按固定窗口把页交给 PageFlow（窗口全部结束才进入下一个窗口）
//! 3. 每个窗口结束后更新进度
//! 4. 单页失败不影响条目；配额错误使条目出错并让流水线自动暂停

use std::sync::Arc;

use tracing::{error, info};

use crate::error::GradeError;
use crate::models::batch::analysis_progress;
use crate::models::BatchStatus;
use crate::orchestrator::batch_pipeline::PipelineInner;
use crate::workflow::ItemCtx;

/// 条目处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    Completed,
    Failed,
    QuotaExceeded,
}

/// 处理单个文档
pub(crate) async fn process_document(inner: Arc<PipelineInner>, mut ctx: ItemCtx) -> ItemOutcome {
    info!("{} 📥 开始抽取: {}", ctx, ctx.file_ref);

    let extraction = match inner.extractor.extract_pages(&ctx.file_ref).await {
        Ok(extraction) => extraction,
        Err(e) => return fail(&inner, &ctx, e).await,
    };
    if let Err(e) = inner.repo.save_extraction(&extraction).await {
        return fail(&inner, &ctx, e).await;
    }

    let job_id = extraction.job_id.clone();
    ctx.job_id = Some(job_id.clone());
    inner
        .transition(ctx.item_id, BatchStatus::Analyzing, |item| {
            item.job_id = Some(job_id.clone());
            item.progress = analysis_progress(0, extraction.pages.len().max(1));
        })
        .await;
    info!("{} ✓ 抽取完成，共 {} 页", ctx, extraction.pages.len());

    let mut pages = extraction.pages;
    pages.sort_by_key(|page| page.page_number);
    let total = pages.len();
    let mut done = 0;
    let mut analyzed = 0;
    let mut failed = 0;

    for window in pages.chunks(inner.flow.window()) {
        let report = match inner.flow.run_window(&ctx, &job_id, window).await {
            Ok(report) => report,
            Err(e) => return fail(&inner, &ctx, e).await,
        };
        if let Some(quota) = report.quota {
            return fail(&inner, &ctx, quota).await;
        }

        done += window.len();
        analyzed += report.analyzed;
        failed += report.failed;
        let progress = analysis_progress(done, total);
        inner
            .transition(ctx.item_id, BatchStatus::Analyzing, |item| {
                item.progress = item.progress.max(progress);
            })
            .await;
    }

    inner
        .transition(ctx.item_id, BatchStatus::Completed, |item| {
            item.progress = 100;
        })
        .await;
    info!(
        "{} ✅ 处理完成: 成功 {} 页，失败 {} 页",
        ctx, analyzed, failed
    );
    ItemOutcome::Completed
}

/// 条目转入 error；配额错误同时让流水线自动暂停
async fn fail(inner: &PipelineInner, ctx: &ItemCtx, err: GradeError) -> ItemOutcome {
    let quota = err.is_quota();
    let message = if quota {
        inner.mark_quota_exhausted();
        format!("quota exceeded: {}", err)
    } else {
        err.to_string()
    };

    error!("{} ❌ 处理失败: {}", ctx, message);
    inner
        .transition(ctx.item_id, BatchStatus::Error, |item| {
            item.error = Some(message);
        })
        .await;

    if quota {
        ItemOutcome::QuotaExceeded
    } else {
        ItemOutcome::Failed
    }
}

//! 批处理流水线 - 编排层
//!
//! ## 职责
//!
//! 持有待评分文档队列，按批把文档交给 document_processor，并广播每个条目的状态变化。
//!
//! ## 核心功能
//!
//! 1. **排队**：`enqueue` 把文档放入 FIFO 队列，状态为 pending
//! 2. **并发控制**：每批最多 `batch_size` 个文档，Semaphore + tokio::spawn
//! 3. **分批处理**：每批完成后再开始下一批
//! 4. **暂停 / 继续**：暂停在下一个批次边界生效，不取消在途请求；继续只处理剩余 pending 条目
//! 5. **配额保护**：任一条目遇到配额错误后自动暂停，剩余条目保持 pending
//! 6. **重跑缺失页**：对已有作业只重新分析缺失和失败的页
//!
//! ## 并发安全
//!
//! 条目状态只在同一把锁内修改，状态事件也在锁内发出，
//! 因此订阅方看到的事件顺序就是状态变化的真实顺序。

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::clients::{PageAnalyzer, PageExtractor};
use crate::config::Config;
use crate::error::{GradeError, GradeResult};
use crate::infrastructure::JobRepository;
use crate::models::{BatchItem, BatchStatus, ExtractedPage};
use crate::orchestrator::document_processor::{self, ItemOutcome};
use crate::services::audit_pages;
use crate::utils::logging::{log_batch_complete, log_batch_start};
use crate::workflow::{ItemCtx, PageFlow};

/// 状态事件缓冲区的默认大小
const EVENT_CAPACITY: usize = 1024;

/// 一次运行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    /// 运行结束时仍为 pending 的条目数
    pub remaining_pending: usize,
    pub paused: bool,
    pub halted_by_quota: bool,
}

/// 重跑缺失页的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunReport {
    pub job_id: String,
    pub pages: Vec<u32>,
    pub analyzed: usize,
    pub failed: usize,
}

struct PipelineState {
    items: BTreeMap<u64, BatchItem>,
    queue: VecDeque<u64>,
    next_id: u64,
}

pub(crate) struct PipelineInner {
    pub(crate) extractor: Arc<dyn PageExtractor>,
    pub(crate) flow: PageFlow,
    pub(crate) repo: Arc<JobRepository>,
    /// 每批文档数，下一次 `run` 开始时读取
    batch_size: AtomicUsize,
    state: Mutex<PipelineState>,
    events: broadcast::Sender<BatchItem>,
    paused: AtomicBool,
    quota_exhausted: AtomicBool,
    /// 同一时刻只有一个调度循环
    run_lock: Mutex<()>,
}

impl PipelineInner {
    /// 状态迁移（不合法的迁移被忽略并记录警告）
    pub(crate) async fn transition(
        &self,
        id: u64,
        next: BatchStatus,
        f: impl FnOnce(&mut BatchItem),
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(item) = state.items.get_mut(&id) else {
            return false;
        };
        if item.status != next && !item.status.can_transition_to(next) {
            warn!("[条目 {}] 忽略非法状态迁移: {} → {}", id, item.status, next);
            return false;
        }
        item.status = next;
        f(item);
        let _ = self.events.send(item.clone());
        true
    }

    /// 配额耗尽：自动暂停
    pub(crate) fn mark_quota_exhausted(&self) {
        self.quota_exhausted.store(true, Ordering::SeqCst);
        self.paused.store(true, Ordering::SeqCst);
    }

    /// 取出下一批 pending 条目并标记为 extracting
    async fn dequeue_batch(&self, batch_size: usize) -> (Vec<ItemCtx>, usize) {
        let mut state = self.state.lock().await;
        let pending_before = state.queue.len();
        let mut batch = Vec::new();

        while batch.len() < batch_size {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            let Some(item) = state.items.get_mut(&id) else {
                continue;
            };
            if item.status != BatchStatus::Pending {
                continue;
            }
            item.status = BatchStatus::Extracting;
            item.progress = 0;
            item.error = None;
            let _ = self.events.send(item.clone());
            batch.push(ItemCtx::new(id, item.file_ref.clone()));
        }
        (batch, pending_before)
    }

    async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .items
            .values()
            .filter(|item| item.status == BatchStatus::Pending)
            .count()
    }
}

/// 批处理流水线（可克隆，克隆体共享同一队列）
#[derive(Clone)]
pub struct BatchPipeline {
    inner: Arc<PipelineInner>,
}

impl BatchPipeline {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        analyzer: Arc<dyn PageAnalyzer>,
        repo: Arc<JobRepository>,
        batch_size: usize,
        page_window: usize,
    ) -> Self {
        Self::build(extractor, analyzer, repo, batch_size, page_window, EVENT_CAPACITY)
    }

    pub fn from_config(
        config: &Config,
        extractor: Arc<dyn PageExtractor>,
        analyzer: Arc<dyn PageAnalyzer>,
        repo: Arc<JobRepository>,
    ) -> Self {
        Self::build(
            extractor,
            analyzer,
            repo,
            config.batch_size,
            config.page_window,
            config.event_capacity,
        )
    }

    fn build(
        extractor: Arc<dyn PageExtractor>,
        analyzer: Arc<dyn PageAnalyzer>,
        repo: Arc<JobRepository>,
        batch_size: usize,
        page_window: usize,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(PipelineInner {
                extractor,
                flow: PageFlow::new(analyzer, repo.clone(), page_window),
                repo,
                batch_size: AtomicUsize::new(batch_size.max(1)),
                state: Mutex::new(PipelineState {
                    items: BTreeMap::new(),
                    queue: VecDeque::new(),
                    next_id: 1,
                }),
                events,
                paused: AtomicBool::new(false),
                quota_exhausted: AtomicBool::new(false),
                run_lock: Mutex::new(()),
            }),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size.load(Ordering::SeqCst)
    }

    /// 修改每批文档数（至少为 1），从下一次 `run` / `resume` 开始生效
    pub fn set_batch_size(&self, batch_size: usize) {
        let batch_size = batch_size.max(1);
        let previous = self.inner.batch_size.swap(batch_size, Ordering::SeqCst);
        if previous != batch_size {
            info!("📊 每批文档数: {} → {}", previous, batch_size);
        }
    }

    /// 加入队列，返回分配的条目ID
    pub async fn enqueue<I, S>(&self, file_refs: I) -> Vec<u64>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.inner.state.lock().await;
        let mut ids = Vec::new();
        for file_ref in file_refs {
            let id = state.next_id;
            state.next_id += 1;
            let item = BatchItem::new(id, file_ref);
            let _ = self.inner.events.send(item.clone());
            state.items.insert(id, item);
            state.queue.push_back(id);
            ids.push(id);
        }
        ids
    }

    /// 订阅条目状态变化
    ///
    /// 事件缓冲区容量由 `Config::event_capacity` 决定（默认 1024）。
    /// 消费过慢的订阅方会收到 `RecvError::Lagged(n)`，
    /// 丢失的 n 条迁移不会重发；此时应调用 `items()` 取一次完整快照再继续接收。
    pub fn subscribe(&self) -> broadcast::Receiver<BatchItem> {
        self.inner.events.subscribe()
    }

    /// 所有条目快照（按ID升序）
    pub async fn items(&self) -> Vec<BatchItem> {
        self.inner.state.lock().await.items.values().cloned().collect()
    }

    pub async fn item(&self, id: u64) -> Option<BatchItem> {
        self.inner.state.lock().await.items.get(&id).cloned()
    }

    /// 请求暂停：当前批次完成后不再开始新批次
    pub fn pause(&self) {
        if !self.inner.paused.swap(true, Ordering::SeqCst) {
            info!("⏸️ 已请求暂停，当前批次完成后停止");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.inner.quota_exhausted.load(Ordering::SeqCst)
    }

    /// 继续处理剩余 pending 条目（已完成或出错的条目不会被重新处理）
    pub async fn resume(&self) -> BatchReport {
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.quota_exhausted.store(false, Ordering::SeqCst);
        info!("▶️ 继续处理剩余条目");
        self.run().await
    }

    /// 移除所有不在处理中的条目，返回移除数量
    pub async fn clear(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let before = state.items.len();
        state.items.retain(|_, item| item.status.is_in_flight());
        let PipelineState { items, queue, .. } = &mut *state;
        queue.retain(|id| items.contains_key(id));
        let removed = before - state.items.len();
        info!("🧹 已清除 {} 个条目", removed);
        removed
    }

    /// 调度循环：逐批处理，直到队列为空或被暂停
    pub async fn run(&self) -> BatchReport {
        let _running = self.inner.run_lock.lock().await;
        let batch_size = self.batch_size();
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let mut report = BatchReport::default();
        let mut batch_num = 0;

        loop {
            if self.is_paused() {
                break;
            }
            let (batch, pending_before) = self.inner.dequeue_batch(batch_size).await;
            let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
                break;
            };
            batch_num += 1;
            log_batch_start(batch_num, first.item_id, last.item_id, pending_before);

            let mut handles = Vec::new();
            for ctx in batch {
                let permit = semaphore.clone().acquire_owned().await.ok();
                let inner = self.inner.clone();
                let item_id = ctx.item_id;
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    document_processor::process_document(inner, ctx).await
                });
                handles.push((item_id, handle));
            }

            // 等待本批所有任务完成
            let total = handles.len();
            let mut success = 0;
            for (item_id, handle) in handles {
                match handle.await {
                    Ok(ItemOutcome::Completed) => {
                        success += 1;
                        report.completed += 1;
                    }
                    Ok(ItemOutcome::Failed) | Ok(ItemOutcome::QuotaExceeded) => {
                        report.failed += 1;
                    }
                    Err(e) => {
                        error!("[条目 {}] 任务执行失败: {}", item_id, e);
                        let message = format!("任务执行失败: {}", e);
                        self.inner
                            .transition(item_id, BatchStatus::Error, |item| {
                                item.error = Some(message)
                            })
                            .await;
                        report.failed += 1;
                    }
                }
            }
            log_batch_complete(batch_num, success, total);
        }

        report.remaining_pending = self.inner.pending_count().await;
        report.paused = self.is_paused();
        report.halted_by_quota = self.is_quota_exhausted();
        if report.halted_by_quota {
            warn!(
                "⛔ 配额已耗尽，已自动暂停，剩余 {} 个条目保持待处理",
                report.remaining_pending
            );
        } else if report.paused {
            info!("⏸️ 已暂停，剩余 {} 个条目待处理", report.remaining_pending);
        }
        report
    }

    /// 重新分析某作业缺失和失败的页
    pub async fn rerun_missing(&self, job_id: &str) -> GradeResult<RerunReport> {
        let doc = self.inner.repo.require(job_id).await?;
        let extraction = doc
            .extraction
            .clone()
            .ok_or_else(|| GradeError::extraction(job_id, "作业没有抽取结果"))?;
        let targets = audit_pages(&extraction, &doc.analysis_results()).pages_to_rerun();

        let mut report = RerunReport {
            job_id: job_id.to_string(),
            pages: targets.clone(),
            ..RerunReport::default()
        };
        if targets.is_empty() {
            info!("[作业 {}] ✓ 没有需要重跑的页", job_id);
            return Ok(report);
        }

        let mut pages: Vec<ExtractedPage> = extraction
            .pages
            .into_iter()
            .filter(|page| targets.contains(&page.page_number))
            .collect();
        pages.sort_by_key(|page| page.page_number);
        info!("[作业 {}] 🔁 重跑 {} 页: {:?}", job_id, pages.len(), targets);

        let ctx = ItemCtx::for_job(job_id);
        let outcome = self.inner.flow.run_all(&ctx, job_id, &pages).await?;
        report.analyzed = outcome.analyzed;
        report.failed = outcome.failed;
        Ok(report)
    }
}

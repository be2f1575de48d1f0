//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、作业存储、评分后端客户端
//! 2. **同步作业**：可选地从后端拉取已有作业到本地存储
//! 3. **批量加载**：扫描输入目录中的 PDF
//! 4. **批量评分**：交给 GradingEngine 的批处理流水线，等待全部完成
//! 5. **全局统计**：输出成功 / 失败 / 待处理数量

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::fs;
use tracing::{info, warn};

use crate::clients::BackendClient;
use crate::config::Config;
use crate::infrastructure::{FsDocumentStore, JobRepository};
use crate::models::{BatchStatus, JobDocument, JobInfo};
use crate::orchestrator::grading_engine::GradingEngine;
use crate::utils::logging::{
    init_log_file, log_documents_loaded, log_startup, print_final_stats,
};
use crate::utils::RecentJobs;

/// 应用主结构
pub struct App {
    config: Config,
    engine: GradingEngine,
    backend: Arc<BackendClient>,
    recent: RecentJobs,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let store = FsDocumentStore::open(&config.data_dir).await?;
        let repo = Arc::new(JobRepository::new(Arc::new(store)));
        let backend = Arc::new(BackendClient::new(&config)?);
        let engine =
            GradingEngine::with_local_scorer(&config, repo, backend.clone(), backend.clone());

        let mut app = Self {
            recent: RecentJobs::new(config.recent_jobs_capacity),
            config,
            engine,
            backend,
        };
        if app.config.sync_remote_jobs {
            app.sync_remote_jobs().await;
        }
        Ok(app)
    }

    pub fn engine(&self) -> &GradingEngine {
        &self.engine
    }

    pub fn recent_jobs(&self) -> &RecentJobs {
        &self.recent
    }

    /// 运行应用主逻辑
    pub async fn run(&mut self) -> Result<()> {
        let files = self.load_documents().await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待评分的PDF文件，程序结束");
            return Ok(());
        }

        log_documents_loaded(files.len(), self.config.batch_size);

        let run = self.engine.run_batch(files).await;
        let report = run.handle.await?;

        // 输出已完成作业的汇总
        for item in self.engine.pipeline().items().await {
            if item.status != BatchStatus::Completed {
                continue;
            }
            let Some(job_id) = item.job_id else {
                continue;
            };
            match self.engine.compute_assignment_summary(&job_id).await {
                Ok(Some(summary)) => info!(
                    "[作业 {}] 📊 {}: 基础分 {} + 加分 {} = {}/{}",
                    job_id,
                    item.file_ref,
                    summary.base_score,
                    summary.bonus_score,
                    summary.total_score,
                    summary.max_score
                ),
                Ok(None) => warn!("[作业 {}] ⚠️ 没有可评分的页面", job_id),
                Err(e) => warn!("[作业 {}] ⚠️ 汇总失败: {}", job_id, e),
            }
            self.recent.touch(JobInfo {
                job_id,
                file_name: file_name_of(&item.file_ref),
                created_at: None,
            });
        }

        print_final_stats(
            report.completed,
            report.failed,
            report.remaining_pending,
            &self.config.output_log_file,
        );

        Ok(())
    }

    /// 扫描输入目录中的 PDF（按文件名排序）
    async fn load_documents(&self) -> Result<Vec<String>> {
        info!("\n📁 正在扫描待评分的文档...");
        let mut entries = fs::read_dir(&self.config.input_folder).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_pdf = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
            if is_pdf {
                files.push(path.to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    /// 从后端拉取本地没有的作业，失败只记录警告
    async fn sync_remote_jobs(&mut self) {
        info!("🔄 正在从评分后端同步作业...");
        let jobs = match self.backend.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("⚠️ 获取作业列表失败: {}", e);
                return;
            }
        };

        let repo = self.engine.repository().clone();
        let mut imported = 0;
        for job in jobs {
            match repo.load(&job.job_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!("[作业 {}] ⚠️ 读取本地作业失败: {}", job.job_id, e);
                    continue;
                }
            }

            let mut doc = JobDocument::new(job.clone());
            match self.backend.fetch_extraction(&job.job_id).await {
                Ok(extraction) => doc.extraction = Some(extraction),
                Err(e) => warn!("[作业 {}] ⚠️ 获取抽取结果失败: {}", job.job_id, e),
            }
            match self.backend.fetch_analysis_results(&job.job_id).await {
                Ok(results) => {
                    for result in results {
                        doc.analysis.insert(result.page_number, result);
                    }
                }
                Err(e) => warn!("[作业 {}] ⚠️ 获取分析结果失败: {}", job.job_id, e),
            }
            match self.backend.fetch_overrides(&job.job_id).await {
                Ok(overrides) => doc.overrides = overrides,
                Err(e) => warn!("[作业 {}] ⚠️ 获取覆盖记录失败: {}", job.job_id, e),
            }

            if let Err(e) = repo.import(doc).await {
                warn!("[作业 {}] ⚠️ 保存作业失败: {}", job.job_id, e);
                continue;
            }
            imported += 1;
            self.recent.touch(job);
        }
        info!("✓ 已同步 {} 个作业", imported);
    }
}

fn file_name_of(file_ref: &str) -> Option<String> {
    Path::new(file_ref)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

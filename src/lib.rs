//! # Heuristic Grader
//!
//! UX 启发式评估作业的评分引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有作业文档存储，只暴露读写能力
//! - `JobRepository` - 作业文档的唯一写入方
//!
//! ### ② 客户端（Clients）
//! - `clients/` - 抽取、分析、评分三个协作方的接口与 HTTP 实现
//!
//! ### ③ 业务能力层（Services）
//! - `OverrideStore` / `OverrideIndex` - 覆盖记录与有效值
//! - `RubricAggregator` - 页面分数汇总为作业分数
//! - `IssueScoreProjector` - 问题级分数推算
//! - `RecomputeDiffer` - 重新评分与分数差异
//! - `ReviewLog` - 纠错记录与风险标记
//!
//! ### ④ 流程层（Workflow）
//! - `ItemCtx` - 上下文封装（条目ID + 作业ID）
//! - `PageFlow` - 一个窗口的页：分析 → 归一化 → 写入
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_pipeline` - 文档队列、并发、暂停 / 继续
//! - `orchestrator/grading_engine` - 对外的全部操作
//! - `orchestrator/app` - 命令行入口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{BackendClient, PageAnalyzer, PageExtractor, Scorer};
pub use config::Config;
pub use error::{GradeError, GradeResult};
pub use infrastructure::JobRepository;
pub use models::{AssignmentSummary, BatchItem, BatchStatus, OverrideDraft, OverrideRecord};
pub use orchestrator::{App, BatchPipeline, BatchReport, GradingEngine};
pub use workflow::{ItemCtx, PageFlow};

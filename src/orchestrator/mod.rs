//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量评分和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 扫描待评分文档、同步后端作业
//! - 输出全局统计信息
//!
//! ### `grading_engine` - 评分引擎
//! - 对外暴露汇总、有效值、覆盖、重新评分、最终成绩
//! - 持有批处理流水线
//!
//! ### `batch_pipeline` - 批处理流水线
//! - 文档队列、分批并发（Semaphore）
//! - 暂停 / 继续、配额自动暂停
//! - 条目状态广播
//!
//! ### `document_processor` - 单个文档处理器
//! - 抽取 → 按窗口分析 → 完成
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! grading_engine
//!     ↓
//! batch_pipeline (处理 Vec<BatchItem>)
//!     ↓
//! document_processor (处理单个文档)
//!     ↓
//! workflow::PageFlow (处理一个窗口的页)
//!     ↓
//! services (能力层：汇总 / 覆盖 / 重新评分)
//!     ↓
//! infrastructure (基础设施：JobRepository)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_pipeline 管批量，document_processor 管单个
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体评分判断

pub mod app;
pub mod batch_pipeline;
pub mod document_processor;
pub mod grading_engine;

// 重新导出主要类型
pub use app::App;
pub use batch_pipeline::{BatchPipeline, BatchReport, RerunReport};
pub use grading_engine::{BatchRun, GradingEngine};

//! 业务能力层（Services）
//!
//! 每个服务只描述「我能做什么」，不做调度：
//! 覆盖记录、有效值、评分汇总、问题级推算、重新评分、审阅日志

pub mod coverage;
pub mod effective_value;
pub mod issue_projector;
pub mod override_store;
pub mod page_audit;
pub mod recompute;
pub mod review_log;
pub mod rubric_aggregator;
pub mod summary_scorer;

pub use coverage::{
    CoverageExtractor, CoverageInput, CoverageTally, StructuredCoverageExtractor,
    TextFallbackCoverageExtractor,
};
pub use effective_value::OverrideIndex;
pub use issue_projector::{IssueScoreProjector, IssueScores};
pub use override_store::OverrideStore;
pub use page_audit::{audit_pages, PageAudit};
pub use recompute::{diff_scoring, RecomputeDiffer};
pub use review_log::ReviewLog;
pub use rubric_aggregator::RubricAggregator;
pub use summary_scorer::SummaryScorer;

pub mod analysis;
pub mod batch;
pub mod issue;
pub mod job;
pub mod overrides;
pub mod review;
pub mod rubric;
pub mod scoring;
pub mod summary;

pub use analysis::{ExtractedPage, ExtractionResult, PageAnalysisResult, PageRole, RelevanceLevel, Violation};
pub use batch::{BatchItem, BatchStatus};
pub use issue::{Issue, TaReview};
pub use job::{JobDocument, JobInfo};
pub use overrides::{FieldPath, OverrideDraft, OverrideRecord, ScoreField};
pub use review::{Correction, RiskFlag};
pub use rubric::{RubricKey, ScoreEntry, ScoreMap};
pub use scoring::{ComponentChange, ComponentScore, RecomputeOutcome, ScoreChange, ScoringDiff, ScoringOutput, ScoringRequest};
pub use summary::{AssignmentSummary, FinalGrade, SummaryScores};

//! 作业文档：一个作业在存储中的全部状态

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::analysis::{ExtractionResult, PageAnalysisResult};
use crate::models::issue::Issue;
use crate::models::overrides::OverrideRecord;
use crate::models::review::RiskFlag;
use crate::models::scoring::ScoringOutput;
use crate::models::summary::FinalGrade;

/// 作业列表项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(alias = "job_id")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// 以 jobId 为键的持久化文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocument {
    pub job: JobInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,
    /// 页码 → 分析结果，每页恰好一条
    #[serde(default)]
    pub analysis: BTreeMap<u32, PageAnalysisResult>,
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringOutput>,
    #[serde(default)]
    pub rubric_comments: BTreeMap<String, String>,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<FinalGrade>,
}

impl JobDocument {
    pub fn new(job: JobInfo) -> Self {
        Self {
            job,
            extraction: None,
            analysis: BTreeMap::new(),
            overrides: Vec::new(),
            issues: Vec::new(),
            scoring: None,
            rubric_comments: BTreeMap::new(),
            risk_flags: Vec::new(),
            final_grade: None,
        }
    }

    /// 分析结果（按页码升序）
    pub fn analysis_results(&self) -> Vec<PageAnalysisResult> {
        self.analysis.values().cloned().collect()
    }
}

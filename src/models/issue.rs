//! 问题（Issue）：跨页、按启发式聚合的违规

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::rubric::{deserialize_keyed, RubricKey};

/// TA 对问题的审阅
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

/// 一个问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_id: String,
    /// H1..H10
    pub heuristic_id: String,
    #[serde(default)]
    pub pages_involved: Vec<u32>,
    #[serde(default)]
    pub ai_proposed_severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ta_review: Option<TaReview>,
    /// 显式的问题级分数；为空时由页面相关度推算
    #[serde(
        default,
        deserialize_with = "deserialize_keyed",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub scores: BTreeMap<RubricKey, f64>,
}

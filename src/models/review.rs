//! 审阅日志：纠错记录与风险标记

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 纠错记录（供下一轮提示词改进使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub id: String,
    pub job_id: String,
    pub page_number: u32,
    pub component: String,
    pub reason: String,
    #[serde(default)]
    pub original_value: JsonValue,
    #[serde(default)]
    pub corrected_value: JsonValue,
    #[serde(default)]
    pub reviewer_notes: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// 人工标记的风险页
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFlag {
    pub page_number: u32,
    #[serde(default)]
    pub notes: String,
    pub timestamp: String,
}

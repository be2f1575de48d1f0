//! 审阅日志 - 业务能力层
//!
//! 人工覆盖的副产物：纠错记录（供下一轮提示词改进）与风险页标记

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::error::GradeResult;
use crate::infrastructure::JobRepository;
use crate::models::{Correction, OverrideRecord, RiskFlag};

const CORRECTION_SOURCE: &str = "auto_from_override";
const AUTO_NOTE_MARKERS: [&str; 4] = ["Auto-set:", "auto-set:", "Auto-generated", "auto-generated"];

/// 审阅人备注是否为系统自动生成
pub fn is_auto_note(notes: &str) -> bool {
    AUTO_NOTE_MARKERS.iter().any(|marker| notes.contains(marker))
}

/// 字段路径中的评分项名（第二段），没有第二段时取整个路径
fn component_of(field: &str) -> &str {
    field.split('.').nth(1).unwrap_or(field)
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub struct ReviewLog {
    repo: Arc<JobRepository>,
}

impl ReviewLog {
    pub fn new(repo: Arc<JobRepository>) -> Self {
        Self { repo }
    }

    /// 新覆盖记录保存后调用：追加纠错记录，必要时标记风险页
    pub async fn on_override(&self, record: &OverrideRecord) -> GradeResult<()> {
        let notes = record.reviewer_notes.clone().unwrap_or_default();
        self.append_correction(record, &notes).await?;

        if !notes.trim().is_empty() && !is_auto_note(&notes) {
            let page_number = record.page_number;
            let added = self
                .repo
                .update_risk_flags(&record.job_id, |flags| {
                    if flags.iter().any(|flag| flag.page_number == page_number) {
                        return false;
                    }
                    flags.push(RiskFlag {
                        page_number,
                        notes: notes.clone(),
                        timestamp: Utc::now().to_rfc3339(),
                    });
                    true
                })
                .await?;
            if added {
                info!("🚩 第 {} 页已标记为风险页 ({})", page_number, record.job_id);
            }
        }
        Ok(())
    }

    async fn append_correction(&self, record: &OverrideRecord, notes: &str) -> GradeResult<()> {
        let component = component_of(&record.field).to_string();
        let mut reason = format!(
            "TA override: Changed {} from {} to {}",
            record.field,
            display_value(&record.original_value),
            display_value(&record.override_value)
        );
        if !notes.is_empty() {
            reason.push_str(&format!(". Notes: {}", notes));
        }

        let correction = Correction {
            id: format!("correction_{}", record.id.trim_start_matches("override_")),
            job_id: record.job_id.clone(),
            page_number: record.page_number,
            component: component.clone(),
            reason,
            original_value: record.original_value.clone(),
            corrected_value: record.override_value.clone(),
            reviewer_notes: if notes.is_empty() {
                "Auto-generated from override".to_string()
            } else {
                notes.to_string()
            },
            timestamp: Utc::now().to_rfc3339(),
            source: Some(CORRECTION_SOURCE.to_string()),
        };

        let appended = self
            .repo
            .append_correction(correction, |existing| {
                existing.job_id == record.job_id
                    && existing.page_number == record.page_number
                    && existing.component == component
                    && existing.original_value == record.original_value
                    && existing.corrected_value == record.override_value
            })
            .await?;
        debug!(
            "纠错记录 {} 第 {} 页 {}: {}",
            record.job_id,
            record.page_number,
            component,
            if appended { "已追加" } else { "已存在，跳过" }
        );
        Ok(())
    }

    /// 纠错记录，可按作业过滤
    pub async fn corrections(&self, job_id: Option<&str>) -> GradeResult<Vec<Correction>> {
        let corrections = self.repo.corrections().await?;
        Ok(match job_id {
            Some(job_id) => corrections
                .into_iter()
                .filter(|c| c.job_id == job_id)
                .collect(),
            None => corrections,
        })
    }

    /// 切换风险标记，返回切换后该页是否被标记
    pub async fn toggle_risk_flag(&self, job_id: &str, page_number: u32, notes: &str) -> GradeResult<bool> {
        let notes = notes.to_string();
        let flagged = self
            .repo
            .update_risk_flags(job_id, |flags| {
                match flags.iter().position(|flag| flag.page_number == page_number) {
                    Some(position) => {
                        flags.remove(position);
                        false
                    }
                    None => {
                        flags.push(RiskFlag {
                            page_number,
                            notes,
                            timestamp: Utc::now().to_rfc3339(),
                        });
                        true
                    }
                }
            })
            .await?;
        info!(
            "🚩 {} 第 {} 页风险标记已{}",
            job_id,
            page_number,
            if flagged { "添加" } else { "移除" }
        );
        Ok(flagged)
    }

    /// 人工标记的风险页（不含自动生成的备注）
    pub async fn risk_flags(&self, job_id: &str) -> GradeResult<Vec<RiskFlag>> {
        Ok(self
            .repo
            .risk_flags(job_id)
            .await?
            .into_iter()
            .filter(|flag| !flag.notes.trim().is_empty() && !is_auto_note(&flag.notes))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionResult;
    use serde_json::json;

    async fn review_log() -> ReviewLog {
        let repo = Arc::new(JobRepository::in_memory());
        repo.save_extraction(&ExtractionResult {
            job_id: "job-1".to_string(),
            file_name: None,
            created_at: None,
            pages: Vec::new(),
        })
        .await
        .unwrap();
        ReviewLog::new(repo)
    }

    fn record(id: &str, notes: Option<&str>) -> OverrideRecord {
        OverrideRecord {
            id: id.to_string(),
            job_id: "job-1".to_string(),
            page_number: 3,
            field: "score_breakdown.violation_quality.points".to_string(),
            original_value: json!(14),
            override_value: json!(18),
            reviewer_name: None,
            reviewer_notes: notes.map(str::to_string),
            timestamp: "t".to_string(),
        }
    }

    #[test]
    fn test_component_and_auto_notes() {
        assert_eq!(
            component_of("score_breakdown.violation_quality.points"),
            "violation_quality"
        );
        assert_eq!(component_of("feedback"), "feedback");
        assert!(is_auto_note("Auto-set: All 10 heuristics covered"));
        assert!(!is_auto_note("Screenshots are unreadable"));
    }

    #[tokio::test]
    async fn test_corrections_are_deduplicated() {
        let log = review_log().await;
        log.on_override(&record("override_1_0", None)).await.unwrap();
        log.on_override(&record("override_2_1", None)).await.unwrap();

        let corrections = log.corrections(Some("job-1")).await.unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].component, "violation_quality");
        assert_eq!(corrections[0].source.as_deref(), Some("auto_from_override"));
        assert!(log.corrections(Some("job-2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reviewer_notes_flag_page_once() {
        let log = review_log().await;
        log.on_override(&record("override_1_0", Some("Auto-set: coverage")))
            .await
            .unwrap();
        assert!(log.risk_flags("job-1").await.unwrap().is_empty());

        log.on_override(&record("override_2_1", Some("AI misread the table")))
            .await
            .unwrap();
        log.on_override(&record("override_3_2", Some("still wrong")))
            .await
            .unwrap();
        let flags = log.risk_flags("job-1").await.unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].notes, "AI misread the table");
    }

    #[tokio::test]
    async fn test_toggle_risk_flag() {
        let log = review_log().await;
        assert!(log.toggle_risk_flag("job-1", 2, "check").await.unwrap());
        assert_eq!(log.risk_flags("job-1").await.unwrap().len(), 1);
        assert!(!log.toggle_risk_flag("job-1", 2, "").await.unwrap());
        assert!(log.risk_flags("job-1").await.unwrap().is_empty());
    }
}

//! 有效值解析 - 业务能力层
//!
//! 覆盖日志按 (页码, 字段) 建索引，索引指向最后追加的那条记录

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::models::{FieldPath, OverrideRecord, RubricKey};

/// 覆盖记录索引
///
/// 一次聚合只建一次索引，之后每次查找都是 O(1)
#[derive(Debug, Clone, Default)]
pub struct OverrideIndex {
    records: Vec<OverrideRecord>,
    latest: HashMap<u32, HashMap<String, usize>>,
}

impl OverrideIndex {
    /// 按日志顺序建立索引，后追加的覆盖先追加的
    pub fn new(records: Vec<OverrideRecord>) -> Self {
        let mut latest: HashMap<u32, HashMap<String, usize>> = HashMap::new();
        for (position, record) in records.iter().enumerate() {
            latest
                .entry(record.page_number)
                .or_default()
                .insert(record.field.clone(), position);
        }
        Self { records, latest }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 某页某字段当前生效的覆盖记录
    pub fn latest(&self, page_number: u32, field: &str) -> Option<&OverrideRecord> {
        self.latest
            .get(&page_number)
            .and_then(|fields| fields.get(field))
            .map(|&position| &self.records[position])
    }

    /// 某页某字段当前生效的覆盖值
    pub fn get(&self, page_number: u32, field: &str) -> Option<&JsonValue> {
        self.latest(page_number, field).map(|r| &r.override_value)
    }

    /// 有覆盖取最后一条，否则取原值
    pub fn effective_value(&self, page_number: u32, field: &str, base: JsonValue) -> JsonValue {
        self.get(page_number, field).cloned().unwrap_or(base)
    }

    pub fn effective_points(&self, page_number: u32, key: RubricKey, base: Option<f64>) -> Option<f64> {
        match self.get(page_number, &FieldPath::points(key).to_string()) {
            Some(value) => value.as_f64().or(base),
            None => base,
        }
    }

    pub fn effective_comment(
        &self,
        page_number: u32,
        key: RubricKey,
        base: Option<&str>,
    ) -> Option<String> {
        match self.get(page_number, &FieldPath::comment(key).to_string()) {
            Some(JsonValue::String(text)) => Some(text.clone()),
            _ => base.map(str::to_string),
        }
    }

    pub fn effective_skip(&self, page_number: u32, base: bool) -> bool {
        self.get(page_number, "skip_analysis")
            .and_then(JsonValue::as_bool)
            .unwrap_or(base)
    }

    pub fn effective_text<'a>(&'a self, page_number: u32, field: FieldPath, base: &'a str) -> &'a str {
        match self.get(page_number, &field.to_string()) {
            Some(JsonValue::String(text)) => text.as_str(),
            _ => base,
        }
    }

    /// 对某字段有覆盖的所有页（页码升序）
    pub fn overridden_pages(&self, field: &str) -> Vec<(u32, &JsonValue)> {
        let mut pages: Vec<(u32, &JsonValue)> = self
            .latest
            .iter()
            .filter_map(|(&page, fields)| {
                fields
                    .get(field)
                    .map(|&position| (page, &self.records[position].override_value))
            })
            .collect();
        pages.sort_by_key(|(page, _)| *page);
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(page: u32, field: &str, value: JsonValue) -> OverrideRecord {
        OverrideRecord {
            id: format!("override_{}_{}", page, field),
            job_id: "job-1".to_string(),
            page_number: page,
            field: field.to_string(),
            original_value: JsonValue::Null,
            override_value: value,
            reviewer_name: None,
            reviewer_notes: None,
            timestamp: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_last_appended_record_wins() {
        let field = "score_breakdown.screenshots.points";
        let index = OverrideIndex::new(vec![
            record(1, field, json!(4)),
            record(2, field, json!(9)),
            record(1, field, json!(6)),
        ]);
        assert_eq!(index.effective_value(1, field, json!(2)), json!(6));
        assert_eq!(index.effective_value(2, field, json!(2)), json!(9));
        assert_eq!(index.effective_value(3, field, json!(2)), json!(2));
        assert_eq!(index.effective_value(1, "feedback", json!("x")), json!("x"));
    }

    #[test]
    fn test_insertion_order_beats_timestamp() {
        let field = "feedback";
        let mut newer = record(1, field, json!("first"));
        newer.timestamp = "2030-01-01T00:00:00Z".to_string();
        let older = record(1, field, json!("second"));
        let index = OverrideIndex::new(vec![newer, older]);
        assert_eq!(index.get(1, field), Some(&json!("second")));
    }

    #[test]
    fn test_typed_helpers() {
        let index = OverrideIndex::new(vec![
            record(1, "score_breakdown.coverage.points", json!(15)),
            record(1, "score_breakdown.coverage.comment", json!("checked by hand")),
            record(2, "skip_analysis", json!(true)),
        ]);
        assert_eq!(index.effective_points(1, RubricKey::Coverage, None), Some(15.0));
        assert_eq!(index.effective_points(2, RubricKey::Coverage, Some(3.0)), Some(3.0));
        assert_eq!(
            index.effective_comment(1, RubricKey::Coverage, Some("auto")),
            Some("checked by hand".to_string())
        );
        assert!(index.effective_skip(2, false));
        assert!(!index.effective_skip(1, false));
        assert_eq!(
            index.overridden_pages("score_breakdown.coverage.points"),
            vec![(1, &json!(15))]
        );
    }
}

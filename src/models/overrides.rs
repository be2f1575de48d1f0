//! 人工覆盖记录
//!
//! 只追加，不删除；同一字段的多条记录以最后追加的为准。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;
use crate::models::rubric::{clamp_points, RubricKey};

/// 已保存的覆盖记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub id: String,
    pub job_id: String,
    pub page_number: u32,
    /// 点分字段路径，如 `score_breakdown.violation_quality.points`
    pub field: String,
    #[serde(default)]
    pub original_value: JsonValue,
    pub override_value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    pub timestamp: String,
}

/// 待保存的覆盖（由审阅人提交，尚未分配 id / 时间戳）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideDraft {
    pub job_id: String,
    pub page_number: u32,
    pub field: String,
    #[serde(default)]
    pub original_value: JsonValue,
    pub override_value: JsonValue,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    #[serde(default)]
    pub reviewer_notes: Option<String>,
}

impl OverrideDraft {
    pub fn new(
        job_id: impl Into<String>,
        page_number: u32,
        field: impl Into<String>,
        original_value: JsonValue,
        override_value: JsonValue,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            page_number,
            field: field.into(),
            original_value,
            override_value,
            reviewer_name: None,
            reviewer_notes: None,
        }
    }

    pub fn with_reviewer(mut self, name: impl Into<String>, notes: impl Into<String>) -> Self {
        self.reviewer_name = Some(name.into());
        self.reviewer_notes = Some(notes.into());
        self
    }

    /// 校验并返回解析后的字段路径
    pub fn validate(&self) -> Result<FieldPath, ValidationError> {
        if self.job_id.trim().is_empty() {
            return Err(ValidationError::EmptyJobId);
        }
        if self.page_number == 0 {
            return Err(ValidationError::InvalidPageNumber {
                page_number: self.page_number,
            });
        }
        let path = FieldPath::parse(&self.field)?;
        path.validate_value(&self.override_value)?;
        Ok(path)
    }
}

/// 评分项中的子字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreField {
    Points,
    Comment,
}

/// 可被覆盖的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Score { key: RubricKey, field: ScoreField },
    Feedback,
    PageType,
    SkipAnalysis,
}

impl FieldPath {
    /// 解析点分路径
    pub fn parse(field: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedField {
            field: field.to_string(),
        };
        let parts: Vec<&str> = field.split('.').collect();
        match parts.as_slice() {
            ["feedback"] => Ok(FieldPath::Feedback),
            ["page_type"] => Ok(FieldPath::PageType),
            ["skip_analysis"] => Ok(FieldPath::SkipAnalysis),
            [section, key, sub] => {
                let key = RubricKey::from_str(key).ok_or_else(malformed)?;
                if *section != key.section().as_str() {
                    return Err(malformed());
                }
                let field = match *sub {
                    "points" => ScoreField::Points,
                    "comment" => ScoreField::Comment,
                    _ => return Err(malformed()),
                };
                Ok(FieldPath::Score { key, field })
            }
            _ => Err(malformed()),
        }
    }

    pub fn points(key: RubricKey) -> Self {
        FieldPath::Score {
            key,
            field: ScoreField::Points,
        }
    }

    pub fn comment(key: RubricKey) -> Self {
        FieldPath::Score {
            key,
            field: ScoreField::Comment,
        }
    }

    /// 覆盖值类型与范围校验
    pub fn validate_value(&self, value: &JsonValue) -> Result<(), ValidationError> {
        let wrong_type = |expected: &'static str| ValidationError::WrongValueType {
            field: self.to_string(),
            expected,
        };
        match self {
            FieldPath::Score {
                key,
                field: ScoreField::Points,
            } => {
                let points = value.as_f64().ok_or_else(|| wrong_type("number"))?;
                let max = key.max_points();
                if !points.is_finite() || clamp_points(points, max) != points {
                    return Err(ValidationError::ScoreOutOfRange {
                        field: self.to_string(),
                        value: points,
                        max,
                    });
                }
                Ok(())
            }
            FieldPath::Score {
                field: ScoreField::Comment,
                ..
            }
            | FieldPath::Feedback
            | FieldPath::PageType => value.as_str().map(|_| ()).ok_or_else(|| wrong_type("string")),
            FieldPath::SkipAnalysis => value.as_bool().map(|_| ()).ok_or_else(|| wrong_type("bool")),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Score { key, field } => {
                let sub = match field {
                    ScoreField::Points => "points",
                    ScoreField::Comment => "comment",
                };
                write!(f, "{}.{}.{}", key.section().as_str(), key.as_str(), sub)
            }
            FieldPath::Feedback => f.write_str("feedback"),
            FieldPath::PageType => f.write_str("page_type"),
            FieldPath::SkipAnalysis => f.write_str("skip_analysis"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_paths() {
        assert_eq!(
            FieldPath::parse("score_breakdown.violation_quality.points").unwrap(),
            FieldPath::points(RubricKey::ViolationQuality)
        );
        assert_eq!(
            FieldPath::parse("bonus_scores.bonus_ai_opportunities.comment").unwrap(),
            FieldPath::comment(RubricKey::BonusAiOpportunities)
        );
        assert_eq!(FieldPath::parse("feedback").unwrap(), FieldPath::Feedback);
        assert_eq!(
            FieldPath::points(RubricKey::Coverage).to_string(),
            "score_breakdown.coverage.points"
        );
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        for field in [
            "",
            "score_breakdown",
            "score_breakdown.originality.points",
            "bonus_scores.coverage.points",
            "score_breakdown.bonus_ai_opportunities.points",
            "score_breakdown.coverage.max",
            "score_breakdown.coverage.points.extra",
        ] {
            assert!(
                matches!(
                    FieldPath::parse(field),
                    Err(ValidationError::MalformedField { .. })
                ),
                "应拒绝: {}",
                field
            );
        }
    }

    #[test]
    fn test_value_validation() {
        let draft = OverrideDraft::new(
            "job-1",
            2,
            "score_breakdown.violation_quality.points",
            json!(14),
            json!(21),
        );
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::ScoreOutOfRange { max, .. }) if max == 20.0
        ));

        let draft = OverrideDraft::new("job-1", 2, "skip_analysis", json!(false), json!("yes"));
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::WrongValueType { expected: "bool", .. })
        ));

        let draft = OverrideDraft::new("job-1", 0, "feedback", json!(""), json!("x"));
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::InvalidPageNumber { .. })
        ));

        let draft = OverrideDraft::new(" ", 1, "feedback", json!(""), json!("x"));
        assert_eq!(draft.validate(), Err(ValidationError::EmptyJobId));
    }

    #[test]
    fn test_points_bounded_by_each_rubric_max() {
        for key in RubricKey::ALL.iter() {
            let path = FieldPath::points(*key);
            let max = key.max_points();
            assert_eq!(path.validate_value(&json!(max)), Ok(()), "{}", path);
            assert_eq!(path.validate_value(&json!(0)), Ok(()), "{}", path);
            assert!(
                matches!(
                    path.validate_value(&json!(max + 0.5)),
                    Err(ValidationError::ScoreOutOfRange { max: m, .. }) if m == max
                ),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_record_round_trip() {
        let record = OverrideRecord {
            id: "override_1".to_string(),
            job_id: "job-1".to_string(),
            page_number: 4,
            field: "score_breakdown.coverage.points".to_string(),
            original_value: json!(0),
            override_value: json!(15),
            reviewer_name: Some("TA".to_string()),
            reviewer_notes: None,
            timestamp: "2025-01-01T00:00:00Z".to_string(),
        };
        let text = serde_json::to_string(&record).unwrap();
        assert!(text.contains("\"pageNumber\":4"));
        let back: OverrideRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}

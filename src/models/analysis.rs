//! 页面分析结果与抽取结果

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::rubric::{deserialize_keyed, deserialize_score_map, RubricKey, ScoreEntry, ScoreMap};

/// 抽取出的单页
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    #[serde(alias = "pageNumber")]
    pub page_number: u32,
    #[serde(default)]
    pub snippet: String,
    /// base64 data URL
    #[serde(
        default,
        alias = "image_base64",
        alias = "imageBase64",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<String>,
}

/// 一份 PDF 的抽取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    #[serde(alias = "job_id")]
    pub job_id: String,
    #[serde(default, alias = "file_name", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub pages: Vec<ExtractedPage>,
}

impl ExtractionResult {
    /// 抽取出的页码（升序）
    pub fn page_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.pages.iter().map(|p| p.page_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}

/// 一条违规
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(
        default,
        alias = "heuristic_number",
        deserialize_with = "deserialize_heuristic",
        skip_serializing_if = "Option::is_none"
    )]
    pub heuristic_num: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
}

impl Violation {
    /// 归一化后的启发式编号（1..=10），否则 None
    pub fn heuristic(&self) -> Option<u32> {
        self.heuristic_num.filter(|n| (1..=10).contains(n))
    }
}

/// 启发式编号可能是整数，也可能是 "3" / "H3" / "Heuristic 3"
fn deserialize_heuristic<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct HeuristicVisitor;

    impl<'de> Visitor<'de> for HeuristicVisitor {
        type Value = Option<u32>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a heuristic number as integer or string")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(u32::try_from(value).ok())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(u32::try_from(value).ok())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 {
                Ok(Some(value as u32))
            } else {
                Ok(None)
            }
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let digits: String = value
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            Ok(digits.parse().ok())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(HeuristicVisitor)
}

/// 页面在某个问题（Issue）中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageRole {
    ViolationDetail,
    Overview,
    SeveritySummary,
    #[serde(other)]
    Other,
}

/// 评分项相关度（定性）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceLevel {
    None,
    Low,
    #[serde(alias = "medium")]
    Med,
    High,
}

impl RelevanceLevel {
    /// 相关度换算为分数
    pub fn points(self, max: f64) -> f64 {
        match self {
            RelevanceLevel::High => max,
            RelevanceLevel::Med => (0.7 * max).round(),
            RelevanceLevel::Low => (0.4 * max).round(),
            RelevanceLevel::None => 0.0,
        }
    }
}

/// 单页 AI 分析结果
///
/// 写入后不可变，人工修正走覆盖记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysisResult {
    #[serde(alias = "pageNumber")]
    pub page_number: u32,
    #[serde(default)]
    pub skip_analysis: bool,
    #[serde(default)]
    pub page_type: String,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub extracted_violations: Vec<Violation>,
    #[serde(default, deserialize_with = "deserialize_score_map")]
    pub score_breakdown: ScoreMap,
    #[serde(default, deserialize_with = "deserialize_score_map")]
    pub bonus_scores: ScoreMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_role: Option<PageRole>,
    #[serde(
        default,
        deserialize_with = "deserialize_keyed",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub rubric_relevance: BTreeMap<RubricKey, RelevanceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageAnalysisResult {
    /// 空结果（测试和兜底用）
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number,
            skip_analysis: false,
            page_type: String::new(),
            feedback: String::new(),
            extracted_violations: Vec::new(),
            score_breakdown: ScoreMap::new(),
            bonus_scores: ScoreMap::new(),
            page_role: None,
            rubric_relevance: BTreeMap::new(),
            error: None,
        }
    }

    /// 分析失败的页
    pub fn failed(page_number: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            skip_analysis: true,
            page_type: "Unknown (error)".to_string(),
            feedback: format!("Error analyzing page {}: {}", page_number, message),
            error: Some(message),
            ..Self::new(page_number)
        }
    }

    /// 写入前归一化：页码以请求为准，满分以细则为准，分数截断
    pub fn normalized(mut self, page_number: u32) -> Self {
        self.page_number = page_number;
        self.score_breakdown = normalize_map(self.score_breakdown);
        self.bonus_scores = normalize_map(self.bonus_scores);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 某评分项的原始得分（按所属分区查找）
    pub fn score(&self, key: RubricKey) -> Option<&ScoreEntry> {
        if key.is_bonus() {
            self.bonus_scores.get(&key)
        } else {
            self.score_breakdown.get(&key)
        }
    }
}

fn normalize_map(map: ScoreMap) -> ScoreMap {
    map.into_iter()
        .map(|(key, entry)| (key, entry.normalized(key)))
        .collect()
}

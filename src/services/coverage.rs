//! 覆盖度统计策略 - 业务能力层
//!
//! 覆盖度不是逐页取最大，而是全作业统计：不同启发式的并集与违规条目总数。
//! 结构化违规列表优先；没有结构化数据的「启发式分析」页可退回到正文匹配。

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::rubric::{REQUIRED_HEURISTICS, REQUIRED_VIOLATIONS};
use crate::models::Violation;

static HEURISTIC_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)heuristic\s+(\d+)").expect("heuristic pattern is valid")
});

static VIOLATION_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)identifies?\s+(\d+)\s+violations?").expect("violation pattern is valid")
});

/// 单页统计所需的输入（均为覆盖后的有效值）
#[derive(Debug, Clone, Copy)]
pub struct CoverageInput<'a> {
    pub page_number: u32,
    pub page_type: &'a str,
    pub feedback: &'a str,
    pub violations: &'a [Violation],
}

/// 覆盖度统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageTally {
    /// 出现过的不同启发式（1..=10）
    pub heuristics: BTreeSet<u32>,
    /// 启发式引用次数（不去重）
    pub heuristic_refs: usize,
    /// 违规条目数
    pub violations: usize,
}

impl CoverageTally {
    pub fn merge(&mut self, other: CoverageTally) {
        self.heuristics.extend(other.heuristics);
        self.heuristic_refs += other.heuristic_refs;
        self.violations += other.violations;
    }

    pub fn unique_heuristics(&self) -> usize {
        self.heuristics.len()
    }

    /// 满分条件：10 个启发式全覆盖且至少 12 条违规
    pub fn is_complete(&self) -> bool {
        self.unique_heuristics() >= REQUIRED_HEURISTICS && self.violations >= REQUIRED_VIOLATIONS
    }

    /// 说明文字，引用实际数量
    pub fn comment(&self) -> String {
        if self.is_complete() {
            format!(
                "All {} heuristics covered with {} violations identified",
                self.unique_heuristics(),
                self.violations
            )
        } else {
            format!(
                "Only {}/{} heuristics covered and {} violations identified (requires all {} heuristics and at least {} violations)",
                self.unique_heuristics(),
                REQUIRED_HEURISTICS,
                self.violations,
                REQUIRED_HEURISTICS,
                REQUIRED_VIOLATIONS
            )
        }
    }
}

/// 覆盖度统计策略
///
/// 返回 None 表示本策略不适用于该页，交给下一个策略
pub trait CoverageExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn tally(&self, input: &CoverageInput<'_>) -> Option<CoverageTally>;
}

/// 从结构化违规列表统计
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredCoverageExtractor;

impl CoverageExtractor for StructuredCoverageExtractor {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn tally(&self, input: &CoverageInput<'_>) -> Option<CoverageTally> {
        if input.violations.is_empty() {
            return None;
        }
        let mut tally = CoverageTally {
            violations: input.violations.len(),
            ..CoverageTally::default()
        };
        for heuristic in input.violations.iter().filter_map(Violation::heuristic) {
            tally.heuristics.insert(heuristic);
            tally.heuristic_refs += 1;
        }
        Some(tally)
    }
}

/// 从反馈正文匹配（概率性，可能多算或少算）
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFallbackCoverageExtractor;

impl TextFallbackCoverageExtractor {
    /// 只对「启发式分析 / 违规」类型且没有结构化数据的页生效
    fn applies(input: &CoverageInput<'_>) -> bool {
        let page_type = input.page_type.to_lowercase();
        input.violations.is_empty()
            && page_type.contains("heuristic")
            && (page_type.contains("analysis") || page_type.contains("violation"))
    }
}

impl CoverageExtractor for TextFallbackCoverageExtractor {
    fn name(&self) -> &'static str {
        "text_fallback"
    }

    fn tally(&self, input: &CoverageInput<'_>) -> Option<CoverageTally> {
        if !Self::applies(input) {
            return None;
        }

        let heuristics: BTreeSet<u32> = HEURISTIC_MENTION
            .captures_iter(input.feedback)
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .filter(|n| (1..=10).contains(n))
            .collect();

        let explicit: Vec<usize> = VIOLATION_COUNT
            .captures_iter(input.feedback)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .collect();

        // 没有明确数量时，每个提到的启发式至少算一条
        let violations = if explicit.is_empty() {
            heuristics.len()
        } else {
            explicit.iter().sum()
        };

        if heuristics.is_empty() && violations == 0 {
            return None;
        }

        Some(CoverageTally {
            heuristic_refs: heuristics.len(),
            heuristics,
            violations,
        })
    }
}

/// 默认策略链：结构化优先，正文兜底
pub fn default_extractors() -> Vec<Box<dyn CoverageExtractor>> {
    vec![
        Box::new(StructuredCoverageExtractor),
        Box::new(TextFallbackCoverageExtractor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(n: u32) -> Violation {
        Violation {
            heuristic_num: Some(n),
            description: format!("violation of H{}", n),
            severity: "minor".to_string(),
        }
    }

    fn input<'a>(page_type: &'a str, feedback: &'a str, violations: &'a [Violation]) -> CoverageInput<'a> {
        CoverageInput {
            page_number: 1,
            page_type,
            feedback,
            violations,
        }
    }

    #[test]
    fn test_structured_counts_entries_and_distinct_heuristics() {
        let violations = vec![violation(1), violation(1), violation(3), violation(12)];
        let tally = StructuredCoverageExtractor
            .tally(&input("Heuristic Analysis", "", &violations))
            .unwrap();
        assert_eq!(tally.violations, 4);
        assert_eq!(tally.heuristic_refs, 3);
        assert_eq!(tally.heuristics.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_fallback_reads_feedback() {
        let feedback = "The team identifies 3 violations of Heuristic 2 and heuristic 5.";
        let tally = TextFallbackCoverageExtractor
            .tally(&input("Heuristic Violation Analysis", feedback, &[]))
            .unwrap();
        assert_eq!(tally.unique_heuristics(), 2);
        assert_eq!(tally.violations, 3);
    }

    #[test]
    fn test_fallback_assumes_one_violation_per_heuristic() {
        let feedback = "Discusses Heuristic 4, Heuristic 7 and Heuristic 4 again";
        let tally = TextFallbackCoverageExtractor
            .tally(&input("heuristic analysis", feedback, &[]))
            .unwrap();
        assert_eq!(tally.violations, 2);
    }

    #[test]
    fn test_fallback_ignores_other_page_types() {
        let feedback = "Heuristic 1 is mentioned";
        assert!(TextFallbackCoverageExtractor
            .tally(&input("Introduction", feedback, &[]))
            .is_none());
        let violations = vec![violation(1)];
        assert!(TextFallbackCoverageExtractor
            .tally(&input("Heuristic Analysis", feedback, &violations))
            .is_none());
    }

    #[test]
    fn test_comment_cites_counts() {
        let tally = CoverageTally {
            heuristics: (1..=9).collect(),
            heuristic_refs: 20,
            violations: 20,
        };
        assert!(!tally.is_complete());
        let comment = tally.comment();
        assert!(comment.contains('9'));
        assert!(comment.contains("20"));
    }
}

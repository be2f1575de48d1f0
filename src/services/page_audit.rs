//! 页面核对 - 业务能力层
//!
//! 对比抽取出的页与已有的分析结果，找出缺失、多余与失败的页

use std::collections::BTreeSet;

use crate::error::{GradeError, GradeResult, PageGap};
use crate::models::{ExtractionResult, PageAnalysisResult};

/// 核对结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAudit {
    pub job_id: String,
    pub extracted_count: usize,
    pub analyzed_count: usize,
    /// 已抽取但没有分析结果
    pub missing_analysis: Vec<u32>,
    /// 有分析结果但不在抽取结果中
    pub orphan_analysis: Vec<u32>,
    /// 分析失败（带 error）
    pub failed: Vec<u32>,
}

impl PageAudit {
    /// 抽取与分析的页集合一致
    pub fn is_consistent(&self) -> bool {
        self.missing_analysis.is_empty() && self.orphan_analysis.is_empty()
    }

    /// 需要重新分析的页：缺失 + 失败（升序）
    pub fn pages_to_rerun(&self) -> Vec<u32> {
        let pages: BTreeSet<u32> = self
            .missing_analysis
            .iter()
            .chain(self.failed.iter())
            .copied()
            .collect();
        pages.into_iter().collect()
    }

    /// 不一致时转为 AggregationGap
    pub fn into_gap(self) -> Option<GradeError> {
        if self.is_consistent() {
            return None;
        }
        Some(GradeError::AggregationGap(PageGap {
            job_id: self.job_id,
            extracted_count: self.extracted_count,
            analyzed_count: self.analyzed_count,
            missing_analysis: self.missing_analysis,
            orphan_analysis: self.orphan_analysis,
        }))
    }

    pub fn ensure_consistent(self) -> GradeResult<()> {
        match self.into_gap() {
            Some(gap) => Err(gap),
            None => Ok(()),
        }
    }
}

/// 核对一个作业的抽取页与分析结果
pub fn audit_pages(extraction: &ExtractionResult, results: &[PageAnalysisResult]) -> PageAudit {
    let extracted: BTreeSet<u32> = extraction.page_numbers().into_iter().collect();
    let analyzed: BTreeSet<u32> = results.iter().map(|r| r.page_number).collect();

    PageAudit {
        job_id: extraction.job_id.clone(),
        extracted_count: extracted.len(),
        analyzed_count: analyzed.len(),
        missing_analysis: extracted.difference(&analyzed).copied().collect(),
        orphan_analysis: analyzed.difference(&extracted).copied().collect(),
        failed: results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| r.page_number)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedPage;

    fn extraction(pages: &[u32]) -> ExtractionResult {
        ExtractionResult {
            job_id: "job-1".to_string(),
            file_name: None,
            created_at: None,
            pages: pages
                .iter()
                .map(|&n| ExtractedPage {
                    page_number: n,
                    snippet: String::new(),
                    image: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_consistent_job() {
        let results = vec![PageAnalysisResult::new(1), PageAnalysisResult::new(2)];
        let audit = audit_pages(&extraction(&[1, 2]), &results);
        assert!(audit.is_consistent());
        assert!(audit.pages_to_rerun().is_empty());
        assert!(audit.ensure_consistent().is_ok());
    }

    #[test]
    fn test_gap_lists_pages() {
        let results = vec![
            PageAnalysisResult::new(1),
            PageAnalysisResult::failed(2, "timeout"),
            PageAnalysisResult::new(7),
        ];
        let audit = audit_pages(&extraction(&[1, 2, 3, 4]), &results);
        assert_eq!(audit.missing_analysis, vec![3, 4]);
        assert_eq!(audit.orphan_analysis, vec![7]);
        assert_eq!(audit.pages_to_rerun(), vec![2, 3, 4]);

        match audit.into_gap() {
            Some(GradeError::AggregationGap(gap)) => {
                assert_eq!(gap.extracted_count, 4);
                assert_eq!(gap.analyzed_count, 3);
            }
            other => panic!("应为 AggregationGap: {:?}", other),
        }
    }
}

//! 批处理条目

use std::fmt;

use serde::{Deserialize, Serialize};

/// 条目状态
///
/// pending → extracting → analyzing → completed；extracting / analyzing 可转入 error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Extracting,
    Analyzing,
    Completed,
    Error,
}

impl BatchStatus {
    /// 是否正在处理
    pub fn is_in_flight(self) -> bool {
        matches!(self, BatchStatus::Extracting | BatchStatus::Analyzing)
    }

    /// 是否已结束（不会被自动重新处理）
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Error)
    }

    /// 状态机允许的迁移
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, Analyzing)
                | (Extracting, Error)
                | (Analyzing, Analyzing)
                | (Analyzing, Completed)
                | (Analyzing, Error)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Extracting => "extracting",
            BatchStatus::Analyzing => "analyzing",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// 一个待评分文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub id: u64,
    pub file_ref: String,
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// 0..=100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn new(id: u64, file_ref: impl Into<String>) -> Self {
        Self {
            id,
            file_ref: file_ref.into(),
            status: BatchStatus::Pending,
            job_id: None,
            progress: 0,
            error: None,
        }
    }
}

/// 分析阶段进度：抽取完成记 10%，其余 90% 按已分析页数向上取整
pub fn analysis_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = 10 + (90 * done).div_ceil(total);
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(BatchStatus::Pending.can_transition_to(BatchStatus::Extracting));
        assert!(BatchStatus::Extracting.can_transition_to(BatchStatus::Error));
        assert!(!BatchStatus::Pending.can_transition_to(BatchStatus::Completed));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Extracting));
        assert!(!BatchStatus::Error.can_transition_to(BatchStatus::Pending));
    }

    #[test]
    fn test_progress_is_monotonic_and_ceiled() {
        let values: Vec<u8> = (0..=7).map(|done| analysis_progress(done, 7)).collect();
        assert_eq!(values.first(), Some(&10));
        assert_eq!(values.last(), Some(&100));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        // 90 / 7 = 12.86 → 13
        assert_eq!(analysis_progress(1, 7), 23);
    }
}

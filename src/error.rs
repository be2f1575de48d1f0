use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// 判定配额/限流信号的正则（大小写不敏感）
static QUOTA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)quota|rate[ _-]?limit|resource[ _]exhausted|billing|too many requests|\b429\b")
        .expect("quota pattern is valid")
});

/// 评分引擎错误类型
#[derive(Debug, Error)]
pub enum GradeError {
    /// 与分析服务之间的网络/连接错误，按页/按条目上报，不在本层重试
    #[error("网络错误 ({endpoint}): {message}")]
    TransientIo { endpoint: String, message: String },

    /// 配额耗尽或被限流，调用方应停止继续提交
    #[error("配额已耗尽: {message}")]
    QuotaExceeded { message: String },

    /// 覆盖记录校验失败，不会被持久化
    #[error("校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 抽取页与分析结果不一致
    #[error("页面不一致: {0}")]
    AggregationGap(PageGap),

    /// 作业不存在
    #[error("作业不存在: {job_id}")]
    JobNotFound { job_id: String },

    /// 作业中没有该问题
    #[error("作业 {job_id} 中不存在问题: {issue_id}")]
    IssueNotFound { job_id: String, issue_id: String },

    /// 页面抽取失败
    #[error("抽取失败 ({file_ref}): {message}")]
    Extraction { file_ref: String, message: String },

    /// 评分服务失败
    #[error("评分失败: {message}")]
    Scoring { message: String },

    /// 存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 覆盖记录校验错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// 作业ID为空
    #[error("jobId 不能为空")]
    EmptyJobId,
    /// 页码必须从 1 开始
    #[error("页码无效: {page_number}")]
    InvalidPageNumber { page_number: u32 },
    /// 字段路径格式错误
    #[error("字段路径格式错误: {field}")]
    MalformedField { field: String },
    /// 分数超出 [0, max]
    #[error("字段 {field} 的分数 {value} 超出范围 [0, {max}]")]
    ScoreOutOfRange { field: String, value: f64, max: f64 },
    /// 值类型不匹配
    #[error("字段 {field} 需要 {expected} 类型的值")]
    WrongValueType { field: String, expected: &'static str },
}

/// 抽取阶段与分析阶段页面集合的差异
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageGap {
    pub job_id: String,
    pub extracted_count: usize,
    pub analyzed_count: usize,
    /// 已抽取但没有分析结果的页
    pub missing_analysis: Vec<u32>,
    /// 有分析结果但抽取结果中不存在的页
    pub orphan_analysis: Vec<u32>,
}

impl std::fmt::Display for PageGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "作业 {} 抽取 {} 页，分析 {} 页；缺少分析: {:?}；多余分析: {:?}",
            self.job_id,
            self.extracted_count,
            self.analyzed_count,
            self.missing_analysis,
            self.orphan_analysis
        )
    }
}

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 读取文档失败
    #[error("读取文档失败 ({key}): {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文档失败
    #[error("写入文档失败 ({key}): {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除文档失败
    #[error("删除文档失败 ({key}): {source}")]
    DeleteFailed {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 键不能映射为文档（例如空键）
    #[error("无效的文档键: {key:?}")]
    InvalidKey { key: String },
    /// 文档内容无法解析
    #[error("文档内容损坏 ({key}): {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("无法读取配置文件 {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl GradeError {
    /// 根据协作方返回的错误文本分类：配额/限流信号归为 QuotaExceeded，其余为 TransientIo
    pub fn from_collaborator_message(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        if QUOTA_PATTERN.is_match(&message) {
            GradeError::QuotaExceeded { message }
        } else {
            GradeError::TransientIo {
                endpoint: endpoint.into(),
                message,
            }
        }
    }

    /// 创建网络错误
    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        GradeError::TransientIo {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// 创建抽取错误
    pub fn extraction(file_ref: impl Into<String>, message: impl Into<String>) -> Self {
        GradeError::Extraction {
            file_ref: file_ref.into(),
            message: message.into(),
        }
    }

    /// 是否为配额错误
    pub fn is_quota(&self) -> bool {
        matches!(self, GradeError::QuotaExceeded { .. })
    }

    /// 是否为网络错误
    pub fn is_transient(&self) -> bool {
        matches!(self, GradeError::TransientIo { .. })
    }
}

// ========== Result 类型别名 ==========

/// 评分引擎结果类型
pub type GradeResult<T> = Result<T, GradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_messages_are_classified() {
        for msg in [
            "429 Resource has been exhausted (e.g. check quota).",
            "Rate limit reached for requests",
            "RESOURCE_EXHAUSTED",
            "billing account disabled",
            "Too Many Requests",
        ] {
            assert!(
                GradeError::from_collaborator_message("analyze", msg).is_quota(),
                "应判定为配额错误: {}",
                msg
            );
        }
    }

    #[test]
    fn test_other_messages_are_transient() {
        let err = GradeError::from_collaborator_message("analyze", "connection reset by peer");
        assert!(err.is_transient());
        // 页码里的 4290 不应误判
        let err = GradeError::from_collaborator_message("analyze", "failed on page 4290");
        assert!(err.is_transient());
    }

    #[test]
    fn test_gap_display_lists_pages() {
        let gap = PageGap {
            job_id: "job-1".to_string(),
            extracted_count: 4,
            analyzed_count: 2,
            missing_analysis: vec![3, 4],
            orphan_analysis: vec![],
        };
        let text = gap.to_string();
        assert!(text.contains("抽取 4 页"));
        assert!(text.contains("[3, 4]"));
    }
}

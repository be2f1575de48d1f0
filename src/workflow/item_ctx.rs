//! 条目处理上下文
//!
//! 封装"我正在处理哪个条目、哪个作业"这一信息

use std::fmt::Display;

/// 条目处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 批处理条目ID（仅用于日志显示）
    pub item_id: u64,

    /// 文档引用（文件路径）
    pub file_ref: String,

    /// 抽取完成后分配的作业ID
    pub job_id: Option<String>,
}

impl ItemCtx {
    pub fn new(item_id: u64, file_ref: impl Into<String>) -> Self {
        Self {
            item_id,
            file_ref: file_ref.into(),
            job_id: None,
        }
    }

    /// 针对已有作业的上下文（重跑缺失页时使用）
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            item_id: 0,
            file_ref: String::new(),
            job_id: Some(job_id.into()),
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.job_id {
            Some(job_id) if self.item_id == 0 => write!(f, "[作业 {}]", job_id),
            Some(job_id) => write!(f, "[条目 {} 作业 {}]", self.item_id, job_id),
            None => write!(f, "[条目 {}]", self.item_id),
        }
    }
}

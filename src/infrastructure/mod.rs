//! 基础设施层（Infrastructure Layer）
//!
//! 持有唯一的稀缺资源：作业文档存储。只暴露读写能力，不处理评分逻辑。

pub mod document_store;
pub mod job_repository;

pub use document_store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use job_repository::JobRepository;

//! 最近作业列表
//!
//! 由调用方持有的有界列表：最近访问的排在最前，超出容量时丢弃最旧的

use std::collections::VecDeque;

use crate::models::JobInfo;

#[derive(Debug, Clone)]
pub struct RecentJobs {
    capacity: usize,
    jobs: VecDeque<JobInfo>,
}

impl RecentJobs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            jobs: VecDeque::new(),
        }
    }

    /// 记录一次访问，已存在则移到最前
    pub fn touch(&mut self, job: JobInfo) {
        self.jobs.retain(|existing| existing.job_id != job.job_id);
        self.jobs.push_front(job);
        self.jobs.truncate(self.capacity);
    }

    pub fn remove(&mut self, job_id: &str) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|existing| existing.job_id != job_id);
        before != self.jobs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobInfo> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobInfo {
        JobInfo {
            job_id: id.to_string(),
            file_name: None,
            created_at: None,
        }
    }

    #[test]
    fn test_most_recent_first_and_bounded() {
        let mut recent = RecentJobs::new(2);
        recent.touch(job("a"));
        recent.touch(job("b"));
        recent.touch(job("a"));
        recent.touch(job("c"));
        let ids: Vec<&str> = recent.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(recent.remove("a"));
        assert!(!recent.remove("b"));
        assert_eq!(recent.len(), 1);
    }
}

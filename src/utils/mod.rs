pub mod logging;
pub mod recent_jobs;

pub use recent_jobs::RecentJobs;

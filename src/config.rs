use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的文档数量
    pub batch_size: usize,
    /// 单个文档内同时在途的页面分析请求数
    pub page_window: usize,
    /// 条目状态事件的广播缓冲区大小
    pub event_capacity: usize,
    /// 评分后端地址
    pub backend_base_url: String,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 作业文档存放目录
    pub data_dir: String,
    /// 待评分 PDF 所在目录
    pub input_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 最近作业列表容量
    pub recent_jobs_capacity: usize,
    /// 启动时是否从后端同步已有作业
    pub sync_remote_jobs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 1,
            page_window: 2,
            event_capacity: 1024,
            backend_base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 300,
            data_dir: "output_static/jobs".to_string(),
            input_folder: "submissions".to_string(),
            verbose_logging: false,
            output_log_file: "grading_log.txt".to_string(),
            recent_jobs_capacity: 10,
            sync_remote_jobs: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载配置，环境变量仍然优先
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_string(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.to_string(),
                source,
            })?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        let config = Self {
            batch_size: std::env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(self.batch_size),
            page_window: std::env::var("PAGE_WINDOW").ok().and_then(|v| v.parse().ok()).unwrap_or(self.page_window),
            event_capacity: std::env::var("EVENT_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(self.event_capacity),
            backend_base_url: std::env::var("BACKEND_BASE_URL").unwrap_or(self.backend_base_url),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.request_timeout_secs),
            data_dir: std::env::var("DATA_DIR").unwrap_or(self.data_dir),
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(self.input_folder),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(self.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            recent_jobs_capacity: std::env::var("RECENT_JOBS_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(self.recent_jobs_capacity),
            sync_remote_jobs: std::env::var("SYNC_REMOTE_JOBS").ok().and_then(|v| v.parse().ok()).unwrap_or(self.sync_remote_jobs),
        };
        config.normalized()
    }

    /// 并发参数至少为 1
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.page_window = self.page_window.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let config = Config::default();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.page_window, 2);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_window = 0\ninput_folder = \"pdfs\"").unwrap();

        let config = Config::from_toml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.input_folder, "pdfs");
        assert_eq!(config.page_window, 1);
        assert_eq!(config.request_timeout_secs, 300);
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = \"many\"").unwrap();

        let err = Config::from_toml_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }
}

/// 评分后端 HTTP 客户端
///
/// 封装与评分后端（抽取 / 单页分析 / 作业查询）相关的调用逻辑，
/// 并在这一层把失败分为配额错误与网络错误
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::clients::collaborators::{PageAnalyzer, PageExtractor};
use crate::config::Config;
use crate::error::{GradeError, GradeResult};
use crate::models::{ExtractedPage, ExtractionResult, JobInfo, OverrideRecord, PageAnalysisResult};

const EXTRACT_ENDPOINT: &str = "/api/extract-heuristic-pages";
const ANALYZE_ENDPOINT: &str = "/api/analyze-single-page";
const LIST_JOBS_ENDPOINT: &str = "/api/list-jobs";
const ANALYSIS_RESULTS_ENDPOINT: &str = "/api/get-analysis-results";
const OVERRIDES_ENDPOINT: &str = "/api/get-overrides";
const EXTRACTION_RESULT_ENDPOINT: &str = "/api/get-extraction-result";

/// 评分后端客户端
pub struct BackendClient {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<JobInfo>,
}

#[derive(Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<PageAnalysisResult>,
}

#[derive(Deserialize)]
struct OverridesResponse {
    #[serde(default)]
    overrides: Vec<OverrideRecord>,
}

impl BackendClient {
    /// 创建新的后端客户端
    pub fn new(config: &Config) -> GradeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GradeError::transient(&config.backend_base_url, e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.backend_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// 发送请求并解析 JSON 响应
    ///
    /// HTTP 429 一律视为配额错误；其他非 2xx 响应按响应文本分类
    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> GradeResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| GradeError::transient(endpoint, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(GradeError::QuotaExceeded {
                message: format!("HTTP 429: {}", body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradeError::from_collaborator_message(
                endpoint,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GradeError::transient(endpoint, format!("响应解析失败: {}", e)))
    }

    /// 后端已有的作业
    pub async fn list_jobs(&self) -> GradeResult<Vec<JobInfo>> {
        let request = self.http.get(self.url(LIST_JOBS_ENDPOINT));
        let response: JobsResponse = self.send_json(LIST_JOBS_ENDPOINT, request).await?;
        Ok(response.jobs)
    }

    /// 后端保存的某作业的全部分析结果
    pub async fn fetch_analysis_results(&self, job_id: &str) -> GradeResult<Vec<PageAnalysisResult>> {
        let request = self
            .http
            .get(self.url(ANALYSIS_RESULTS_ENDPOINT))
            .query(&[("jobId", job_id)]);
        let response: ResultsResponse = self.send_json(ANALYSIS_RESULTS_ENDPOINT, request).await?;
        Ok(response.results)
    }

    /// 后端保存的某作业的覆盖记录
    pub async fn fetch_overrides(&self, job_id: &str) -> GradeResult<Vec<OverrideRecord>> {
        let request = self
            .http
            .get(self.url(OVERRIDES_ENDPOINT))
            .query(&[("jobId", job_id)]);
        let response: OverridesResponse = self.send_json(OVERRIDES_ENDPOINT, request).await?;
        Ok(response.overrides)
    }

    /// 后端保存的抽取结果（页为空表示后端没有该作业）
    pub async fn fetch_extraction(&self, job_id: &str) -> GradeResult<ExtractionResult> {
        let request = self
            .http
            .get(self.url(EXTRACTION_RESULT_ENDPOINT))
            .query(&[("jobId", job_id)]);
        self.send_json(EXTRACTION_RESULT_ENDPOINT, request).await
    }
}

#[async_trait]
impl PageExtractor for BackendClient {
    async fn extract_pages(&self, file_ref: &str) -> GradeResult<ExtractionResult> {
        let bytes = tokio::fs::read(file_ref)
            .await
            .map_err(|e| GradeError::extraction(file_ref, e.to_string()))?;
        let file_name = Path::new(file_ref)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(file_ref)
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("application/pdf")
            .map_err(|e| GradeError::extraction(file_ref, e.to_string()))?;
        let form = Form::new().part("file", part);

        debug!("正在上传文档: {}", file_name);
        let request = self.http.post(self.url(EXTRACT_ENDPOINT)).multipart(form);
        let mut extraction: ExtractionResult =
            match self.send_json(EXTRACT_ENDPOINT, request).await {
                Ok(extraction) => extraction,
                Err(e) if e.is_quota() => return Err(e),
                Err(e) => return Err(GradeError::extraction(file_ref, e.to_string())),
            };

        if extraction.file_name.is_none() {
            extraction.file_name = Some(file_name);
        }
        if extraction.created_at.is_none() {
            extraction.created_at = Some(chrono::Utc::now().to_rfc3339());
        }
        Ok(extraction)
    }
}

#[async_trait]
impl PageAnalyzer for BackendClient {
    async fn analyze_page(&self, job_id: &str, page: &ExtractedPage) -> GradeResult<PageAnalysisResult> {
        let body = json!({
            "jobId": job_id,
            "page": {
                "pageNumber": page.page_number,
                "snippet": page.snippet,
                "imageBase64": page.image,
            }
        });
        let request = self.http.post(self.url(ANALYZE_ENDPOINT)).json(&body);
        let response: AnalyzeResponse = self.send_json(ANALYZE_ENDPOINT, request).await?;

        if response.status == "error" {
            let message = response
                .error
                .unwrap_or_else(|| "analysis failed".to_string());
            let err = GradeError::from_collaborator_message(ANALYZE_ENDPOINT, message.clone());
            if err.is_quota() {
                return Err(err);
            }
            warn!("第 {} 页分析失败: {}", page.page_number, message);
            return Ok(PageAnalysisResult::failed(page.page_number, message));
        }

        let result = response
            .result
            .ok_or_else(|| GradeError::transient(ANALYZE_ENDPOINT, "响应缺少 result 字段"))?;
        serde_json::from_value(result)
            .map_err(|e| GradeError::transient(ANALYZE_ENDPOINT, format!("分析结果解析失败: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let config = Config {
            backend_base_url: "http://localhost:8000/".to_string(),
            ..Config::default()
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(
            client.url(LIST_JOBS_ENDPOINT),
            "http://localhost:8000/api/list-jobs"
        );
    }

    #[test]
    fn test_error_envelope_parses() {
        let response: AnalyzeResponse = serde_json::from_str(
            r#"{"status": "error", "page_number": 3, "error": "429 quota exceeded"}"#,
        )
        .unwrap();
        assert_eq!(response.status, "error");
        assert!(response.result.is_none());
        assert!(GradeError::from_collaborator_message(
            ANALYZE_ENDPOINT,
            response.error.unwrap()
        )
        .is_quota());
    }

    #[tokio::test]
    #[ignore] // 需要本地运行评分后端
    async fn test_list_jobs_live() {
        let client = BackendClient::new(&Config::from_env()).unwrap();
        let jobs = client.list_jobs().await.unwrap();
        println!("后端作业数: {}", jobs.len());
    }
}

//! Segmentation service HTTP client.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Client, Method};
use tracing::{debug, error, info, warn};
use vseg_models::SegmentationMode;
use vseg_storage::{canonical_uri, retry_async, Credential, RequestSigner, RetryPolicy};

use crate::error::{CiError, CiResult, CAPABILITY_GUIDANCE, CODE_CAPABILITY_NOT_BOUND};
use crate::metrics::record_request;
use crate::poll::SegmentationJob;
use crate::queue::{choose_queue, QueueCache, QueuePick};
use crate::types::{
    decode, encode_request, ErrorDocument, JobInput, JobOperation, JobOutput, JobResponse, QueueInfo,
    QueueListResponse, QueueUpdateRequest, SegmentVideoBody, SubmitJobRequest, SEGMENT_TAG,
};

/// Configuration for the segmentation client.
#[derive(Debug, Clone)]
pub struct CiConfig {
    pub credential: Credential,
    pub bucket: String,
    pub region: String,
    pub scheme: String,
    /// Host override; defaults to `{bucket}.ci.{region}.myqcloud.com`
    pub host: Option<String>,
    /// Interval between status queries
    pub poll_interval: Duration,
    /// Interval after an unknown state or a failed query
    pub poll_retry_interval: Duration,
    /// Default polling budget
    pub poll_timeout: Duration,
    pub segment_type: String,
    pub binary_threshold: f32,
    pub queue_category: String,
    /// Name set when activating a paused queue
    pub queue_name: String,
    /// Wait after provisioning before listing queues again
    pub provision_settle: Duration,
    pub output_format: String,
    /// Retry policy for single calls (not for polling)
    pub retry: RetryPolicy,
}

impl CiConfig {
    pub fn new(credential: Credential, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            credential,
            bucket: bucket.into(),
            region: region.into(),
            scheme: "https".to_string(),
            host: None,
            poll_interval: Duration::from_secs(10),
            poll_retry_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(300),
            segment_type: "HumanSeg".to_string(),
            binary_threshold: 0.1,
            queue_category: "AIProcess".to_string(),
            queue_name: "AI-Queue".to_string(),
            provision_settle: Duration::from_secs(3),
            output_format: "mp4".to_string(),
            retry: RetryPolicy::new("ci_request")
                .with_max_attempts(3)
                .with_backoff(vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)])
                .with_timeouts(vec![Duration::from_secs(30)]),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> CiResult<Self> {
        let secret_id =
            std::env::var("TENCENT_SECRET_ID").map_err(|_| CiError::config("TENCENT_SECRET_ID not set"))?;
        let secret_key =
            std::env::var("TENCENT_SECRET_KEY").map_err(|_| CiError::config("TENCENT_SECRET_KEY not set"))?;
        let bucket =
            std::env::var("TENCENT_COS_BUCKET").map_err(|_| CiError::config("TENCENT_COS_BUCKET not set"))?;
        let region = std::env::var("TENCENT_REGION").unwrap_or_else(|_| "ap-beijing".to_string());

        let credential = Credential::new(secret_id, secret_key).map_err(|e| CiError::config(e.to_string()))?;
        let mut config = Self::new(credential, bucket, region);
        if let Ok(scheme) = std::env::var("CI_SCHEME") {
            config.scheme = scheme;
        }
        config.host = std::env::var("CI_HOST").ok().filter(|h| !h.trim().is_empty());
        config.poll_interval = Duration::from_secs(env_parse("CI_POLL_INTERVAL_SECS").unwrap_or(10));
        config.poll_timeout = Duration::from_secs(env_parse("CI_POLL_TIMEOUT_SECS").unwrap_or(300));
        config.binary_threshold = env_parse("CI_BINARY_THRESHOLD").unwrap_or(0.1);
        if let Ok(segment_type) = std::env::var("CI_SEGMENT_TYPE") {
            config.segment_type = segment_type;
        }
        if let Ok(category) = std::env::var("CI_QUEUE_CATEGORY") {
            config.queue_category = category;
        }
        config.provision_settle = Duration::from_secs(env_parse("CI_PROVISION_SETTLE_SECS").unwrap_or(3));
        Ok(config)
    }

    /// Host of the processing API.
    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("{}.ci.{}.myqcloud.com", self.bucket, self.region))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Client for the remote segmentation job service.
#[derive(Debug)]
pub struct SegmentationJobClient {
    pub(crate) http: Client,
    pub(crate) config: CiConfig,
    signer: RequestSigner,
    queues: QueueCache,
}

impl SegmentationJobClient {
    /// Create a new client.
    pub fn new(config: CiConfig) -> CiResult<Self> {
        let signer = RequestSigner::new(config.credential.clone());
        Self::with_signer(config, signer)
    }

    /// Create with a custom signer (clock injection in tests).
    pub fn with_signer(config: CiConfig, signer: RequestSigner) -> CiResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("vseg-ci/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CiError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            signer,
            queues: QueueCache::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> CiResult<Self> {
        Self::new(CiConfig::from_env()?)
    }

    pub fn config(&self) -> &CiConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// One signed call with retries on transient failures.
    pub(crate) async fn call(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> CiResult<String> {
        retry_async(&self.config.retry, |attempt| {
            let method = method.clone();
            let body = body.clone();
            async move { self.call_once(operation, method, path, body, attempt).await }
        })
        .await
        .into_result()
    }

    /// One signed call, no retries.
    pub(crate) async fn call_once(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<String>,
        attempt: u32,
    ) -> CiResult<String> {
        let host = self.config.host();
        let uri = canonical_uri(path);
        let url = format!("{}://{}{}", self.config.scheme, host, uri);
        // Fresh key window per attempt.
        let authorization = self.signer.authorization(method.as_str(), &uri, &host)?;

        debug!(operation, %method, %url, attempt = attempt + 1, "Calling segmentation service");

        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.config.retry.timeout_for(attempt))
            .header(HOST, host.as_str())
            .header(AUTHORIZATION, authorization);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/xml").body(body);
        }

        let response = request.send().await.map_err(CiError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(CiError::from_reqwest)?;
        record_request(operation, status.as_u16());

        if status.is_success() {
            return Ok(text);
        }
        Err(api_error(status.as_u16(), &text))
    }

    // ------------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------------

    /// List processing queues.
    pub async fn list_queues(&self) -> CiResult<Vec<QueueInfo>> {
        let body = self.call("list_queues", Method::GET, "/ai_queue", None).await?;
        Ok(decode::<QueueListResponse>(&body)?.queues())
    }

    /// Switch a paused queue to Active.
    pub async fn activate_queue(&self, queue: &QueueInfo) -> CiResult<()> {
        let name = if queue.name.is_empty() {
            self.config.queue_name.clone()
        } else {
            queue.name.clone()
        };
        let body = encode_request(&QueueUpdateRequest::activate(name))?;
        let path = format!("/ai_queue/{}", queue.queue_id);
        self.call("activate_queue", Method::PUT, &path, Some(body)).await?;
        info!(queue_id = %queue.queue_id, "Activated paused processing queue");
        Ok(())
    }

    /// Bind the media AI capability to the bucket, creating its default queue.
    pub async fn provision(&self) -> CiResult<()> {
        self.call("provision", Method::POST, "/ai_bucket", Some(String::new())).await?;
        info!(bucket = %self.config.bucket, "Provisioned media AI capability");
        Ok(())
    }

    /// Resolve the queue to submit into; `None` means let the service pick.
    ///
    /// Cached after the first resolution; submission errors clear the cache.
    pub async fn resolve_queue(&self) -> CiResult<Option<String>> {
        if let Some(cached) = self.queues.get().await {
            return Ok(cached);
        }

        let resolved = self.discover_queue().await?;
        self.queues.set(resolved.clone()).await;
        Ok(resolved)
    }

    async fn discover_queue(&self) -> CiResult<Option<String>> {
        let queues = self.list_queues().await?;
        match self.apply_pick(choose_queue(&queues, &self.config.queue_category)).await? {
            Some(picked) => Ok(picked),
            None => {
                info!("No processing queues found, provisioning capability");
                if let Err(e) = self.provision().await {
                    warn!("Provisioning failed, submitting without a queue id: {}", e);
                    return Ok(None);
                }
                tokio::time::sleep(self.config.provision_settle).await;

                let queues = self.list_queues().await?;
                Ok(self
                    .apply_pick(choose_queue(&queues, &self.config.queue_category))
                    .await?
                    .flatten())
            }
        }
    }

    /// `Ok(None)` means the listing was empty.
    async fn apply_pick(&self, pick: QueuePick) -> CiResult<Option<Option<String>>> {
        match pick {
            QueuePick::Active(id) => {
                debug!(queue_id = %id, "Using active processing queue");
                Ok(Some(Some(id)))
            }
            QueuePick::Paused(queue) => {
                self.activate_queue(&queue).await?;
                Ok(Some(Some(queue.queue_id)))
            }
            QueuePick::ServiceDefault => {
                debug!("No matching queue, using the service default");
                Ok(Some(None))
            }
            QueuePick::NoQueues => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    fn submit_body(
        &self,
        input_key: &str,
        output_key: &str,
        mode: &SegmentationMode,
        queue_id: Option<String>,
    ) -> CiResult<String> {
        encode_request(&SubmitJobRequest {
            tag: SEGMENT_TAG,
            input: JobInput {
                object: input_key.to_string(),
            },
            operation: JobOperation {
                segment_video_body: SegmentVideoBody::new(
                    self.config.segment_type.clone(),
                    mode,
                    self.config.binary_threshold,
                ),
                output: JobOutput {
                    region: self.config.region.clone(),
                    bucket: self.config.bucket.clone(),
                    object: output_key.to_string(),
                    format: self.config.output_format.clone(),
                },
            },
            queue_id,
        })
    }

    async fn submit_once(
        &self,
        input_key: &str,
        output_key: &str,
        mode: &SegmentationMode,
        queue_id: Option<String>,
    ) -> CiResult<String> {
        let body = self.submit_body(input_key, output_key, mode, queue_id)?;
        let response = self.call("submit", Method::POST, "/jobs", Some(body)).await?;
        let parsed: JobResponse = decode(&response)?;
        let detail = parsed
            .detail()
            .ok_or_else(|| CiError::invalid_response("submission response has no JobsDetail"))?;

        if let Some(job_id) = detail.job_id() {
            return Ok(job_id);
        }
        let code = detail.code.clone().unwrap_or_default();
        if code == CODE_CAPABILITY_NOT_BOUND {
            return Err(CiError::CapabilityNotEnabled(detail.message().unwrap_or_default()));
        }
        Err(CiError::Api {
            status: 200,
            code,
            message: detail.message().unwrap_or_else(|| "no job id returned".to_string()),
        })
    }

    /// Submit a segmentation job for an uploaded input object.
    ///
    /// A missing capability binding is provisioned automatically and the
    /// submission retried once; a second failure is reported with operator
    /// guidance.
    pub async fn submit(
        &self,
        input_key: &str,
        output_key: &str,
        mode: &SegmentationMode,
    ) -> CiResult<SegmentationJob> {
        let queue_id = self.resolve_queue().await?;

        let job_id = match self.submit_once(input_key, output_key, mode, queue_id.clone()).await {
            Ok(job_id) => job_id,
            Err(CiError::CapabilityNotEnabled(detail)) => {
                warn!(detail = %detail, "Segmentation capability not bound, provisioning and retrying once");
                self.queues.invalidate().await;
                if let Err(e) = self.provision().await {
                    error!("Automatic provisioning failed: {}", e);
                    return Err(CiError::CapabilityNotEnabled(format!("{} ({})", CAPABILITY_GUIDANCE, e)));
                }
                tokio::time::sleep(self.config.provision_settle).await;

                let queue_id = self.resolve_queue().await?;
                return match self.submit_once(input_key, output_key, mode, queue_id.clone()).await {
                    Ok(job_id) => Ok(self.submitted(job_id, input_key, output_key, mode, queue_id)),
                    Err(CiError::CapabilityNotEnabled(_)) => {
                        self.queues.invalidate().await;
                        Err(CiError::CapabilityNotEnabled(CAPABILITY_GUIDANCE.to_string()))
                    }
                    Err(e) => {
                        self.queues.invalidate().await;
                        Err(e)
                    }
                };
            }
            Err(e) => {
                self.queues.invalidate().await;
                return Err(e);
            }
        };

        Ok(self.submitted(job_id, input_key, output_key, mode, queue_id))
    }

    fn submitted(
        &self,
        job_id: String,
        input_key: &str,
        output_key: &str,
        mode: &SegmentationMode,
        queue_id: Option<String>,
    ) -> SegmentationJob {
        info!(
            ci_job_id = %job_id,
            input_key,
            output_key,
            mode = mode.wire_name(),
            queue_id = queue_id.as_deref().unwrap_or("-"),
            "Segmentation job submitted"
        );
        SegmentationJob::submitted(job_id, input_key, output_key, mode.clone(), queue_id)
    }
}

fn api_error(status: u16, body: &str) -> CiError {
    let doc: ErrorDocument = decode(body).unwrap_or_default();
    let code = doc.code();
    if code == CODE_CAPABILITY_NOT_BOUND {
        return CiError::CapabilityNotEnabled(doc.message());
    }
    let message = match doc.message() {
        m if m.is_empty() => body.chars().take(256).collect(),
        m => m,
    };
    CiError::Api { status, code, message }
}

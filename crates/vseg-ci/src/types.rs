//! Wire format of the segmentation service.
//!
//! Requests are typed structures serialized through [`encode_request`];
//! responses are decoded leniently since the service omits empty elements.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use vseg_models::{QueueState, SegmentationMode};

use crate::error::{CiError, CiResult};

/// Job tag for video segmentation.
pub const SEGMENT_TAG: &str = "SegmentVideoBody";

/// Serialize a request body under a `<Request>` root.
pub fn encode_request<T: Serialize>(value: &T) -> CiResult<String> {
    quick_xml::se::to_string_with_root("Request", value).map_err(|e| CiError::Xml(e.to_string()))
}

/// Decode a response document; the root element name is not checked.
pub fn decode<T: DeserializeOwned>(xml: &str) -> CiResult<T> {
    quick_xml::de::from_str(xml).map_err(|e| CiError::Xml(e.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubmitJobRequest {
    pub tag: &'static str,
    pub input: JobInput,
    pub operation: JobOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobInput {
    pub object: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobOperation {
    pub segment_video_body: SegmentVideoBody,
    pub output: JobOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SegmentVideoBody {
    pub segment_type: String,
    pub mode: &'static str,
    pub binary_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_logo_url: Option<String>,
}

impl SegmentVideoBody {
    pub fn new(segment_type: impl Into<String>, mode: &SegmentationMode, binary_threshold: f32) -> Self {
        Self {
            segment_type: segment_type.into(),
            mode: mode.wire_name(),
            binary_threshold,
            background_logo_url: mode.background_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobOutput {
    pub region: String,
    pub bucket: String,
    pub object: String,
    pub format: String,
}

/// Body for switching a queue to Active.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueUpdateRequest {
    pub name: String,
    pub state: &'static str,
    pub notify_config: NotifyConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotifyConfig {
    pub state: &'static str,
}

impl QueueUpdateRequest {
    pub fn activate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: "Active",
            notify_config: NotifyConfig { state: "Off" },
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response of job submission and job queries.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobResponse {
    #[serde(default)]
    pub jobs_detail: Vec<JobsDetail>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobsDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub job_id: Option<String>,
    pub state: Option<String>,
}

impl JobResponse {
    pub fn detail(&self) -> Option<&JobsDetail> {
        self.jobs_detail.first()
    }
}

impl JobsDetail {
    pub fn job_id(&self) -> Option<String> {
        non_empty(self.job_id.clone())
    }

    pub fn state(&self) -> Option<String> {
        non_empty(self.state.clone())
    }

    pub fn message(&self) -> Option<String> {
        non_empty(self.message.clone())
    }
}

/// Error document returned with non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorDocument {
    pub code: Option<String>,
    pub message: Option<String>,
    pub request_id: Option<String>,
}

impl ErrorDocument {
    pub fn code(&self) -> String {
        non_empty(self.code.clone()).unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn message(&self) -> String {
        non_empty(self.message.clone()).unwrap_or_default()
    }
}

/// Queue listing. Entries come either as flat `QueueList` elements or as
/// `Queue` children of a single `QueueList`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueListResponse {
    #[serde(default)]
    pub queue_list: Vec<QueueListNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueListNode {
    pub queue_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub queue_type: Option<String>,
    #[serde(default)]
    pub queue: Vec<QueueNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueueNode {
    pub queue_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub queue_type: Option<String>,
}

/// A processing queue as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub queue_id: String,
    pub name: String,
    pub state: QueueState,
    pub category: String,
}

impl QueueInfo {
    fn from_parts(
        queue_id: Option<String>,
        name: Option<String>,
        state: Option<String>,
        category: Option<String>,
        queue_type: Option<String>,
    ) -> Option<Self> {
        let queue_id = non_empty(queue_id)?;
        Some(Self {
            name: non_empty(name).unwrap_or_else(|| queue_id.clone()),
            queue_id,
            state: QueueState::from_wire(&non_empty(state).unwrap_or_default()),
            category: non_empty(category).or(non_empty(queue_type)).unwrap_or_default(),
        })
    }
}

impl QueueListResponse {
    /// Flatten both listing shapes into queue entries.
    pub fn queues(self) -> Vec<QueueInfo> {
        let mut out = Vec::new();
        for node in self.queue_list {
            if let Some(info) =
                QueueInfo::from_parts(node.queue_id, node.name, node.state, node.category, node.queue_type)
            {
                out.push(info);
            }
            for q in node.queue {
                if let Some(info) = QueueInfo::from_parts(q.queue_id, q.name, q.state, q.category, q.queue_type) {
                    out.push(info);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_combination() {
        let mode = SegmentationMode::Combination {
            background_url: "https://b.cos.ap-beijing.myqcloud.com/backgrounds/bg.png".into(),
        };
        let request = SubmitJobRequest {
            tag: SEGMENT_TAG,
            input: JobInput {
                object: "input/video.mp4".into(),
            },
            operation: JobOperation {
                segment_video_body: SegmentVideoBody::new("HumanSeg", &mode, 0.1),
                output: JobOutput {
                    region: "ap-beijing".into(),
                    bucket: "b".into(),
                    object: "output/processed.mp4".into(),
                    format: "mp4".into(),
                },
            },
            queue_id: Some("p123".into()),
        };

        let xml = encode_request(&request).unwrap();
        assert!(xml.starts_with("<Request><Tag>SegmentVideoBody</Tag>"));
        assert!(xml.contains("<Input><Object>input/video.mp4</Object></Input>"));
        assert!(xml.contains("<SegmentType>HumanSeg</SegmentType>"));
        assert!(xml.contains("<Mode>Combination</Mode>"));
        assert!(xml.contains("<BinaryThreshold>0.1</BinaryThreshold>"));
        assert!(xml.contains("<BackgroundLogoUrl>https://b.cos.ap-beijing.myqcloud.com/backgrounds/bg.png</BackgroundLogoUrl>"));
        assert!(xml.contains("<Output><Region>ap-beijing</Region><Bucket>b</Bucket><Object>output/processed.mp4</Object><Format>mp4</Format></Output>"));
        assert!(xml.ends_with("<QueueId>p123</QueueId></Request>"));
    }

    #[test]
    fn test_foreground_omits_background_and_queue() {
        let body = SegmentVideoBody::new("HumanSeg", &SegmentationMode::Foreground, 0.1);
        let request = SubmitJobRequest {
            tag: SEGMENT_TAG,
            input: JobInput { object: "in.mp4".into() },
            operation: JobOperation {
                segment_video_body: body,
                output: JobOutput {
                    region: "r".into(),
                    bucket: "b".into(),
                    object: "out.mp4".into(),
                    format: "mp4".into(),
                },
            },
            queue_id: None,
        };
        let xml = encode_request(&request).unwrap();
        assert!(xml.contains("<Mode>Foreground</Mode>"));
        assert!(!xml.contains("BackgroundLogoUrl"));
        assert!(!xml.contains("QueueId"));
    }

    #[test]
    fn test_queue_activation_body() {
        let xml = encode_request(&QueueUpdateRequest::activate("AI-Queue")).unwrap();
        assert_eq!(
            xml,
            "<Request><Name>AI-Queue</Name><State>Active</State><NotifyConfig><State>Off</State></NotifyConfig></Request>"
        );
    }

    #[test]
    fn test_decode_job_detail() {
        let xml = r#"<Response><JobsDetail><Code>Success</Code><Message></Message>
            <JobId>j8d121820f5e411ec926ef19d53ba9c6f</JobId><State>Submitted</State>
            <Tag>SegmentVideoBody</Tag></JobsDetail></Response>"#;
        let response: JobResponse = decode(xml).unwrap();
        let detail = response.detail().unwrap();
        assert_eq!(detail.job_id().as_deref(), Some("j8d121820f5e411ec926ef19d53ba9c6f"));
        assert_eq!(detail.state().as_deref(), Some("Submitted"));
        assert_eq!(detail.message(), None);
    }

    #[test]
    fn test_decode_error_document() {
        let xml = "<Error><Code>AIBucketUnBinded</Code><Message>bucket not bound</Message><RequestId>abc</RequestId></Error>";
        let doc: ErrorDocument = decode(xml).unwrap();
        assert_eq!(doc.code(), "AIBucketUnBinded");
        assert_eq!(doc.message(), "bucket not bound");
    }

    #[test]
    fn test_decode_flat_queue_list() {
        let xml = r#"<Response><RequestId>r</RequestId><TotalCount>2</TotalCount>
            <QueueList><QueueId>p1</QueueId><Name>q1</Name><State>Paused</State><Category>AIProcess</Category></QueueList>
            <QueueList><QueueId>p2</QueueId><Name>q2</Name><State>Active</State><Category>Transcoding</Category></QueueList>
            <NonExistPIDs/></Response>"#;
        let queues = decode::<QueueListResponse>(xml).unwrap().queues();
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].queue_id, "p1");
        assert_eq!(queues[0].state, QueueState::Paused);
        assert_eq!(queues[1].category, "Transcoding");
    }

    #[test]
    fn test_decode_nested_queue_list() {
        let xml = r#"<Response><QueueList>
            <Queue><QueueId>p9</QueueId><Name>ai</Name><State>Active</State><QueueType>AIProcess</QueueType></Queue>
            </QueueList></Response>"#;
        let queues = decode::<QueueListResponse>(xml).unwrap().queues();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].category, "AIProcess");
        assert_eq!(queues[0].state, QueueState::Active);
    }

    #[test]
    fn test_decode_empty_queue_list() {
        let xml = "<Response><RequestId>r</RequestId><TotalCount>0</TotalCount></Response>";
        assert!(decode::<QueueListResponse>(xml).unwrap().queues().is_empty());
    }
}

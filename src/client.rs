//! Analysis service client.
//!
//! Speaks the pose-analysis service's HTTP interface: one multipart POST per
//! frame to `/process_image/?pose_name=...`, JSON back. Self-contained: the
//! wire types, response parsing/merging, and the async exchange call all live
//! here; the pump only sees the [`Exchange`] trait.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

use crate::landmark::Landmark;
use crate::session::{Analysis, FeedbackItem, Keypoint};

/// Multipart field name the service expects.
pub const UPLOAD_FIELD: &str = "file";
/// Upload filename. Fixed to `frame.jpg` whatever the actual encoding; the
/// service reads only the bytes.
pub const UPLOAD_FILENAME: &str = "frame.jpg";

// ============================================================
// Snapshot
// ============================================================

/// A single still frame, already compressed for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub data: Vec<u8>,
    pub format: SnapshotFormat,
}

impl Snapshot {
    pub fn new(data: Vec<u8>, format: SnapshotFormat) -> Self {
        Self { data, format }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    WebP,
    Jpeg,
}

impl SnapshotFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Extension string for `imgcodecs::imencode`.
    pub fn encode_ext(&self) -> &'static str {
        match self {
            Self::WebP => ".webp",
            Self::Jpeg => ".jpg",
        }
    }

    /// Parse a config value ("webp" / "jpeg" / "jpg").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "webp" => Some(Self::WebP),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Guess from a file extension, for the probe binary.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        Self::from_name(ext)
    }
}

// ============================================================
// Wire types and parsing
// ============================================================

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    keypoints: Vec<RawKeypoint>,
    #[serde(default)]
    feedback: Vec<FeedbackItem>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    status: String,
}

/// Raw keypoint as sent by the service. An absent `correct` counts as
/// incorrect, so a marker is drawn rather than silently skipped.
#[derive(Debug, Deserialize)]
struct RawKeypoint {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    correct: bool,
}

/// Parse a service response body into display-ready state.
pub fn parse_analysis(body: &[u8]) -> Result<Analysis, serde_json::Error> {
    let raw: RawAnalysis = serde_json::from_slice(body)?;
    Ok(merge_analysis(raw))
}

/// Drop repeated messages, keeping the first occurrence in order.
pub fn dedup_feedback(items: Vec<FeedbackItem>) -> Vec<FeedbackItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.message.clone()))
        .collect()
}

fn merge_analysis(raw: RawAnalysis) -> Analysis {
    // Keypoint attachment scans the full feedback list; deduplication only
    // applies to the list kept for display and connector drawing.
    let keypoints = raw
        .keypoints
        .iter()
        .enumerate()
        .map(|(idx, kp)| Keypoint {
            x: kp.x,
            y: kp.y,
            part: Landmark::from_index(idx),
            correct: kp.correct,
            feedback: raw
                .feedback
                .iter()
                .find(|f| f.keypoint_index == Some(idx))
                .map(|f| f.message.clone()),
        })
        .collect();

    Analysis {
        keypoints,
        feedback: dedup_feedback(raw.feedback),
        score: raw.score,
        status: raw.status,
    }
}

// ============================================================
// Exchange
// ============================================================

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Configuration error. Raised before any network I/O happens.
    #[error("pose name is empty; frame exchange disabled")]
    MissingPoseName,
    #[error("analysis service answered {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("request to analysis service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unreadable analysis response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ExchangeError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingPoseName)
    }
}

/// The pump's view of the transport: one snapshot in, one analysis out.
pub trait Exchange: Send + Sync + 'static {
    fn exchange(
        &self,
        snapshot: Snapshot,
    ) -> impl Future<Output = Result<Analysis, ExchangeError>> + Send;
}

/// HTTP client bound to one service endpoint and one pose name.
pub struct AnalysisClient {
    http: reqwest::Client,
    endpoint: String,
    pose_name: String,
}

impl AnalysisClient {
    pub fn new(endpoint: &str, pose_name: &str, timeout: Duration) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            pose_name: pose_name.to_string(),
        })
    }

    pub fn pose_name(&self) -> &str {
        &self.pose_name
    }

    fn process_url(&self) -> String {
        format!("{}/process_image/", self.endpoint)
    }

    pub async fn exchange(&self, snapshot: Snapshot) -> Result<Analysis, ExchangeError> {
        if self.pose_name.is_empty() {
            return Err(ExchangeError::MissingPoseName);
        }

        let part = Part::bytes(snapshot.data)
            .file_name(UPLOAD_FILENAME)
            .mime_str(snapshot.format.mime())?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .http
            .post(self.process_url())
            .query(&[("pose_name", self.pose_name.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::BadStatus(status));
        }

        let body = response.bytes().await?;
        Ok(parse_analysis(&body)?)
    }
}

impl Exchange for AnalysisClient {
    fn exchange(
        &self,
        snapshot: Snapshot,
    ) -> impl Future<Output = Result<Analysis, ExchangeError>> + Send {
        AnalysisClient::exchange(self, snapshot)
    }
}

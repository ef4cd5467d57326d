use crate::error::StageError;
use crate::host_pool::{Endpoint, StageKind};
use crate::io_struct::{FilterKind, OutputFormat, WatermarkPosition, base64_bytes};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

pub const WATERMARK_FONT_SIZE: u32 = 30;
pub const WATERMARK_COLOR: &str = "#FFFFFF";
pub const WATERMARK_OPACITY: f32 = 0.8;
pub const FILTER_INTENSITY: f32 = 1.0;

/// Parameters for one worker call. One variant per stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageParams {
    Resize {
        target_width: u32,
        target_height: u32,
        maintain_aspect_ratio: bool,
    },
    Filter {
        filter_type: FilterKind,
        intensity: f32,
    },
    Watermark {
        text: String,
        position: WatermarkPosition,
        font_size: u32,
        color: String,
        opacity: f32,
    },
    Format {
        format: OutputFormat,
        quality: i64,
    },
}

impl StageParams {
    pub fn kind(&self) -> StageKind {
        match self {
            StageParams::Resize { .. } => StageKind::Resize,
            StageParams::Filter { .. } => StageKind::Filter,
            StageParams::Watermark { .. } => StageKind::Watermark,
            StageParams::Format { .. } => StageKind::Format,
        }
    }

    pub fn api_path(&self) -> &'static str {
        match self {
            StageParams::Resize { .. } => "/resize",
            StageParams::Filter { .. } => "/apply_filter",
            StageParams::Watermark { .. } => "/add_text_watermark",
            StageParams::Format { .. } => "/convert_format",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSuccess {
    pub payload: Bytes,
    pub processing_time_ms: u64,
    pub message: String,
    /// Only reported by Resize workers.
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Success(StageSuccess),
    Failure { message: String },
}

/// Sends one unit of work to one worker.
///
/// Implementations never fail: every error becomes `StageOutcome::Failure`.
#[async_trait]
pub trait StageInvoker: Send + Sync + Debug {
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        process_id: &str,
        payload: Bytes,
        params: &StageParams,
    ) -> StageOutcome;
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    image_id: &'a str,
    #[serde(with = "base64_bytes")]
    image_data: Bytes,
    #[serde(flatten)]
    params: &'a StageParams,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(
        with = "base64_bytes",
        default,
        alias = "resized_image",
        alias = "filtered_image",
        alias = "watermarked_image",
        alias = "formatted_image"
    )]
    image_data: Bytes,
    #[serde(default)]
    processing_time_ms: u64,
    new_width: Option<u32>,
    new_height: Option<u32>,
}

/// HTTP/JSON stage client sharing one connection-pooling `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpStageClient {
    client: reqwest::Client,
}

impl HttpStageClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        process_id: &str,
        payload: Bytes,
        params: &StageParams,
    ) -> Result<StageSuccess, StageError> {
        let url = endpoint.api_path(params.api_path());
        let body = WorkerRequest {
            image_id: process_id,
            image_data: payload,
            params,
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| StageError::request(&url, source))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StageError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| StageError::body(&url, source))?;
        let parsed: WorkerResponse =
            serde_json::from_slice(&bytes).map_err(|e| StageError::Decode {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !parsed.success {
            return Err(StageError::Rejected(parsed.message));
        }
        if parsed.image_data.is_empty() {
            return Err(StageError::Decode {
                url,
                reason: "empty image payload".to_string(),
            });
        }
        Ok(StageSuccess {
            payload: parsed.image_data,
            processing_time_ms: parsed.processing_time_ms,
            message: parsed.message,
            dimensions: parsed.new_width.zip(parsed.new_height),
        })
    }
}

#[async_trait]
impl StageInvoker for HttpStageClient {
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        process_id: &str,
        payload: Bytes,
        params: &StageParams,
    ) -> StageOutcome {
        let _lease = endpoint.acquire().await;
        match self.send(endpoint, process_id, payload, params).await {
            Ok(success) => StageOutcome::Success(success),
            Err(e) => {
                log::warn!("{} call to {} failed: {}", params.kind(), endpoint, e);
                StageOutcome::Failure {
                    message: e.to_string(),
                }
            }
        }
    }
}

use crate::host_pool::{PoolSnapshot, SelectionPolicy, StageKind, StagePools};
use crate::io_struct::{ProcessRequest, ProcessResponse, ProcessingOptions, ProcessingStats, StatusInfo};
use crate::stage_client::{
    FILTER_INTENSITY, HttpStageClient, StageInvoker, StageOutcome, StageParams, WATERMARK_COLOR,
    WATERMARK_FONT_SIZE, WATERMARK_OPACITY,
};
use crate::stats::StatsRecorder;
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub host: String,
    pub port: u16,
    pub policy: String,
    pub resize_hosts: Vec<String>,
    pub filter_hosts: Vec<String>,
    pub watermark_hosts: Vec<String>,
    pub format_hosts: Vec<String>,
    pub log_interval: u64,
    pub timeout: u64,
    pub max_inflight_per_endpoint: usize,
    pub max_payload_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50055,
            policy: "round_robin".to_string(),
            resize_hosts: vec!["localhost:50052".to_string()],
            filter_hosts: vec!["localhost:50053".to_string()],
            watermark_hosts: vec!["localhost:50054".to_string()],
            format_hosts: vec!["localhost:50056".to_string()],
            log_interval: 30,
            timeout: 600,
            max_inflight_per_endpoint: 32,
            max_payload_size: 64 * 1024 * 1024,
        }
    }
}

/// One step of a pipeline run: the host-map label and the worker call to make.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStage {
    pub label: String,
    pub params: StageParams,
}

impl PlannedStage {
    pub fn kind(&self) -> StageKind {
        self.params.kind()
    }
}

/// Turns normalized options into the ordered list of worker calls.
///
/// Order is fixed: Resize, each filter in the given order, Watermark, Format.
/// Format is always present.
pub fn plan_stages(options: &ProcessingOptions) -> Vec<PlannedStage> {
    let mut plan = Vec::with_capacity(options.filters.len() + 3);
    if options.resize_enabled() {
        plan.push(PlannedStage {
            label: "Resize".to_string(),
            params: StageParams::Resize {
                target_width: options.target_width,
                target_height: options.target_height,
                maintain_aspect_ratio: true,
            },
        });
    }
    for (i, filter) in options.filters.iter().enumerate() {
        plan.push(PlannedStage {
            label: format!("Filter-{} ({})", i + 1, filter),
            params: StageParams::Filter {
                filter_type: *filter,
                intensity: FILTER_INTENSITY,
            },
        });
    }
    if options.add_watermark {
        plan.push(PlannedStage {
            label: "Watermark".to_string(),
            params: StageParams::Watermark {
                text: options.watermark_text.clone(),
                position: options.watermark_position,
                font_size: WATERMARK_FONT_SIZE,
                color: WATERMARK_COLOR.to_string(),
                opacity: WATERMARK_OPACITY,
            },
        });
    }
    plan.push(PlannedStage {
        label: "Format".to_string(),
        params: StageParams::Format {
            format: options.output_format,
            quality: options.output_quality,
        },
    });
    plan
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub stage: StageKind,
    pub address: String,
    pub reachable: bool,
    pub detail: String,
}

/// The pipeline coordinator. Cheap to clone; all clones share pools and cursors.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pools: Arc<StagePools>,
    invoker: Arc<dyn StageInvoker>,
    probe_client: reqwest::Client,
    pub log_interval: u64,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> anyhow::Result<Self> {
        let policy = SelectionPolicy::parse(&config.policy)?;
        let pools = StagePools::new(
            policy,
            &config.resize_hosts,
            &config.filter_hosts,
            &config.watermark_hosts,
            &config.format_hosts,
            config.max_inflight_per_endpoint,
        )?;
        let client = HttpStageClient::new(Duration::from_secs(config.timeout))?;
        let probe_client = client.client().clone();
        Ok(Self {
            pools: Arc::new(pools),
            invoker: Arc::new(client),
            probe_client,
            log_interval: config.log_interval,
        })
    }

    /// Builds an orchestrator around a custom stage invoker.
    pub fn with_invoker(pools: StagePools, invoker: Arc<dyn StageInvoker>) -> Self {
        Self {
            pools: Arc::new(pools),
            invoker,
            probe_client: reqwest::Client::new(),
            log_interval: 0,
        }
    }

    pub fn pools(&self) -> &StagePools {
        &self.pools
    }

    pub fn pool_snapshot(&self) -> Vec<PoolSnapshot> {
        self.pools.snapshot()
    }

    pub async fn process(&self, req: ProcessRequest) -> ProcessResponse {
        self.process_image(&req.filename, req.image_data, req.options)
            .await
    }

    /// Runs the full pipeline for one image.
    ///
    /// Always returns a response; on the first failing stage the run stops and
    /// the response carries the stats gathered so far.
    pub async fn process_image(
        &self,
        filename: &str,
        image_data: Bytes,
        options: ProcessingOptions,
    ) -> ProcessResponse {
        let process_id = Uuid::new_v4().to_string();
        let options = options.normalized();
        let mut stats = StatsRecorder::start(image_data.len());
        log::info!(
            "Processing {:?} (process_id={}, {} bytes)",
            filename,
            process_id,
            image_data.len()
        );

        if !options.resize_enabled() {
            log::debug!("[{}] skipping resize", process_id);
        }
        if options.filters.is_empty() {
            log::debug!("[{}] skipping filters", process_id);
        }
        if !options.add_watermark {
            log::debug!("[{}] skipping watermark", process_id);
        }

        let mut current = image_data;
        for stage in plan_stages(&options) {
            let kind = stage.kind();
            let endpoint = self.pools.next(kind);
            log::info!("[{}] {} -> {}", process_id, stage.label, endpoint.address());
            stats.record_host(&stage.label, endpoint.address());
            stats.stage_started(kind);

            let sent_at = Instant::now();
            let outcome = self
                .invoker
                .invoke(&endpoint, &process_id, current, &stage.params)
                .await;
            match outcome {
                StageOutcome::Success(done) => {
                    stats.stage_finished(kind, done.processing_time_ms, sent_at.elapsed());
                    log::debug!(
                        "[{}] {} done in {}ms: {}",
                        process_id,
                        stage.label,
                        done.processing_time_ms,
                        done.message
                    );
                    if let Some((w, h)) = done.dimensions {
                        log::debug!("[{}] resized to {}x{}", process_id, w, h);
                    }
                    current = done.payload;
                }
                StageOutcome::Failure { message } => {
                    stats.stage_failed(kind);
                    let message = format!("{} failed: {}", stage.label, message);
                    log::error!("[{}] pipeline aborted: {}", process_id, message);
                    return ProcessResponse::failed(process_id, message, stats.finish_failure());
                }
            }
        }

        let stats = stats.finish_success(current.len());
        log::info!(
            "[{}] pipeline complete in {}ms ({} -> {} bytes)",
            process_id,
            stats.total_time_ms,
            stats.original_size_bytes,
            stats.processed_size_bytes
        );
        ProcessResponse::completed(process_id, current, stats)
    }

    /// Status lookup stub: every id reports as completed.
    ///
    /// Runs are synchronous and nothing is kept after a response is sent, so
    /// there is no job state to consult.
    pub fn get_processing_status(&self, process_id: &str) -> StatusInfo {
        StatusInfo {
            process_id: process_id.to_string(),
            status: "completed".to_string(),
            progress_percent: 100,
            current_stage: "done".to_string(),
            stats: ProcessingStats::default(),
        }
    }

    /// Checks `GET /health` on every configured worker.
    pub async fn probe_workers(&self) -> Vec<ProbeReport> {
        let endpoints = self.pools.all_endpoints();
        let tasks = endpoints.iter().map(|endpoint| async move {
            let result = self
                .probe_client
                .get(endpoint.api_path("/health"))
                .send()
                .await;
            let (reachable, detail) = match result {
                Ok(resp) if resp.status().is_success() => (true, resp.status().to_string()),
                Ok(resp) => (false, resp.status().to_string()),
                Err(e) => (false, e.to_string()),
            };
            ProbeReport {
                stage: endpoint.stage,
                address: endpoint.address().to_string(),
                reachable,
                detail,
            }
        });
        join_all(tasks).await
    }
}

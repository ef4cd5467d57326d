// Shared helpers for integration tests
#![allow(dead_code)]

pub mod mock_worker;

use async_trait::async_trait;
use bytes::Bytes;
use imgpipe_orchestrator::host_pool::Endpoint;
use imgpipe_orchestrator::{
    OrchestratorConfig, SelectionPolicy, StageInvoker, StageOutcome, StageParams, StagePools,
    stage_client::StageSuccess,
};

/// Config pointing every stage at the given worker addresses.
pub fn config_for(
    resize: &[&str],
    filter: &[&str],
    watermark: &[&str],
    format: &[&str],
) -> OrchestratorConfig {
    let owned = |hosts: &[&str]| hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    OrchestratorConfig {
        resize_hosts: owned(resize),
        filter_hosts: owned(filter),
        watermark_hosts: owned(watermark),
        format_hosts: owned(format),
        timeout: 10,
        log_interval: 0,
        ..Default::default()
    }
}

pub fn static_pools(n: usize) -> StagePools {
    let hosts = (0..n)
        .map(|i| format!("worker{}:9000", i + 1))
        .collect::<Vec<_>>();
    StagePools::new(SelectionPolicy::RoundRobin, &hosts, &hosts, &hosts, &hosts, 8).unwrap()
}

/// In-memory invoker that appends the stage name to the payload.
#[derive(Debug, Default)]
pub struct EchoInvoker {
    pub fail_on: Option<&'static str>,
}

#[async_trait]
impl StageInvoker for EchoInvoker {
    async fn invoke(
        &self,
        _endpoint: &Endpoint,
        _process_id: &str,
        payload: Bytes,
        params: &StageParams,
    ) -> StageOutcome {
        let stage = params.kind().to_string();
        if self.fail_on == Some(stage.as_str()) {
            return StageOutcome::Failure {
                message: format!("{stage} worker is down"),
            };
        }
        let mut out = payload.to_vec();
        out.push(b'+');
        out.extend_from_slice(stage.as_bytes());
        StageOutcome::Success(StageSuccess {
            payload: Bytes::from(out),
            processing_time_ms: 0,
            message: "ok".to_string(),
            dimensions: None,
        })
    }
}

//! Per-stage worker pools and endpoint selection.

use crate::error::ConfigError;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Resize,
    Filter,
    Watermark,
    Format,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Resize,
        StageKind::Filter,
        StageKind::Watermark,
        StageKind::Format,
    ];
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Resize => "Resize",
            StageKind::Filter => "Filter",
            StageKind::Watermark => "Watermark",
            StageKind::Format => "Format",
        };
        f.write_str(s)
    }
}

/// A single worker instance serving one stage.
#[derive(Debug)]
pub struct Endpoint {
    pub stage: StageKind,
    address: String,
    url: String,
    slots: Arc<Semaphore>,
    dispatched: AtomicU64,
    in_flight: Arc<AtomicU64>,
}

impl Endpoint {
    pub fn new(stage: StageKind, address: &str, max_inflight: usize) -> Result<Self, ConfigError> {
        let address = address.trim();
        let invalid = || ConfigError::InvalidEndpoint {
            stage,
            address: address.to_string(),
        };
        let host = address
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };
        if max_inflight == 0 {
            return Err(ConfigError::ZeroLeaseSlots);
        }
        Ok(Endpoint {
            stage,
            address: address.to_string(),
            url,
            slots: Arc::new(Semaphore::new(max_inflight)),
            dispatched: AtomicU64::new(0),
            in_flight: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The address exactly as configured; this is what the host map reports.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn api_path(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("{}{}", self.url, api_path)
        } else {
            format!("{}/{}", self.url, api_path)
        }
    }

    /// Waits for a free call slot on this endpoint.
    ///
    /// The slot is held until the returned lease is dropped, whether the call
    /// finished, failed or was cancelled.
    pub async fn acquire(&self) -> EndpointLease {
        // The semaphore is never closed, so acquisition only fails if that changes.
        let permit = self.slots.clone().acquire_owned().await.ok();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        EndpointLease {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}@{})", self.stage, self.address)
    }
}

/// Scoped hold on one endpoint call slot.
pub struct EndpointLease {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicU64>,
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    Random,
}

impl SelectionPolicy {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "round_robin" => Ok(SelectionPolicy::RoundRobin),
            "random" => Ok(SelectionPolicy::Random),
            other => Err(ConfigError::InvalidPolicy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionPolicy::RoundRobin => "round_robin",
            SelectionPolicy::Random => "random",
        }
    }
}

/// The ordered set of endpoints eligible for one stage.
#[derive(Debug)]
pub struct HostPool {
    stage: StageKind,
    policy: SelectionPolicy,
    endpoints: Vec<Arc<Endpoint>>,
    cursor: AtomicUsize,
}

impl HostPool {
    pub fn new(
        stage: StageKind,
        policy: SelectionPolicy,
        addresses: &[String],
        max_inflight: usize,
    ) -> Result<Self, ConfigError> {
        if addresses.is_empty() {
            return Err(ConfigError::EmptyPool { stage });
        }
        let endpoints = addresses
            .iter()
            .map(|addr| Endpoint::new(stage, addr, max_inflight).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HostPool {
            stage,
            policy,
            endpoints,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Picks the endpoint for one dispatch. Call once per worker call.
    pub fn next(&self) -> Arc<Endpoint> {
        let idx = match self.policy {
            SelectionPolicy::RoundRobin => self.advance_cursor(),
            SelectionPolicy::Random => rand::rng().random_range(0..self.endpoints.len()),
        };
        let endpoint = &self.endpoints[idx];
        endpoint.dispatched.fetch_add(1, Ordering::Relaxed);
        endpoint.clone()
    }

    /// Atomic read-then-advance; the stored cursor never leaves `[0, len)`.
    fn advance_cursor(&self) -> usize {
        let len = self.endpoints.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            stage: self.stage,
            policy: self.policy.name(),
            endpoints: self
                .endpoints
                .iter()
                .map(|e| EndpointSnapshot {
                    address: e.address().to_string(),
                    dispatched: e.dispatched(),
                    in_flight: e.in_flight(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub address: String,
    pub dispatched: u64,
    pub in_flight: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub stage: StageKind,
    pub policy: &'static str,
    pub endpoints: Vec<EndpointSnapshot>,
}

/// `Stage: addr=dispatched/in_flight, ...`
impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .endpoints
            .iter()
            .map(|e| format!("{}={}/{}", e.address, e.dispatched, e.in_flight))
            .collect::<Vec<_>>();
        write!(f, "{}: {}", self.stage, entries.join(", "))
    }
}

/// One pool per stage, built once at startup.
#[derive(Debug)]
pub struct StagePools {
    resize: HostPool,
    filter: HostPool,
    watermark: HostPool,
    format: HostPool,
}

impl StagePools {
    pub fn new(
        policy: SelectionPolicy,
        resize: &[String],
        filter: &[String],
        watermark: &[String],
        format: &[String],
        max_inflight: usize,
    ) -> Result<Self, ConfigError> {
        Ok(StagePools {
            resize: HostPool::new(StageKind::Resize, policy, resize, max_inflight)?,
            filter: HostPool::new(StageKind::Filter, policy, filter, max_inflight)?,
            watermark: HostPool::new(StageKind::Watermark, policy, watermark, max_inflight)?,
            format: HostPool::new(StageKind::Format, policy, format, max_inflight)?,
        })
    }

    pub fn pool(&self, stage: StageKind) -> &HostPool {
        match stage {
            StageKind::Resize => &self.resize,
            StageKind::Filter => &self.filter,
            StageKind::Watermark => &self.watermark,
            StageKind::Format => &self.format,
        }
    }

    pub fn next(&self, stage: StageKind) -> Arc<Endpoint> {
        self.pool(stage).next()
    }

    pub fn all_endpoints(&self) -> Vec<Arc<Endpoint>> {
        StageKind::ALL
            .iter()
            .flat_map(|s| self.pool(*s).endpoints().iter().cloned())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<PoolSnapshot> {
        StageKind::ALL
            .iter()
            .map(|s| self.pool(*s).snapshot())
            .collect()
    }
}

/// Splits a comma-separated endpoint list, dropping blank entries.
pub fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

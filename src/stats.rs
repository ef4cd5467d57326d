//! Per-request execution trace and timing.

use crate::host_pool::StageKind;
use crate::io_struct::ProcessingStats;
use indexmap::IndexMap;
use std::time::{Duration, Instant};

/// Stage label to worker address, in dispatch order.
pub type HostMap = IndexMap<String, String>;

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Accumulates `ProcessingStats` for one pipeline run.
#[derive(Debug)]
pub struct StatsRecorder {
    started: Instant,
    filters_started: Option<Instant>,
    stats: ProcessingStats,
}

impl StatsRecorder {
    pub fn start(original_size: usize) -> Self {
        StatsRecorder {
            started: Instant::now(),
            filters_started: None,
            stats: ProcessingStats {
                original_size_bytes: original_size as u64,
                ..Default::default()
            },
        }
    }

    pub fn record_host(&mut self, label: &str, address: &str) {
        self.stats
            .host_map
            .insert(label.to_string(), address.to_string());
    }

    /// Marks the start of a dispatch. The first filter dispatch opens the filter window.
    pub fn stage_started(&mut self, stage: StageKind) {
        if stage == StageKind::Filter && self.filters_started.is_none() {
            self.filters_started = Some(Instant::now());
        }
    }

    /// Records a finished stage call.
    ///
    /// `reported_ms` is what the worker claims; it is capped by the round trip
    /// we observed. Filters ignore it and use wall clock since the first filter.
    pub fn stage_finished(&mut self, stage: StageKind, reported_ms: u64, round_trip: Duration) {
        let ms = reported_ms.min(as_millis(round_trip));
        match stage {
            StageKind::Resize => self.stats.resize_time_ms = ms,
            StageKind::Filter => {
                self.stats.filter_time_ms = self.filters_started.map_or(0, |t| as_millis(t.elapsed()))
            }
            StageKind::Watermark => self.stats.watermark_time_ms = ms,
            StageKind::Format => self.stats.format_time_ms = ms,
        }
    }

    /// Closes a failed stage. Only the filter window carries partial time.
    pub fn stage_failed(&mut self, stage: StageKind) {
        if stage == StageKind::Filter {
            self.stage_finished(stage, 0, Duration::ZERO);
        }
    }

    pub fn finish_success(mut self, processed_size: usize) -> ProcessingStats {
        self.stats.processed_size_bytes = processed_size as u64;
        self.stats.total_time_ms = as_millis(self.started.elapsed());
        self.stats
    }

    pub fn finish_failure(mut self) -> ProcessingStats {
        self.stats.total_time_ms = as_millis(self.started.elapsed());
        self.stats
    }
}

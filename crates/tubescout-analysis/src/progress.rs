//! Progress events for running analyses.
//!
//! The pipeline publishes [`ProgressEvent`] values on a broadcast channel;
//! any number of subscribers (real-time delivery, logging, tests) consume
//! them without the pipeline knowing about transport. The reporter enforces
//! two guarantees per analysis id: reported percentages never regress, and
//! once a run is closed (terminal status) no further events are emitted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ordered phases of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExclusionBuild,
    Discovery,
    FanOut,
    Aggregation,
    Completion,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::ExclusionBuild => "exclusion_build",
            Stage::Discovery => "discovery",
            Stage::FanOut => "fan_out",
            Stage::Aggregation => "aggregation",
            Stage::Completion => "completion",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub analysis_id: Uuid,
    pub stage: Stage,
    /// 0–100, monotonically non-decreasing per analysis id.
    pub percent: u8,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

enum Track {
    Open(u8),
    Closed,
}

/// Publisher side of the progress channel.
pub struct ProgressReporter {
    tx: broadcast::Sender<ProgressEvent>,
    tracks: Mutex<HashMap<Uuid, Track>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressReporter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Emit a progress event for `analysis_id`.
    ///
    /// A percentage below the high-water mark is clamped up to it so
    /// subscribers never observe regression; events for a closed id are
    /// dropped entirely.
    pub fn emit(&self, analysis_id: Uuid, stage: Stage, percent: u8, message: Option<String>) {
        let percent = percent.min(100);
        let clamped = {
            let mut tracks = self.tracks.lock().expect("progress lock poisoned");
            match tracks.entry(analysis_id).or_insert(Track::Open(0)) {
                Track::Closed => return,
                Track::Open(high_water) => {
                    let clamped = percent.max(*high_water);
                    *high_water = clamped;
                    clamped
                }
            }
        };

        tracing::debug!(%analysis_id, stage = %stage, percent = clamped, "analysis progress");
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.tx.send(ProgressEvent {
            analysis_id,
            stage,
            percent: clamped,
            timestamp: Utc::now(),
            message,
        });
    }

    /// Stop accepting events for `analysis_id`. Called once the analysis
    /// reaches a terminal status. The closed marker stays behind so emits
    /// still in flight are dropped; [`ProgressReporter::forget`] removes it.
    pub fn close(&self, analysis_id: Uuid) {
        let mut tracks = self.tracks.lock().expect("progress lock poisoned");
        tracks.insert(analysis_id, Track::Closed);
    }

    /// Drop all bookkeeping for `analysis_id`. Safe only once nothing can
    /// emit for that id any more, i.e. after the run's task has returned.
    pub fn forget(&self, analysis_id: Uuid) {
        let mut tracks = self.tracks.lock().expect("progress lock poisoned");
        tracks.remove(&analysis_id);
    }

    /// Number of analysis ids currently tracked, open markers and closed
    /// markers alike.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.tracks.lock().expect("progress lock poisoned").len()
    }
}

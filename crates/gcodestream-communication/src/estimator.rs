//! Whole-job duration estimate computed off the calling thread
//!
//! The result is published through an atomic: `-1` until the worker
//! finishes, then the estimate in milliseconds.

use gcodestream_core::Point3D;
use gcodestream_parser::{ArcExpander, PointSegment};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sentinel published while the estimate is being computed
pub const NOT_READY: i64 = -1;

/// Time to travel a toolpath, in milliseconds
///
/// Rapids run at `rapid_rate` (mm/min). Feed moves use their own feed rate,
/// or the rapid rate when no feed has been set.
pub fn toolpath_duration_ms(segments: &[PointSegment], rapid_rate: f64) -> u64 {
    let mut start = Point3D::origin();
    let mut minutes = 0.0;

    for segment in segments {
        let factor = segment.units.to_mm_factor();
        let length_mm = ArcExpander::arc_length_mm(start, segment)
            .unwrap_or_else(|| start.distance(&segment.endpoint) * factor);

        let rate = if segment.is_fast_traverse {
            rapid_rate
        } else {
            segment
                .feed_rate
                .map(|feed| feed * factor)
                .filter(|feed| *feed > 0.0)
                .unwrap_or(rapid_rate)
        };
        if rate > 0.0 {
            minutes += length_mm / rate;
        }
        start = segment.endpoint;
    }

    (minutes * 60_000.0).round() as u64
}

/// Background toolpath estimate
#[derive(Debug)]
pub struct JobEstimator {
    millis: Arc<AtomicI64>,
    handle: Option<JoinHandle<()>>,
}

impl JobEstimator {
    /// Start estimating `segments` on a worker thread
    pub fn spawn(segments: Vec<PointSegment>, rapid_rate: f64) -> Self {
        let millis = Arc::new(AtomicI64::new(NOT_READY));
        let published = Arc::clone(&millis);

        let handle = std::thread::Builder::new()
            .name("gcodestream-estimator".to_string())
            .spawn(move || {
                let ms = toolpath_duration_ms(&segments, rapid_rate);
                published.store(i64::try_from(ms).unwrap_or(i64::MAX), Ordering::Release);
                tracing::info!(
                    "Estimated {} segments at {:.1}s",
                    segments.len(),
                    ms as f64 / 1000.0
                );
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Could not start estimator thread: {}", e);
                None
            }
        };

        Self { millis, handle }
    }

    /// Raw published value, [`NOT_READY`] until the worker finishes
    pub fn raw(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }

    /// Estimate, if ready
    pub fn estimate(&self) -> Option<Duration> {
        u64::try_from(self.raw()).ok().map(Duration::from_millis)
    }

    /// Block until the worker finishes
    pub fn wait(mut self) -> Option<Duration> {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Estimator thread panicked");
            }
        }
        self.estimate()
    }
}

use std::{sync::Arc, time::Duration};

use log::{debug, info};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    geo::{GeoPoint, distance_km},
    sim_state::SimulationState,
};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// A straight move from `start` to `end`, timed for some speed.
///
/// Recomputed whenever the destination changes, the old one is simply dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSegment {
    start: GeoPoint,
    end: GeoPoint,
    total_duration_ms: u32,
    started_at: Instant,
}

/// Plan a move between two points at `speed_kmh`, starting now
pub fn plan(start: GeoPoint, end: GeoPoint, speed_kmh: f64) -> MovementSegment {
    MovementSegment::starting_at(start, end, speed_kmh, Instant::now())
}

/// Get the position along a segment after `elapsed_ms` milliseconds.
///
/// Each axis is interpolated linearly and clamped at the end of the segment.
pub fn position_at(segment: &MovementSegment, elapsed_ms: u64) -> GeoPoint {
    let total = segment.total_duration_ms as u64;

    if total != 0 && elapsed_ms >= total {
        return segment.end;
    }

    let t = if total == 0 {
        0.0
    } else {
        elapsed_ms as f64 / total as f64
    };

    let lerp = |a: f64, b: f64| a + (b - a) * t;

    GeoPoint::new_unchecked(
        lerp(segment.start.lat(), segment.end.lat()),
        lerp(segment.start.lng(), segment.end.lng()),
    )
}

impl MovementSegment {
    pub fn starting_at(start: GeoPoint, end: GeoPoint, speed_kmh: f64, started_at: Instant) -> Self {
        let total_duration_ms = if speed_kmh.is_finite() && speed_kmh > 0.0 {
            // `as` saturates, so absurdly long segments cap at u32::MAX
            (distance_km(start, end) / speed_kmh * MS_PER_HOUR).round() as u32
        } else {
            0
        };

        Self {
            start,
            end,
            total_duration_ms,
            started_at,
        }
    }

    pub fn start(&self) -> GeoPoint {
        self.start
    }

    pub fn end(&self) -> GeoPoint {
        self.end
    }

    pub fn total_duration_ms(&self) -> u32 {
        self.total_duration_ms
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started_at).as_millis() as u64
    }

    /// A segment with zero duration is already complete
    pub fn is_complete_at(&self, now: Instant) -> bool {
        self.elapsed_ms(now) >= self.total_duration_ms as u64
    }

    pub fn position_now(&self) -> GeoPoint {
        position_at(self, self.elapsed_ms(Instant::now()))
    }
}

/// Headless smooth-move animator.
///
/// Follows the destination in [SimulationState] by planning a segment from the current position
/// and writing the interpolated point back as the current position every `interval`.
pub struct MovementDriver {
    state: Arc<SimulationState>,
    speed_kmh: f64,
    interval: Duration,
}

impl MovementDriver {
    pub fn new(state: Arc<SimulationState>, speed_kmh: f64, interval: Duration) -> Self {
        Self {
            state,
            speed_kmh,
            interval,
        }
    }

    /// Advance the animation for a moment in time
    fn step(&self, progress: &mut Progress, now: Instant) {
        // Read before the points, a write after this makes our own write below a no-op
        let revision = self.state.revision();

        if revision != progress.revision {
            // Anything set from outside abandons the segment, even if it ends at the same point
            progress.revision = revision;
            progress.segment = None;
        }

        let (Some(current), Some(destination)) =
            (self.state.current_position(), self.state.destination())
        else {
            progress.segment = None;
            return;
        };

        let seg = match progress.segment {
            Some(seg) => seg,
            None if current == destination => return,
            None => {
                let new = MovementSegment::starting_at(current, destination, self.speed_kmh, now);
                info!(
                    "Moving {current} -> {destination} over {}ms",
                    new.total_duration_ms
                );
                progress.segment = Some(new);
                new
            }
        };

        if seg.is_complete_at(now) {
            debug!("Arrived at {}", seg.end);
            self.state.advance_current_position(seg.end, revision);
            progress.segment = None;
        } else {
            self.state
                .advance_current_position(position_at(&seg, seg.elapsed_ms(now)), revision);
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        let mut progress = Progress::default();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                _ = interval.tick() => {
                    self.step(&mut progress, Instant::now());
                }
            }
        }
    }
}

#[derive(Default)]
struct Progress {
    segment: Option<MovementSegment>,
    /// [SimulationState::revision] the segment was planned against
    revision: u64,
}

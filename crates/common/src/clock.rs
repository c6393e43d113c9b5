//! Clock and pacing utilities.
//!
//! The compositor ticks on a fixed cadence and the stream worker drains its
//! queues on the same cadence. This module provides:
//! - A session clock anchored at stream start
//! - A rate gate for throttling periodic lookups
//! - A deadline-based pacer for fixed-rate loops

use std::time::{Duration, Instant};

/// A session clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment a stream session started).
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// The instant the session started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl SessionClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get seconds elapsed since the session started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at session start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Rate gate for periodic work driven by an external loop.
#[derive(Debug)]
pub struct RateController {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self::with_interval(Duration::from_nanos(
            1_000_000_000 / target_hz.max(1) as u64,
        ))
    }

    /// Create a controller that fires at most once per `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now: Instant) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
                true
            }
            Some(last) if now.duration_since(last) >= self.interval => {
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Forget the last tick so the next check fires immediately.
    pub fn reset(&mut self) {
        self.last_tick = None;
    }

    /// Target interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Deadline-based pacer for fixed-rate loops.
///
/// Sleeping a constant interval after each iteration accumulates the
/// iteration's own cost as drift; the pacer sleeps until the next deadline
/// instead, and re-anchors when an iteration overruns a whole interval.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Instant,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        let interval = Duration::from_nanos(1_000_000_000 / fps.max(1) as u64);
        Self {
            interval,
            next_deadline: Instant::now() + interval,
        }
    }

    /// Block until the next deadline. Returns how long it slept.
    pub fn wait(&mut self) -> Duration {
        let now = Instant::now();
        let slept = if self.next_deadline > now {
            let remaining = self.next_deadline - now;
            std::thread::sleep(remaining);
            remaining
        } else {
            Duration::ZERO
        };

        self.next_deadline += self.interval;
        let now = Instant::now();
        if self.next_deadline + self.interval < now {
            self.next_deadline = now + self.interval;
        }
        slept
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

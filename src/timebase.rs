//! Monotonic-clock to UTC correction
//!
//! [`TimeBase`] is the single source of corrected timestamps. It anchors a
//! monotonic clock origin at construction and maintains one offset to UTC,
//! seeded from the system clock so `now()` works before the first GPS fix
//! and resynchronized opportunistically from trustworthy fixes.
//!
//! Between resyncs `now()` is strictly non-decreasing and advances exactly
//! with the monotonic clock; a resync is a discrete, logged jump.

use crate::config::TimeBaseConfig;
use crate::gps::FixQuality;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Offset state, mutated only by [`TimeBase::apply_resync`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicOffset {
    /// Nanoseconds added to the monotonic clock to obtain UTC
    pub offset_ns: i64,
    /// When the offset was first established from a GPS fix; `None` while
    /// still running on the system-clock seed
    pub established_at: Option<Instant>,
    /// When the offset last changed
    pub last_resync_at: Option<Instant>,
    /// Accepted resyncs since process start
    pub resync_count: u32,
}

/// Outcome of a resync proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// Offset was replaced
    Applied,
    /// Fix quality or satellite count below the configured minimum
    RejectedQuality,
    /// Accepted resync happened too recently
    RejectedInterval,
    /// Proposed change within the jitter threshold of the current offset
    RejectedJitter,
    /// Proposed change exceeds the max-plausible-jump guard
    RejectedJump,
}

/// Monotonic→UTC offset holder
pub struct TimeBase {
    origin: Instant,
    state: Mutex<MonotonicOffset>,
    config: TimeBaseConfig,
}

impl TimeBase {
    /// Create a timebase seeded from the system clock
    pub fn new(config: TimeBaseConfig) -> Self {
        let origin = Instant::now();
        let wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        Self {
            origin,
            state: Mutex::new(MonotonicOffset {
                offset_ns: wall_ns,
                established_at: None,
                last_resync_at: None,
                resync_count: 0,
            }),
            config,
        }
    }

    /// Corrected UTC instant: monotonic clock plus the current offset
    pub fn now(&self) -> DateTime<Utc> {
        let mono_ns = self.origin.elapsed().as_nanos() as i64;
        let offset_ns = self.state.lock().offset_ns;
        Utc.timestamp_nanos(offset_ns + mono_ns)
    }

    /// Propose a resync from a GPS-reported instant
    ///
    /// The quality gate always applies. The first accepted resync of process
    /// lifetime bootstraps the offset with no further checks; afterwards a
    /// proposal must clear the minimum-interval pacing, stay under the
    /// max-plausible-jump guard, and exceed the jitter threshold to replace
    /// the offset. Rejection is not an error: the prior offset is retained.
    pub fn apply_resync(
        &self,
        gps_instant: DateTime<Utc>,
        quality: FixQuality,
        satellites: u32,
    ) -> ResyncOutcome {
        if quality < FixQuality::Fix2D || satellites < self.config.resync_min_satellites {
            log::debug!(
                "Resync rejected: quality {:?}, {} satellites",
                quality,
                satellites
            );
            return ResyncOutcome::RejectedQuality;
        }

        let Some(gps_ns) = gps_instant.timestamp_nanos_opt() else {
            log::warn!("Resync rejected: GPS instant {} out of range", gps_instant);
            return ResyncOutcome::RejectedJump;
        };

        let mono_ns = self.origin.elapsed().as_nanos() as i64;
        let proposed_ns = gps_ns - mono_ns;

        let mut state = self.state.lock();

        if state.established_at.is_some() {
            if let Some(last) = state.last_resync_at {
                let min_interval = Duration::from_secs(self.config.resync_min_interval_secs);
                if last.elapsed() < min_interval {
                    return ResyncOutcome::RejectedInterval;
                }
            }

            let delta_ns = proposed_ns - state.offset_ns;
            let max_jump_ns = self.config.resync_max_jump_secs.saturating_mul(1_000_000_000);
            if delta_ns.unsigned_abs() > max_jump_ns {
                log::warn!(
                    "Resync rejected: implausible jump of {} s",
                    delta_ns / 1_000_000_000
                );
                return ResyncOutcome::RejectedJump;
            }

            let jitter_ns = self.config.resync_jitter_ms.saturating_mul(1_000_000);
            if delta_ns.unsigned_abs() <= jitter_ns {
                log::debug!("Resync skipped: delta {} ns within jitter threshold", delta_ns);
                return ResyncOutcome::RejectedJitter;
            }
        }

        let old_ns = state.offset_ns;
        state.offset_ns = proposed_ns;
        if state.established_at.is_none() {
            state.established_at = Some(Instant::now());
        }
        state.last_resync_at = Some(Instant::now());
        state.resync_count += 1;

        log::info!(
            "Clock resync #{}: offset {} ns -> {} ns (delta {:+} ms)",
            state.resync_count,
            old_ns,
            proposed_ns,
            (proposed_ns - old_ns) / 1_000_000
        );

        ResyncOutcome::Applied
    }

    /// Atomically-copied snapshot of the offset state
    pub fn offset(&self) -> MonotonicOffset {
        *self.state.lock()
    }
}

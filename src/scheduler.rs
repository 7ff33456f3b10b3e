//! Fixed-rate capture loop
//!
//! One iteration is one capture attempt. The loop paces itself against an
//! absolute schedule: the next iteration starts at `previous_start + T`,
//! never `now + T`, so camera latency does not accumulate as drift. If an
//! iteration overruns its budget the next one starts immediately and the
//! schedule re-anchors; sleep debt never compounds.
//!
//! Skipped iterations (no frame, no fix under `require_fix`, storage
//! denied) never advance the filename sequence, so no path is burned on an
//! image that was never written.

use crate::config::CaptureConfig;
use crate::devices::camera::{CameraDevice, CaptureOutcome};
use crate::devices::sink::{CaptureRecord, ImageSink};
use crate::gps::{FixSource, GpsFix};
use crate::naming::FilenameSequencer;
use crate::storage::StorageHealthMonitor;
use crate::timebase::TimeBase;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How often the loop logs its counters
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Capture loop counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub captured: u64,
    pub empty: u64,
    pub device_errors: u64,
    pub skipped_no_fix: u64,
    pub skipped_storage: u64,
    pub sink_errors: u64,
}

/// Foreground capture loop
pub struct CaptureScheduler {
    interval: Duration,
    require_fix: bool,
    sequencer: FilenameSequencer,
    stats: SchedulerStats,
}

impl CaptureScheduler {
    pub fn new(config: &CaptureConfig, base: &Path) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / config.fps.max(0.001)),
            require_fix: config.require_fix,
            sequencer: FilenameSequencer::new(base, &config.filename_prefix),
            stats: SchedulerStats::default(),
        }
    }

    /// Run capture iterations until `shutdown` is set
    ///
    /// The loop stops between iterations, never mid-capture.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        camera: &mut dyn CameraDevice,
        sink: &mut dyn ImageSink,
        timebase: &TimeBase,
        fixes: &dyn FixSource,
        storage: &mut StorageHealthMonitor,
        shutdown: &AtomicBool,
    ) {
        log::info!(
            "Capture loop starting: {:.2} fps (interval {:?}), require_fix={}",
            1.0 / self.interval.as_secs_f64(),
            self.interval,
            self.require_fix
        );

        let mut next_start = Instant::now();
        let mut last_stats = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            sleep_until(next_start, shutdown);
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let start = Instant::now();
            self.iterate(camera, sink, timebase, fixes, storage);

            // Absolute schedule: past deadlines trigger immediate execution
            // via the zero-clamped sleep above
            next_start = start + self.interval;

            if last_stats.elapsed() >= STATS_LOG_INTERVAL {
                self.log_stats();
                last_stats = Instant::now();
            }
        }

        log::info!("Capture loop exiting");
        self.log_stats();
    }

    /// One capture attempt
    fn iterate(
        &mut self,
        camera: &mut dyn CameraDevice,
        sink: &mut dyn ImageSink,
        timebase: &TimeBase,
        fixes: &dyn FixSource,
        storage: &mut StorageHealthMonitor,
    ) {
        let frame = match camera.capture() {
            CaptureOutcome::Frame(frame) => frame,
            CaptureOutcome::Empty => {
                log::debug!("Camera produced no frame this cycle");
                self.stats.empty += 1;
                return;
            }
            CaptureOutcome::DeviceError(msg) => {
                log::warn!("Camera device error: {}", msg);
                self.stats.device_errors += 1;
                return;
            }
        };

        let timestamp = timebase.now();

        let mut fix = fixes.current_fix();
        if !fix.quality.is_valid() {
            if self.require_fix {
                log::debug!("No valid GPS fix, skipping capture (require_fix)");
                self.stats.skipped_no_fix += 1;
                return;
            }
            // Satellites 0 marks the (0.0, 0.0) geotag as synthesized
            fix = GpsFix::fallback();
        }

        if !storage.gate_write(timestamp.date_naive()).is_allowed() {
            self.stats.skipped_storage += 1;
            return;
        }

        let path = self.sequencer.next_path(timestamp);
        let record = CaptureRecord {
            frame: &frame,
            fix: &fix,
            timestamp,
            path: &path,
        };

        match sink.write(&record) {
            Ok(()) => {
                self.stats.captured += 1;
            }
            Err(e) => {
                log::error!("Image write failed for {}: {}", path.display(), e);
                self.stats.sink_errors += 1;
            }
        }
    }

    fn log_stats(&self) {
        let s = self.snapshot();
        log::info!(
            "Capture stats: written={} empty={} device_errors={} no_fix_skips={} storage_skips={} sink_errors={}",
            s.captured,
            s.empty,
            s.device_errors,
            s.skipped_no_fix,
            s.skipped_storage,
            s.sink_errors
        );
    }

    /// Copy out the counters
    pub fn snapshot(&self) -> SchedulerStats {
        self.stats
    }
}

/// Sleep in short slices until the deadline so shutdown stays responsive
fn sleep_until(deadline: Instant, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}

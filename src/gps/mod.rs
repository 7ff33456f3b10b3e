//! GPS background reader
//!
//! Runs a dedicated thread that owns the serial transport, assembles and
//! validates NMEA sentences, runs the fix-quality state machine, and
//! publishes whole [`GpsFix`] snapshots for the capture loop. Good fixes
//! also feed [`TimeBase::apply_resync`].
//!
//! The thread never fails the daemon: an unopenable or dying port is retried
//! with exponential backoff, malformed sentences are counted and dropped,
//! and a silent receiver demotes the published fix to NoFix.

mod fix;
pub mod nmea;

pub use fix::{FixQuality, GpsFix};

use crate::config::GpsConfig;
use crate::error::{Error, Result};
use crate::timebase::TimeBase;
use crate::transport::Transport;
use nmea::{GgaData, Sentence, SentenceReader};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Creates the transport the reader thread owns; called again with backoff
/// whenever the device disappears
pub type TransportFactory = Box<dyn Fn() -> Result<Box<dyn Transport>> + Send>;

/// Non-blocking source of the latest fix snapshot
pub trait FixSource: Send + Sync {
    /// Last published snapshot, or the designated no-fix-yet value
    fn current_fix(&self) -> GpsFix;
}

/// Stream statistics counters
#[derive(Default)]
struct GpsStats {
    sentences: AtomicU64,
    checksum_errors: AtomicU64,
    parse_errors: AtomicU64,
    fixes_published: AtomicU64,
    resyncs_applied: AtomicU64,
    reconnects: AtomicU64,
}

/// Copied-out statistics snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsStatsSnapshot {
    pub sentences: u64,
    pub checksum_errors: u64,
    pub parse_errors: u64,
    pub fixes_published: u64,
    pub resyncs_applied: u64,
    pub reconnects: u64,
}

/// Handle to the GPS reader thread
pub struct GpsReader {
    shared: Arc<Mutex<GpsFix>>,
    stats: Arc<GpsStats>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GpsReader {
    /// Spawn the reader thread
    pub fn spawn(
        factory: TransportFactory,
        config: GpsConfig,
        timebase: Arc<TimeBase>,
    ) -> Result<Self> {
        let shared = Arc::new(Mutex::new(GpsFix::no_fix()));
        let stats = Arc::new(GpsStats::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shared = Arc::clone(&shared);
        let thread_stats = Arc::clone(&stats);
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("gps-reader".to_string())
            .spawn(move || {
                reader_loop(
                    factory,
                    config,
                    timebase,
                    thread_shared,
                    thread_stats,
                    thread_shutdown,
                );
            })?;

        Ok(Self {
            shared,
            stats,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Copy out the statistics counters
    pub fn stats(&self) -> GpsStatsSnapshot {
        GpsStatsSnapshot {
            sentences: self.stats.sentences.load(Ordering::Relaxed),
            checksum_errors: self.stats.checksum_errors.load(Ordering::Relaxed),
            parse_errors: self.stats.parse_errors.load(Ordering::Relaxed),
            fixes_published: self.stats.fixes_published.load(Ordering::Relaxed),
            resyncs_applied: self.stats.resyncs_applied.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Signal shutdown and join the thread
    ///
    /// The thread parks in reads no longer than the configured timeout, so
    /// the join returns at the next read-timeout boundary.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("GPS reader thread panicked");
            }
        }
    }
}

impl FixSource for GpsReader {
    fn current_fix(&self) -> GpsFix {
        self.shared.lock().clone()
    }
}

impl Drop for GpsReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fields buffered across one reporting cycle
///
/// GGA carries position/quality/satellites/time-of-day but no date; RMC
/// carries the date; VTG and RMC carry speed/course. A snapshot is published
/// on each GGA, joined with whatever the rest of the cycle contributed.
/// Partial data never reaches readers.
#[derive(Default)]
struct PendingCycle {
    date: Option<chrono::NaiveDate>,
    speed_knots: Option<f64>,
    course_deg: Option<f64>,
    gsa_mode: u8,
}

const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);
const IDLE_SLEEP: Duration = Duration::from_millis(2);

fn reader_loop(
    factory: TransportFactory,
    config: GpsConfig,
    timebase: Arc<TimeBase>,
    shared: Arc<Mutex<GpsFix>>,
    stats: Arc<GpsStats>,
    shutdown: Arc<AtomicBool>,
) {
    let stale_timeout = Duration::from_secs(config.stale_fix_timeout_secs);
    let mut transport: Option<Box<dyn Transport>> = None;
    let mut backoff = Duration::from_secs(1);
    let mut reader = SentenceReader::new();
    let mut pending = PendingCycle::default();
    let mut invalid_reads: u32 = 0;
    let mut last_fix_data = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        // Staleness applies even while the port is missing: a silent or
        // absent receiver must not leave an old fix looking valid
        if invalid_reads >= config.max_invalid_reads || last_fix_data.elapsed() > stale_timeout {
            demote_fix(&shared);
        }

        let Some(port) = transport.as_mut() else {
            match factory() {
                Ok(t) => {
                    transport = Some(t);
                    backoff = Duration::from_secs(1);
                    reader = SentenceReader::new();
                    stats.reconnects.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!("GPS port unavailable: {} (retrying in {:?})", e, backoff);
                    interruptible_sleep(backoff, &shutdown);
                    backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                }
            }
            continue;
        };

        match reader.read_sentence(port.as_mut()) {
            Ok(Some(body)) => {
                stats.sentences.fetch_add(1, Ordering::Relaxed);
                if let Some(sentence) = nmea::parse_sentence(&body) {
                    invalid_reads = 0;
                    last_fix_data = Instant::now();
                    process_sentence(sentence, &mut pending, &timebase, &shared, &stats);
                }
            }
            Ok(None) => {
                thread::sleep(IDLE_SLEEP);
            }
            Err(Error::ChecksumMismatch { .. }) => {
                stats.checksum_errors.fetch_add(1, Ordering::Relaxed);
                invalid_reads += 1;
            }
            Err(Error::InvalidSentence(_)) => {
                stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                invalid_reads += 1;
            }
            Err(e) => {
                // Transport-level failure: drop the port and re-enter the
                // reconnect path with backoff
                log::warn!("GPS read failed: {} (reopening port)", e);
                transport = None;
            }
        }
    }

    log::info!("GPS reader thread exiting");
}

/// Sleep in short slices so shutdown stays responsive during backoff
fn interruptible_sleep(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100).min(deadline - Instant::now()));
    }
}

fn process_sentence(
    sentence: Sentence,
    pending: &mut PendingCycle,
    timebase: &TimeBase,
    shared: &Mutex<GpsFix>,
    stats: &GpsStats,
) {
    match sentence {
        Sentence::Rmc(rmc) => {
            if rmc.valid {
                pending.date = rmc.date.or(pending.date);
            }
            pending.speed_knots = rmc.speed_knots.or(pending.speed_knots);
            pending.course_deg = rmc.course_deg.or(pending.course_deg);
        }
        Sentence::Vtg(vtg) => {
            pending.speed_knots = vtg.speed_knots.or(pending.speed_knots);
            pending.course_deg = vtg.course_deg.or(pending.course_deg);
        }
        Sentence::Gsa(gsa) => {
            pending.gsa_mode = gsa.fix_mode;
        }
        Sentence::Gga(gga) => {
            publish_fix(&gga, pending, timebase, shared, stats);
        }
    }
}

/// Assemble and publish a complete snapshot from the GGA plus buffered
/// cycle data
fn publish_fix(
    gga: &GgaData,
    pending: &PendingCycle,
    timebase: &TimeBase,
    shared: &Mutex<GpsFix>,
    stats: &GpsStats,
) {
    let quality = classify_quality(gga, pending.gsa_mode);

    // Date comes from RMC; without it the time-of-day cannot rebuild a full
    // UTC instant, so such fixes geotag but never resync the clock
    let fix_timestamp = match (pending.date, gga.time) {
        (Some(date), Some(time)) => Some(
            chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(date.and_time(time), chrono::Utc),
        ),
        _ => None,
    };

    let fix = GpsFix {
        latitude: gga.latitude.unwrap_or(0.0),
        longitude: gga.longitude.unwrap_or(0.0),
        altitude: gga.altitude.unwrap_or(0.0),
        speed_knots: pending.speed_knots.unwrap_or(0.0),
        course_deg: pending.course_deg.unwrap_or(0.0),
        satellites: gga.satellites,
        quality,
        fix_timestamp,
        received_at: Instant::now(),
    };

    {
        let mut slot = shared.lock();
        if slot.quality != fix.quality {
            log::info!("GPS fix state: {:?} -> {:?} ({} satellites)", slot.quality, fix.quality, fix.satellites);
        }
        *slot = fix.clone();
    }
    stats.fixes_published.fetch_add(1, Ordering::Relaxed);

    if quality >= FixQuality::Fix2D {
        if let Some(ts) = fix_timestamp {
            if timebase.apply_resync(ts, quality, gga.satellites) == crate::timebase::ResyncOutcome::Applied {
                stats.resyncs_applied.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Map the receiver quality code and GSA solution mode onto the quality
/// ladder; positions with no satellites are never trusted
fn classify_quality(gga: &GgaData, gsa_mode: u8) -> FixQuality {
    if gga.quality_code == 0 || gga.satellites == 0 || gga.latitude.is_none() {
        FixQuality::NoFix
    } else if gsa_mode == 3 {
        FixQuality::Fix3D
    } else {
        FixQuality::Fix2D
    }
}

/// Publish a demoted snapshot; position fields are retained but flagged
/// untrustworthy
fn demote_fix(shared: &Mutex<GpsFix>) {
    let mut slot = shared.lock();
    if slot.quality != FixQuality::NoFix {
        log::warn!("GPS fix stale, demoting to NoFix");
        let mut demoted = slot.clone();
        demoted.quality = FixQuality::NoFix;
        demoted.received_at = Instant::now();
        *slot = demoted;
    }
}

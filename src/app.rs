//! Application orchestration for the BathyImg daemon
//!
//! Wires the timebase, GPS reader thread, storage monitor, and capture
//! scheduler together. The app owns every hardware handle for its whole
//! lifetime; shutdown stops the scheduler between iterations and joins the
//! GPS thread at its next read-timeout boundary.

use crate::config::AppConfig;
use crate::devices::camera::CameraDevice;
use crate::devices::sink::ImageSink;
use crate::error::Result;
use crate::gps::{GpsReader, TransportFactory};
use crate::scheduler::CaptureScheduler;
use crate::storage::StorageHealthMonitor;
use crate::timebase::TimeBase;
use crate::transport::{SerialTransport, Transport};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Acquisition coordinator: owns all components and runs the capture loop
pub struct AcquisitionApp {
    timebase: Arc<TimeBase>,
    gps: GpsReader,
    storage: StorageHealthMonitor,
    scheduler: CaptureScheduler,
    camera: Box<dyn CameraDevice>,
    sink: Box<dyn ImageSink>,
    shutdown: Arc<AtomicBool>,
}

impl AcquisitionApp {
    /// Construct the coordinator and start the GPS reader thread
    ///
    /// The camera driver and image sink are collaborator seams injected by
    /// the caller.
    pub fn new(
        config: AppConfig,
        camera: Box<dyn CameraDevice>,
        sink: Box<dyn ImageSink>,
    ) -> Result<Self> {
        log::info!("Initializing acquisition coordinator");

        let timebase = Arc::new(TimeBase::new(config.timebase.clone()));

        let gps_config = config.gps.clone();
        let factory: TransportFactory = Box::new(move || {
            let transport = SerialTransport::open(
                &gps_config.port,
                gps_config.baud_rate,
                Duration::from_millis(gps_config.read_timeout_ms),
            )?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        });
        let gps = GpsReader::spawn(factory, config.gps.clone(), Arc::clone(&timebase))?;

        let storage = StorageHealthMonitor::new(config.storage.clone());
        let scheduler =
            CaptureScheduler::new(&config.capture, Path::new(&config.storage.mount_path));

        if !config.capture.use_sequence_counter {
            // Degraded naming mode is identical to normal mode minus
            // external counter overrides, which this coordinator never takes
            log::info!("Sequence counters disabled in config; internal per-bucket counter still applies");
        }

        log::info!("✓ Acquisition coordinator initialized");

        Ok(Self {
            timebase,
            gps,
            storage,
            scheduler,
            camera,
            sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the run loop; hand this to a signal handler
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the capture loop until the shutdown flag is set, then stop the
    /// GPS thread and report final statistics
    pub fn run(&mut self) -> Result<()> {
        let state = self.storage.check();
        if state.is_available {
            log::info!("Storage available: {} bytes free", state.free_bytes);
        } else {
            log::warn!(
                "Storage not available at startup: {} (capture continues, writes gated)",
                state.reason.as_deref().unwrap_or("unknown")
            );
        }

        self.scheduler.run(
            self.camera.as_mut(),
            self.sink.as_mut(),
            &self.timebase,
            &self.gps,
            &mut self.storage,
            &self.shutdown,
        );

        log::info!("Shutting down GPS reader...");
        self.gps.stop();

        let gps_stats = self.gps.stats();
        log::info!(
            "GPS stream totals: sentences={} checksum_errors={} parse_errors={} fixes={} resyncs={} reconnects={}",
            gps_stats.sentences,
            gps_stats.checksum_errors,
            gps_stats.parse_errors,
            gps_stats.fixes_published,
            gps_stats.resyncs_applied,
            gps_stats.reconnects
        );
        let offset = self.timebase.offset();
        log::info!(
            "Timebase: {} resync(s), GPS-established: {}",
            offset.resync_count,
            offset.established_at.is_some()
        );

        Ok(())
    }
}

impl Drop for AcquisitionApp {
    fn drop(&mut self) {
        // Guarantee release on every exit path, including panics upstream
        self.shutdown.store(true, Ordering::Relaxed);
        self.gps.stop();
    }
}

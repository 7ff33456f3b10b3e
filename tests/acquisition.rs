//! End-to-end acquisition tests
//!
//! Drives the full pipeline through its public seams: NMEA bytes in through
//! a mock transport, geotagged JPEG files out in date partitions, with the
//! capture clock corrected from the GPS stream.

use bathyimg::app::AcquisitionApp;
use bathyimg::config::{AppConfig, CaptureConfig, GpsConfig, StorageConfig, TimeBaseConfig};
use bathyimg::devices::mock::MockCamera;
use bathyimg::devices::FsImageSink;
use bathyimg::gps::{FixQuality, FixSource, GpsReader, TransportFactory};
use bathyimg::scheduler::CaptureScheduler;
use bathyimg::storage::StorageHealthMonitor;
use bathyimg::timebase::TimeBase;
use bathyimg::transport::{MockTransport, Transport};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const GGA_FIX: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
const RMC_FIX: &str = "$GPRMC,174300.082,A,4807.038,N,01131.000,E,5.2,84.4,051125,,*37";
const GSA_3D: &str = "$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39";

fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

/// List files under the mount's single date partition, sorted
fn partition_files(mount: &Path, partition: &str) -> Vec<String> {
    let dir = mount.join(partition);
    let mut names: Vec<String> = fs::read_dir(&dir)
        .unwrap_or_else(|_| panic!("partition {} missing", dir.display()))
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_gps_stream_to_geotagged_files() {
    let tmp = TempDir::new().unwrap();

    let transport = MockTransport::new();
    let injector = transport.clone();
    let factory: TransportFactory =
        Box::new(move || Ok(Box::new(injector.clone()) as Box<dyn Transport>));

    let gps_config = GpsConfig {
        port: "mock".to_string(),
        baud_rate: 4800,
        read_timeout_ms: 10,
        stale_fix_timeout_secs: 3600,
        max_invalid_reads: 100,
    };
    let timebase = Arc::new(TimeBase::new(TimeBaseConfig::default()));
    let gps = GpsReader::spawn(factory, gps_config, Arc::clone(&timebase)).unwrap();

    // Full reporting cycle: date from RMC, 3D mode from GSA, fix from GGA
    transport.inject_sentence(RMC_FIX);
    transport.inject_sentence(GSA_3D);
    transport.inject_sentence(GGA_FIX);
    wait_for(
        || gps.current_fix().quality == FixQuality::Fix3D,
        "3D fix from injected cycle",
    );
    wait_for(
        || timebase.offset().resync_count == 1,
        "clock resync from GPS time",
    );

    // The corrected clock now reports the GPS date (2025-11-05 12:35 UTC,
    // GGA time-of-day joined with the RMC date)
    let corrected = timebase.now();
    assert_eq!(corrected.date_naive().format("%Y%m%d").to_string(), "20251105");

    // Capture a few frames against the corrected clock
    let capture_config = CaptureConfig {
        fps: 50.0,
        require_fix: false,
        use_sequence_counter: true,
        filename_prefix: "bathyimgtest".to_string(),
    };
    let storage_config = StorageConfig {
        mount_path: tmp.path().to_string_lossy().into_owned(),
        min_free_bytes: 0,
        ..Default::default()
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let thread_shutdown = Arc::clone(&shutdown);
    let base = tmp.path().to_path_buf();
    let timebase_clone = Arc::clone(&timebase);

    let scheduler_thread = thread::spawn(move || {
        let mut scheduler = CaptureScheduler::new(&capture_config, &base);
        let mut camera = MockCamera::with_latency(Duration::from_millis(1));
        let mut sink = FsImageSink;
        let mut storage = StorageHealthMonitor::new(storage_config);

        scheduler.run(
            &mut camera,
            &mut sink,
            &timebase_clone,
            &gps,
            &mut storage,
            &thread_shutdown,
        );
        scheduler.snapshot()
    });

    thread::sleep(Duration::from_millis(400));
    shutdown.store(true, Ordering::Relaxed);
    let stats = scheduler_thread.join().unwrap();
    assert!(stats.captured >= 3, "expected several captures, got {}", stats.captured);

    // Files landed in the partition for the GPS-corrected date and sort in
    // capture order
    let names = partition_files(tmp.path(), "20251105");
    assert_eq!(names.len() as u64, stats.captured);
    for name in &names {
        assert!(name.starts_with("bathyimgtest_20251105-"), "bad name {}", name);
        assert!(name.ends_with(".jpg"));
    }
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn test_app_degrades_without_gps_hardware() {
    let tmp = TempDir::new().unwrap();

    let mut config = AppConfig::default();
    config.gps.port = tmp
        .path()
        .join("no-such-port")
        .to_string_lossy()
        .into_owned();
    config.capture.fps = 25.0;
    config.capture.filename_prefix = "degraded".to_string();
    config.storage.mount_path = tmp.path().to_string_lossy().into_owned();
    config.storage.min_free_bytes = 0;

    let camera = Box::new(MockCamera::with_latency(Duration::from_millis(1)));
    let mut app = AcquisitionApp::new(config, camera, Box::new(FsImageSink)).unwrap();

    let shutdown = app.shutdown_flag();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        shutdown.store(true, Ordering::Relaxed);
    });

    app.run().unwrap();
    stopper.join().unwrap();

    // With no GPS the capture continues on the system-clock seed and tags
    // fallback coordinates; files still land in a date partition
    let partitions: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.len() == 8 && n.bytes().all(|b| b.is_ascii_digit()))
        .collect();
    assert_eq!(partitions.len(), 1, "expected one date partition");

    let names = partition_files(tmp.path(), &partitions[0]);
    assert!(!names.is_empty());
    assert!(names[0].starts_with("degraded_"));
}

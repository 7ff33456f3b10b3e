//! Mock devices for hardware-free runs and tests

use crate::devices::camera::{CameraDevice, CaptureOutcome, ImageFrame};
use crate::devices::sink::{CaptureRecord, ImageSink};
use crate::error::Result;
use crate::gps::{FixSource, GpsFix};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Minimal valid JPEG payload (SOI + EOI markers)
const STUB_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

/// Deterministic camera simulation
///
/// Returns scripted outcomes first, then frames at a fixed simulated
/// exposure latency. Tests use the script to exercise Empty/DeviceError
/// handling; the pacing test uses the latency to overrun the frame budget.
pub struct MockCamera {
    latency: Duration,
    script: VecDeque<CaptureOutcome>,
}

impl MockCamera {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            script: VecDeque::new(),
        }
    }

    /// Queue an outcome to be returned before the default frame behavior
    pub fn push_outcome(&mut self, outcome: CaptureOutcome) {
        self.script.push_back(outcome);
    }
}

impl CameraDevice for MockCamera {
    fn capture(&mut self) -> CaptureOutcome {
        thread::sleep(self.latency);
        self.script.pop_front().unwrap_or_else(|| {
            CaptureOutcome::Frame(ImageFrame {
                data: STUB_JPEG.to_vec(),
            })
        })
    }
}

/// One recorded hand-off
#[derive(Debug, Clone)]
pub struct RecordedCapture {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub satellites: u32,
    pub latitude: f64,
    pub longitude: f64,
}

/// Sink that records hand-offs for assertions instead of touching disk
#[derive(Clone, Default)]
pub struct CollectingSink {
    records: Arc<Mutex<Vec<RecordedCapture>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RecordedCapture> {
        self.records.lock().clone()
    }
}

impl ImageSink for CollectingSink {
    fn write(&mut self, record: &CaptureRecord<'_>) -> Result<()> {
        self.records.lock().push(RecordedCapture {
            path: record.path.to_path_buf(),
            timestamp: record.timestamp,
            satellites: record.fix.satellites,
            latitude: record.fix.latitude,
            longitude: record.fix.longitude,
        });
        Ok(())
    }
}

/// Fix source that always returns the same snapshot
pub struct StaticFixSource {
    fix: Mutex<GpsFix>,
}

impl StaticFixSource {
    pub fn new(fix: GpsFix) -> Self {
        Self {
            fix: Mutex::new(fix),
        }
    }

    /// A source that never has a fix
    pub fn no_fix() -> Self {
        Self::new(GpsFix::no_fix())
    }

    pub fn set(&self, fix: GpsFix) {
        *self.fix.lock() = fix;
    }
}

impl FixSource for StaticFixSource {
    fn current_fix(&self) -> GpsFix {
        self.fix.lock().clone()
    }
}

//! External collaborator interfaces
//!
//! The camera driver and the image writer/metadata embedder live outside
//! this crate; these are the seams the acquisition coordinator drives them
//! through. A deterministic mock camera is provided for hardware-free runs
//! and tests.

pub mod camera;
pub mod mock;
pub mod sink;

pub use camera::{CameraDevice, CaptureOutcome, ImageFrame};
pub use sink::{CaptureRecord, FsImageSink, ImageSink};

use crate::config::CaptureConfig;
use crate::error::{Error, Result};

/// Create a camera driver by name
///
/// Only the mock driver is built in; real drivers construct
/// [`crate::app::AcquisitionApp`] directly with their own
/// [`CameraDevice`] implementation.
pub fn create_camera(config: &CaptureConfig, mock: bool) -> Result<Box<dyn CameraDevice>> {
    if mock {
        let interval = std::time::Duration::from_secs_f64(1.0 / config.fps.max(0.001));
        // Simulated exposure at half the frame budget
        Ok(Box::new(mock::MockCamera::with_latency(interval / 2)))
    } else {
        Err(Error::DeviceUnavailable(
            "no camera driver linked; run with --mock or construct AcquisitionApp with a driver"
                .to_string(),
        ))
    }
}

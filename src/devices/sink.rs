//! Image writer hand-off interface

use crate::devices::camera::ImageFrame;
use crate::error::Result;
use crate::gps::GpsFix;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// Everything the writer/metadata embedder needs for one capture
#[derive(Debug)]
pub struct CaptureRecord<'a> {
    pub frame: &'a ImageFrame,
    /// Fix or fallback geotag; satellites 0 marks synthesized coordinates
    pub fix: &'a GpsFix,
    /// Corrected UTC timestamp of the capture
    pub timestamp: DateTime<Utc>,
    /// Sequenced path inside the date partition
    pub path: &'a Path,
}

/// Writer/metadata-embedder seam
pub trait ImageSink: Send {
    /// Persist one capture; an error skips the record but never stops the
    /// capture loop
    fn write(&mut self, record: &CaptureRecord<'_>) -> Result<()>;
}

/// Plain filesystem sink: writes the encoded frame to the sequenced path
///
/// EXIF/metadata embedding is the external embedder's job; this sink only
/// lands the bytes in the right partition.
pub struct FsImageSink;

impl ImageSink for FsImageSink {
    fn write(&mut self, record: &CaptureRecord<'_>) -> Result<()> {
        if let Some(parent) = record.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(record.path, &record.frame.data)?;
        log::debug!(
            "Wrote {} ({} bytes, {} satellites)",
            record.path.display(),
            record.frame.data.len(),
            record.fix.satellites
        );
        Ok(())
    }
}

//! Collision-free, sortable capture paths
//!
//! Filename grammar: `{prefix}_{YYYYMMDD}-{HHMMSS}-{mmm}_{NNNNN}.jpg`, laid
//! out under a `{base}/{YYYYMMDD}/` date partition. The partition scheme is
//! shared with the log rotator so image and log partitions always align for
//! the same calendar date, and lexicographic order on both directory and
//! file names is chronological order.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Date partition directory for a corrected timestamp
pub fn partition_dir(base: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    base.join(timestamp.format("%Y%m%d").to_string())
}

/// Render one image filename for an exact millisecond bucket and counter
pub fn image_filename(prefix: &str, timestamp: DateTime<Utc>, counter: u32) -> String {
    format!(
        "{}_{}_{:05}.jpg",
        prefix,
        timestamp.format("%Y%m%d-%H%M%S-%3f"),
        counter
    )
}

/// Per-bucket sequence state: the counter resets to 1 whenever the
/// millisecond bucket changes and increments on every request within the
/// same bucket, so two captures landing in the same millisecond get
/// distinct, ordered names.
pub struct FilenameSequencer {
    base: PathBuf,
    prefix: String,
    bucket: Option<i64>,
    counter: u32,
}

impl FilenameSequencer {
    pub fn new<P: Into<PathBuf>>(base: P, prefix: &str) -> Self {
        Self {
            base: base.into(),
            prefix: prefix.to_string(),
            bucket: None,
            counter: 0,
        }
    }

    /// Derive the next collision-free path for a corrected timestamp
    ///
    /// Called once per accepted capture; skipped iterations must not call
    /// this, so no sequence number is burned on an unused path.
    pub fn next_path(&mut self, timestamp: DateTime<Utc>) -> PathBuf {
        let bucket = timestamp.timestamp_millis();
        if self.bucket == Some(bucket) {
            self.counter += 1;
        } else {
            self.bucket = Some(bucket);
            self.counter = 1;
        }

        partition_dir(&self.base, timestamp)
            .join(image_filename(&self.prefix, timestamp, self.counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_reference_filename() {
        let t = ts("2025-11-05T17:43:00.082Z");
        assert_eq!(
            image_filename("bathyimgtest", t, 123),
            "bathyimgtest_20251105-174300-082_00123.jpg"
        );
    }

    #[test]
    fn test_partition_matches_calendar_date() {
        let t = ts("2025-11-05T17:43:00.082Z");
        assert_eq!(
            partition_dir(Path::new("/media/usb"), t),
            PathBuf::from("/media/usb/20251105")
        );
    }

    #[test]
    fn test_counter_increments_within_bucket() {
        let mut seq = FilenameSequencer::new("/media/usb", "bathyimg");
        let t = ts("2025-11-05T17:43:00.082Z");

        let first = seq.next_path(t);
        let second = seq.next_path(t);
        let third = seq.next_path(t);

        assert!(first.to_string_lossy().ends_with("_00001.jpg"));
        assert!(second.to_string_lossy().ends_with("_00002.jpg"));
        assert!(third.to_string_lossy().ends_with("_00003.jpg"));
        // Same-bucket paths sort in capture order
        assert!(first < second && second < third);
    }

    #[test]
    fn test_counter_resets_on_bucket_change() {
        let mut seq = FilenameSequencer::new("/media/usb", "bathyimg");

        seq.next_path(ts("2025-11-05T17:43:00.082Z"));
        seq.next_path(ts("2025-11-05T17:43:00.082Z"));
        let next_ms = seq.next_path(ts("2025-11-05T17:43:00.083Z"));

        assert!(next_ms.to_string_lossy().ends_with("-083_00001.jpg"));
    }

    #[test]
    fn test_paths_sort_chronologically_across_days() {
        let mut seq = FilenameSequencer::new("/media/usb", "bathyimg");

        let evening = seq.next_path(ts("2025-11-05T23:59:59.999Z"));
        let morning = seq.next_path(ts("2025-11-06T00:00:00.000Z"));

        assert!(evening < morning);
        assert!(morning.to_string_lossy().contains("/20251106/"));
    }

    #[test]
    fn test_utc_midnight_rolls_partition() {
        let t = ts("2025-12-31T23:59:59.000Z");
        let next = ts("2026-01-01T00:00:00.000Z");
        assert_eq!(
            partition_dir(Path::new("/m"), t),
            PathBuf::from("/m/20251231")
        );
        assert_eq!(
            partition_dir(Path::new("/m"), next),
            PathBuf::from("/m/20260101")
        );
    }

    #[test]
    fn test_bucket_is_exact_millisecond() {
        let mut seq = FilenameSequencer::new("/m", "p");
        // Same second, different millisecond: separate buckets
        let a = seq.next_path(Utc.with_ymd_and_hms(2025, 11, 5, 17, 43, 0).unwrap());
        let b = seq.next_path(
            Utc.with_ymd_and_hms(2025, 11, 5, 17, 43, 0).unwrap() + chrono::Duration::milliseconds(1),
        );
        assert!(a.to_string_lossy().ends_with("-000_00001.jpg"));
        assert!(b.to_string_lossy().ends_with("-001_00001.jpg"));
    }
}

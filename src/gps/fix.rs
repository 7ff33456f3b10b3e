//! GPS fix snapshot types
//!
//! A [`GpsFix`] is always published as a whole value; readers never observe a
//! partially updated fix. When `quality` is [`FixQuality::NoFix`] the position
//! fields are not trustworthy and callers must use [`GpsFix::fallback`]
//! instead of consuming them.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Receiver-reported confidence level of a position solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixQuality {
    NoFix,
    Fix2D,
    Fix3D,
}

impl FixQuality {
    /// True for any quality that permits consuming the position fields
    pub fn is_valid(self) -> bool {
        self != FixQuality::NoFix
    }
}

/// Complete position/time snapshot from the GPS receiver
#[derive(Debug, Clone)]
pub struct GpsFix {
    /// Latitude in decimal degrees, north positive
    pub latitude: f64,
    /// Longitude in decimal degrees, east positive
    pub longitude: f64,
    /// Altitude above mean sea level in meters
    pub altitude: f64,
    /// Speed over ground in knots
    pub speed_knots: f64,
    /// Course over ground in degrees true
    pub course_deg: f64,
    /// Satellites used in the solution
    pub satellites: u32,
    /// Solution quality
    pub quality: FixQuality,
    /// UTC instant reported by the receiver, when a full date+time was
    /// available this reporting cycle
    pub fix_timestamp: Option<DateTime<Utc>>,
    /// Monotonic instant this snapshot was published
    pub received_at: Instant,
}

impl GpsFix {
    /// The designated "no fix yet" value
    pub fn no_fix() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed_knots: 0.0,
            course_deg: 0.0,
            satellites: 0,
            quality: FixQuality::NoFix,
            fix_timestamp: None,
            received_at: Instant::now(),
        }
    }

    /// Fallback geotag used when capture proceeds without a valid fix
    ///
    /// The satellites field of 0 marks the (0.0, 0.0) coordinates as
    /// synthesized rather than measured.
    pub fn fallback() -> Self {
        Self::no_fix()
    }
}

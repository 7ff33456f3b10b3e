//! NMEA 0183 sentence assembly and parsing
//!
//! Sentence format: `$TTSSS,field,field,...*HH\r\n` where `HH` is the
//! hex-encoded XOR of every character between `$` and `*`.
//!
//! This module provides:
//! - [`SentenceReader`]: buffered line assembler over a [`Transport`] that
//!   validates checksums and drops malformed traffic without failing the
//!   stream
//! - [`parse_sentence`]: field parsing for the consumed sentence types
//!   (GGA, RMC, VTG, GSA); any other type is skipped

use crate::error::{Error, Result};
use crate::transport::Transport;
use chrono::{NaiveDate, NaiveTime};

/// NMEA sentences never exceed 82 characters; anything longer without a
/// terminator is garbage and gets discarded wholesale.
const MAX_BUFFER_SIZE: usize = 1024;

/// Parsed fields from the consumed sentence types
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    /// Global positioning fix data: time-of-day, position, quality, satellites
    Gga(GgaData),
    /// Recommended minimum data: time, date, position, speed, course
    Rmc(RmcData),
    /// Course and speed over ground
    Vtg(VtgData),
    /// Solution mode detail: 2D/3D discrimination
    Gsa(GsaData),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgaData {
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Receiver quality code: 0 = no fix, 1 = GPS, 2 = DGPS, ...
    pub quality_code: u8,
    pub satellites: u32,
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmcData {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    /// True when the receiver flags the data active (status `A`)
    pub valid: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed_knots: Option<f64>,
    pub course_deg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VtgData {
    pub course_deg: Option<f64>,
    pub speed_knots: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GsaData {
    /// Solution mode: 1 = none, 2 = 2D, 3 = 3D
    pub fix_mode: u8,
}

/// Buffered sentence assembler over a byte transport
///
/// Reads whatever the transport has, scans for line terminators, and returns
/// one checksum-valid sentence body per call. A corrupt line is dropped and
/// surfaced as [`Error::ChecksumMismatch`] so the caller can count it; the
/// stream itself is never considered failed.
pub struct SentenceReader {
    buffer: Vec<u8>,
}

impl SentenceReader {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Read and extract the next complete sentence body (without `$` and
    /// checksum), e.g. `GPGGA,123519,...`
    ///
    /// Returns `Ok(None)` when no complete sentence is buffered yet.
    pub fn read_sentence(&mut self, transport: &mut dyn Transport) -> Result<Option<String>> {
        let mut temp_buf = [0u8; 256];
        match transport.read(&mut temp_buf) {
            Ok(0) => {}
            Ok(n) => self.buffer.extend_from_slice(&temp_buf[..n]),
            Err(e) => return Err(e),
        }

        self.try_extract_sentence()
    }

    fn try_extract_sentence(&mut self) -> Result<Option<String>> {
        let Some(nl) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > MAX_BUFFER_SIZE {
                self.buffer.clear();
            }
            return Ok(None);
        };

        let line: Vec<u8> = self.buffer.drain(..=nl).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();

        if line.is_empty() {
            return Ok(None);
        }

        validate_sentence(line).map(Some)
    }
}

impl Default for SentenceReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate framing and checksum, returning the sentence body
fn validate_sentence(line: &str) -> Result<String> {
    let Some(rest) = line.strip_prefix('$') else {
        return Err(Error::InvalidSentence(format!("missing '$': {line}")));
    };

    let Some((body, checksum_hex)) = rest.rsplit_once('*') else {
        return Err(Error::InvalidSentence(format!("missing '*': {line}")));
    };

    let expected = u8::from_str_radix(checksum_hex.trim(), 16)
        .map_err(|_| Error::InvalidSentence(format!("bad checksum field: {line}")))?;

    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);

    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(body.to_string())
}

/// Parse a validated sentence body into one of the consumed types
///
/// Returns `None` for sentence types this system does not use. The talker ID
/// (GP, GN, GL, ...) is ignored; only the sentence type matters.
pub fn parse_sentence(body: &str) -> Option<Sentence> {
    let fields: Vec<&str> = body.split(',').collect();
    let tag = fields.first()?;
    if tag.len() < 5 {
        return None;
    }

    match &tag[tag.len() - 3..] {
        "GGA" => Some(Sentence::Gga(parse_gga(&fields))),
        "RMC" => Some(Sentence::Rmc(parse_rmc(&fields))),
        "VTG" => Some(Sentence::Vtg(parse_vtg(&fields))),
        "GSA" => Some(Sentence::Gsa(parse_gsa(&fields))),
        _ => None,
    }
}

fn parse_gga(fields: &[&str]) -> GgaData {
    GgaData {
        time: field(fields, 1).and_then(parse_hms),
        latitude: parse_coordinate(field(fields, 2), field(fields, 3)),
        longitude: parse_coordinate(field(fields, 4), field(fields, 5)),
        quality_code: field(fields, 6).and_then(|f| f.parse().ok()).unwrap_or(0),
        satellites: field(fields, 7).and_then(|f| f.parse().ok()).unwrap_or(0),
        altitude: field(fields, 9).and_then(|f| f.parse().ok()),
    }
}

fn parse_rmc(fields: &[&str]) -> RmcData {
    RmcData {
        time: field(fields, 1).and_then(parse_hms),
        valid: field(fields, 2) == Some("A"),
        latitude: parse_coordinate(field(fields, 3), field(fields, 4)),
        longitude: parse_coordinate(field(fields, 5), field(fields, 6)),
        speed_knots: field(fields, 7).and_then(|f| f.parse().ok()),
        course_deg: field(fields, 8).and_then(|f| f.parse().ok()),
        date: field(fields, 9).and_then(parse_dmy),
    }
}

fn parse_vtg(fields: &[&str]) -> VtgData {
    VtgData {
        course_deg: field(fields, 1).and_then(|f| f.parse().ok()),
        speed_knots: field(fields, 5).and_then(|f| f.parse().ok()),
    }
}

fn parse_gsa(fields: &[&str]) -> GsaData {
    GsaData {
        fix_mode: field(fields, 2).and_then(|f| f.parse().ok()).unwrap_or(1),
    }
}

/// Non-empty field accessor
fn field<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    fields.get(idx).copied().filter(|f| !f.is_empty())
}

/// Convert NMEA `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed
/// decimal degrees
fn parse_coordinate(value: Option<&str>, hemisphere: Option<&str>) -> Option<f64> {
    let value = value?;
    let hemisphere = hemisphere?;

    let dot = value.find('.').unwrap_or(value.len());
    if dot < 3 {
        return None;
    }
    let deg_len = dot - 2;

    let degrees: f64 = value[..deg_len].parse().ok()?;
    let minutes: f64 = value[deg_len..].parse().ok()?;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Parse NMEA `hhmmss` or `hhmmss.sss` time-of-day
fn parse_hms(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 {
        return None;
    }
    let h: u32 = value[0..2].parse().ok()?;
    let m: u32 = value[2..4].parse().ok()?;
    let s: f64 = value[4..].parse().ok()?;
    let milli = (s.fract() * 1000.0).round() as u32;
    NaiveTime::from_hms_milli_opt(h, m, s.trunc() as u32, milli)
}

/// Parse NMEA `ddmmyy` date
fn parse_dmy(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let d: u32 = value[0..2].parse().ok()?;
    let m: u32 = value[2..4].parse().ok()?;
    let y: i32 = value[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,174300.082,A,4807.038,N,01131.000,E,5.2,84.4,051125,,*37";

    #[test]
    fn test_checksum_valid() {
        let body = validate_sentence(GGA).unwrap();
        assert!(body.starts_with("GPGGA,"));
    }

    #[test]
    fn test_checksum_mismatch_dropped() {
        let corrupted = GGA.replace("4807.038", "4807.039");
        match validate_sentence(&corrupted) {
            Err(Error::ChecksumMismatch { expected, .. }) => assert_eq!(expected, 0x47),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_gga_example() {
        let body = validate_sentence(GGA).unwrap();
        let Some(Sentence::Gga(gga)) = parse_sentence(&body) else {
            panic!("expected GGA");
        };
        assert!((gga.latitude.unwrap() - 48.1173).abs() < 1e-4);
        assert!((gga.longitude.unwrap() - 11.516667).abs() < 1e-4);
        assert_eq!(gga.quality_code, 1);
        assert_eq!(gga.satellites, 8);
        assert!((gga.altitude.unwrap() - 545.4).abs() < 1e-6);
        assert_eq!(gga.time.unwrap(), NaiveTime::from_hms_opt(12, 35, 19).unwrap());
    }

    #[test]
    fn test_parse_rmc_example() {
        let body = validate_sentence(RMC).unwrap();
        let Some(Sentence::Rmc(rmc)) = parse_sentence(&body) else {
            panic!("expected RMC");
        };
        assert!(rmc.valid);
        assert_eq!(rmc.date.unwrap(), NaiveDate::from_ymd_opt(2025, 11, 5).unwrap());
        assert!((rmc.speed_knots.unwrap() - 5.2).abs() < 1e-6);
        assert!((rmc.course_deg.unwrap() - 84.4).abs() < 1e-6);
    }

    #[test]
    fn test_southern_western_hemispheres() {
        assert!(parse_coordinate(Some("4807.038"), Some("S")).unwrap() < 0.0);
        assert!(parse_coordinate(Some("01131.000"), Some("W")).unwrap() < 0.0);
    }

    #[test]
    fn test_unconsumed_sentence_type_skipped() {
        assert_eq!(parse_sentence("GPGSV,3,1,11,03,03,111,00"), None);
    }

    #[test]
    fn test_reader_assembles_split_sentences() {
        let mut transport = MockTransport::new();
        let mut reader = SentenceReader::new();

        // First half only: no complete sentence yet
        transport.inject_read(&GGA.as_bytes()[..20]);
        assert!(reader.read_sentence(&mut transport).unwrap().is_none());

        // Remainder plus terminator completes it
        transport.inject_read(&GGA.as_bytes()[20..]);
        transport.inject_read(b"\r\n");
        let body = reader.read_sentence(&mut transport).unwrap().unwrap();
        assert!(body.starts_with("GPGGA,"));
    }

    #[test]
    fn test_reader_recovers_after_garbage() {
        let mut transport = MockTransport::new();
        let mut reader = SentenceReader::new();

        transport.inject_read(b"\x00\xffnoise\r\n");
        transport.inject_sentence(GGA);

        // Garbage line is an error, not a stream failure
        assert!(reader.read_sentence(&mut transport).is_err());
        let body = reader.read_sentence(&mut transport).unwrap().unwrap();
        assert!(body.starts_with("GPGGA,"));
    }

    #[test]
    fn test_parse_hms_millis() {
        let t = parse_hms("174300.082").unwrap();
        assert_eq!(t, NaiveTime::from_hms_milli_opt(17, 43, 0, 82).unwrap());
    }
}

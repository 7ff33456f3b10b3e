//! Configuration for the BathyImg daemon
//!
//! Loads configuration from a TOML file. Every value has a default so a
//! partial file (or none at all) still yields a runnable configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub timebase: TimeBaseConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GPS receiver serial settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpsConfig {
    /// GPS receiver serial port
    #[serde(default = "default_gps_port")]
    pub port: String,

    /// Baud rate (NMEA receivers commonly run 4800 or 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Seconds without a valid sentence before the fix demotes to NoFix
    #[serde(default = "default_stale_fix_timeout_secs")]
    pub stale_fix_timeout_secs: u64,

    /// Consecutive invalid/failed reads before the fix demotes to NoFix
    #[serde(default = "default_max_invalid_reads")]
    pub max_invalid_reads: u32,
}

/// Clock resynchronization policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeBaseConfig {
    /// Minimum satellites a fix needs before its time is trusted for resync
    #[serde(default = "default_resync_min_satellites")]
    pub resync_min_satellites: u32,

    /// Offset change below this threshold is ignored (marginal-fix jitter)
    #[serde(default = "default_resync_jitter_ms")]
    pub resync_jitter_ms: u64,

    /// Offset change above this threshold is rejected as corrupt GPS time
    #[serde(default = "default_resync_max_jump_secs")]
    pub resync_max_jump_secs: u64,

    /// Minimum seconds between accepted resyncs
    #[serde(default = "default_resync_min_interval_secs")]
    pub resync_min_interval_secs: u64,
}

/// Capture loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Capture rate in frames per second
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Skip iterations that have no valid GPS fix instead of tagging
    /// fallback coordinates
    #[serde(default = "default_require_fix")]
    pub require_fix: bool,

    /// Use per-bucket sequence counters in filenames
    #[serde(default = "default_use_sequence_counter")]
    pub use_sequence_counter: bool,

    /// Filename prefix for captured images
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

/// Removable storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Mount path of the removable storage medium
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Free-space floor in bytes; writes are denied below this
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,

    /// Cleanup frees space until floor + margin is available
    #[serde(default = "default_cleanup_margin_bytes")]
    pub cleanup_margin_bytes: u64,

    /// Date partitions older than this many days are removed by cleanup
    #[serde(default = "default_days_to_keep")]
    pub days_to_keep: u32,

    /// Milliseconds a health-check result stays cached in gate_write
    #[serde(default = "default_gate_cache_ms")]
    pub gate_cache_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output (stdout, stderr, or file path)
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_gps_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    4800
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_stale_fix_timeout_secs() -> u64 {
    10
}
fn default_max_invalid_reads() -> u32 {
    10
}
fn default_resync_min_satellites() -> u32 {
    4
}
fn default_resync_jitter_ms() -> u64 {
    500
}
fn default_resync_max_jump_secs() -> u64 {
    86_400
}
fn default_resync_min_interval_secs() -> u64 {
    300
}
fn default_fps() -> f64 {
    1.0
}
fn default_require_fix() -> bool {
    false
}
fn default_use_sequence_counter() -> bool {
    true
}
fn default_filename_prefix() -> String {
    "bathyimg".to_string()
}
fn default_mount_path() -> String {
    "/media/usb".to_string()
}
fn default_min_free_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_cleanup_margin_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_days_to_keep() -> u32 {
    30
}
fn default_gate_cache_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_output() -> String {
    "stdout".to_string()
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            port: default_gps_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            stale_fix_timeout_secs: default_stale_fix_timeout_secs(),
            max_invalid_reads: default_max_invalid_reads(),
        }
    }
}

impl Default for TimeBaseConfig {
    fn default() -> Self {
        Self {
            resync_min_satellites: default_resync_min_satellites(),
            resync_jitter_ms: default_resync_jitter_ms(),
            resync_max_jump_secs: default_resync_max_jump_secs(),
            resync_min_interval_secs: default_resync_min_interval_secs(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            require_fix: default_require_fix(),
            use_sequence_counter: default_use_sequence_counter(),
            filename_prefix: default_filename_prefix(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_path: default_mount_path(),
            min_free_bytes: default_min_free_bytes(),
            cleanup_margin_bytes: default_cleanup_margin_bytes(),
            days_to_keep: default_days_to_keep(),
            gate_cache_ms: default_gate_cache_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gps: GpsConfig::default(),
            timebase: TimeBaseConfig::default(),
            capture: CaptureConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.gps.port, "/dev/ttyUSB0");
        assert_eq!(config.gps.baud_rate, 4800);
        assert_eq!(config.capture.fps, 1.0);
        assert_eq!(config.capture.filename_prefix, "bathyimg");
        assert_eq!(config.storage.mount_path, "/media/usb");
        assert_eq!(config.timebase.resync_min_interval_secs, 300);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[gps]"));
        assert!(toml_string.contains("[timebase]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("baud_rate = 4800"));
        assert!(toml_string.contains("port = \"/dev/ttyUSB0\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[gps]
port = "/dev/ttyS1"
baud_rate = 9600

[capture]
fps = 4.0
require_fix = true
filename_prefix = "surveycam"

[storage]
mount_path = "/mnt/sdcard"
min_free_bytes = 1048576
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.gps.port, "/dev/ttyS1");
        assert_eq!(config.gps.baud_rate, 9600);
        assert_eq!(config.capture.fps, 4.0);
        assert!(config.capture.require_fix);
        assert_eq!(config.capture.filename_prefix, "surveycam");
        assert_eq!(config.storage.mount_path, "/mnt/sdcard");
        assert_eq!(config.storage.min_free_bytes, 1_048_576);
        // Unspecified sections fall back to defaults
        assert_eq!(config.gps.stale_fix_timeout_secs, 10);
        assert_eq!(config.timebase.resync_min_satellites, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.capture.fps, AppConfig::default().capture.fps);
        assert!(config.capture.use_sequence_counter);
        assert!(!config.capture.require_fix);
    }
}

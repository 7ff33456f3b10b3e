//! Removable-storage health gating and cleanup
//!
//! Every write is gated on mount presence, writability, and a free-space
//! floor. Checks are cached for a short interval so a fast capture rate does
//! not hammer the filesystem with probes. When space runs low the monitor
//! deletes the oldest date partitions first (`YYYYMMDD` names sort
//! chronologically) until the floor plus a safety margin clears, never
//! touching the current day's partition. A denied write is a reported
//! health state, never a reason to stop acquiring.

use crate::config::StorageConfig;
use crate::error::Result;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::Disks;

/// Probe-file name used for the writability test
const PROBE_FILE: &str = ".bathyimg.probe";

/// Result of a health check
#[derive(Debug, Clone)]
pub struct StorageState {
    pub is_available: bool,
    pub free_bytes: u64,
    pub last_checked_at: Instant,
    /// Human-readable reason when unavailable
    pub reason: Option<String>,
}

/// Gate decision for one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteGate {
    Allowed,
    /// Mount missing or not writable
    DeniedUnavailable,
    /// Free space below the configured floor even after cleanup
    DeniedLowSpace,
}

impl WriteGate {
    pub fn is_allowed(&self) -> bool {
        *self == WriteGate::Allowed
    }
}

/// Storage health monitor and date-partition janitor
pub struct StorageHealthMonitor {
    config: StorageConfig,
    disks: Disks,
    cached: Option<StorageState>,
    gate_open: bool,
    /// Test hook: overrides the disk free-space probe
    free_probe: Option<Box<dyn Fn() -> u64 + Send>>,
}

impl StorageHealthMonitor {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            disks: Disks::new_with_refreshed_list(),
            cached: None,
            gate_open: true,
            free_probe: None,
        }
    }

    /// Replace the free-space probe (tests only)
    #[cfg(test)]
    pub(crate) fn with_free_probe(mut self, probe: Box<dyn Fn() -> u64 + Send>) -> Self {
        self.free_probe = Some(probe);
        self
    }

    /// Verify the mount path exists, accepts a test write, and report free
    /// space; the result is cached for `gate_cache_ms`
    pub fn check(&mut self) -> StorageState {
        let mount = PathBuf::from(&self.config.mount_path);

        let state = if !mount.is_dir() {
            StorageState {
                is_available: false,
                free_bytes: 0,
                last_checked_at: Instant::now(),
                reason: Some(format!("mount path {} missing", mount.display())),
            }
        } else if let Err(e) = self.probe_write(&mount) {
            StorageState {
                is_available: false,
                free_bytes: 0,
                last_checked_at: Instant::now(),
                reason: Some(format!("not writable: {}", e)),
            }
        } else {
            StorageState {
                is_available: true,
                free_bytes: self.free_bytes(&mount),
                last_checked_at: Instant::now(),
                reason: None,
            }
        };

        self.cached = Some(state.clone());
        state
    }

    /// Allow or deny one write, using the cached check when fresh
    ///
    /// A low-space condition triggers cleanup once and re-checks before
    /// denying. Gate transitions are logged; steady-state denials are not.
    pub fn gate_write(&mut self, today: NaiveDate) -> WriteGate {
        let cache_ttl = Duration::from_millis(self.config.gate_cache_ms);
        let fresh = self
            .cached
            .as_ref()
            .filter(|s| s.last_checked_at.elapsed() < cache_ttl)
            .cloned();
        let state = match fresh {
            Some(state) => state,
            None => self.check(),
        };

        let gate = if !state.is_available {
            WriteGate::DeniedUnavailable
        } else if state.free_bytes < self.config.min_free_bytes {
            // Try to free space before giving up on this iteration
            if let Err(e) = self.run_cleanup(today) {
                log::error!("Partition cleanup failed: {}", e);
            }
            let state = self.check();
            if state.is_available && state.free_bytes >= self.config.min_free_bytes {
                WriteGate::Allowed
            } else {
                WriteGate::DeniedLowSpace
            }
        } else {
            WriteGate::Allowed
        };

        match (&gate, self.gate_open) {
            (WriteGate::Allowed, false) => {
                log::info!("Storage recovered, resuming writes");
                self.gate_open = true;
            }
            (WriteGate::DeniedUnavailable, true) | (WriteGate::DeniedLowSpace, true) => {
                let state = self.cached.as_ref();
                log::warn!(
                    "Storage write denied: {}",
                    state
                        .and_then(|s| s.reason.clone())
                        .unwrap_or_else(|| format!(
                            "free space below floor ({} bytes)",
                            self.config.min_free_bytes
                        ))
                );
                self.gate_open = false;
            }
            _ => {}
        }

        gate
    }

    /// Delete the oldest date partitions until retention holds and free
    /// space clears the floor by the safety margin
    ///
    /// The current day's partition is never deleted. Returns the number of
    /// partitions removed.
    pub fn run_cleanup(&mut self, today: NaiveDate) -> Result<usize> {
        let mount = PathBuf::from(&self.config.mount_path);
        if !mount.is_dir() {
            return Ok(0);
        }

        let mut partitions = list_partitions(&mount)?;
        partitions.sort();

        let today_name = today.format("%Y%m%d").to_string();
        let cutoff_name = (today - chrono::Duration::days(self.config.days_to_keep as i64))
            .format("%Y%m%d")
            .to_string();
        let space_target = self.config.min_free_bytes + self.config.cleanup_margin_bytes;

        let mut removed = 0;
        for name in partitions {
            if name == today_name {
                continue;
            }

            let expired = name < cutoff_name;
            let low_space = self.free_bytes(&mount) < space_target;
            if !expired && !low_space {
                break;
            }

            let dir = mount.join(&name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    log::info!(
                        "Removed date partition {} ({})",
                        dir.display(),
                        if expired { "retention" } else { "low space" }
                    );
                    removed += 1;
                }
                Err(e) => {
                    log::error!("Failed to remove partition {}: {}", dir.display(), e);
                }
            }
        }

        if removed > 0 {
            log::info!("Cleanup removed {} partition(s)", removed);
        }
        // Force a fresh check after deleting
        self.cached = None;
        Ok(removed)
    }

    fn probe_write(&self, mount: &Path) -> std::io::Result<()> {
        let probe = mount.join(PROBE_FILE);
        fs::write(&probe, b"probe")?;
        fs::remove_file(&probe)?;
        Ok(())
    }

    fn free_bytes(&mut self, mount: &Path) -> u64 {
        if let Some(probe) = &self.free_probe {
            return probe();
        }

        self.disks.refresh();
        let mount = mount.canonicalize().unwrap_or_else(|_| mount.to_path_buf());

        // Longest mount-point prefix wins, so /media/usb matches its own
        // filesystem rather than /
        self.disks
            .iter()
            .filter(|d| mount.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .unwrap_or_else(|| {
                log::debug!(
                    "No disk found for {}, treating free space as unconstrained",
                    mount.display()
                );
                u64::MAX
            })
    }
}

/// Date-partition directory names (exactly eight ASCII digits) under the
/// mount root
fn list_partitions(mount: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(mount)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() == 8 && name.bytes().all(|b| b.is_ascii_digit()) {
            names.push(name);
        }
    }
    Ok(names)
}

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

pub const DEFAULT_THRESHOLD_MIB: u64 = 500;
pub const DEFAULT_RETENTION_MONTHS: u32 = 12;
pub const DEFAULT_SWEEP_SECS: u64 = 24 * 60 * 60;

/// Archive and retention settings, read from `settings.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Rotate the active container once its payload reaches this many MiB.
    pub archive_threshold_mib: u64,
    /// Delete archives at least this many calendar months old.
    pub retention_months: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            archive_threshold_mib: DEFAULT_THRESHOLD_MIB,
            retention_months: DEFAULT_RETENTION_MONTHS,
            sweep_interval_secs: DEFAULT_SWEEP_SECS,
        }
    }
}

impl RetentionPolicy {
    pub fn threshold_bytes(&self) -> u64 {
        self.archive_threshold_mib.saturating_mul(1024 * 1024)
    }

    /// Load settings; a missing file falls back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let p = Self::default();
                warn!(
                    path = %path.display(),
                    threshold_mib = p.archive_threshold_mib,
                    retention_months = p.retention_months,
                    "no retention settings, using defaults"
                );
                Ok(p)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = RetentionPolicy::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(p, RetentionPolicy::default());
        assert_eq!(p.threshold_bytes(), 500 * 1024 * 1024);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, br#"{"retention_months": 1}"#).unwrap();
        let p = RetentionPolicy::load(&path).unwrap();
        assert_eq!(p.retention_months, 1);
        assert_eq!(p.archive_threshold_mib, DEFAULT_THRESHOLD_MIB);
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use lapse_core::error::{LapseError, Result};
use lapse_core::{Layout, ProfileRef, Resolution};
use serde::{Deserialize, Serialize};

fn default_fps() -> u32 {
    10
}

/// One capture profile from `profiles.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// `WIDTHxHEIGHT`
    pub resolution: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    pub interval_secs: u64,
    /// JPEG the camera pipeline keeps refreshing; each tick appends its
    /// current contents.
    pub snapshot: PathBuf,
}

impl Profile {
    pub fn profile_ref(&self) -> ProfileRef {
        ProfileRef::new(self.id.clone(), self.name.clone())
    }

    pub fn resolution(&self) -> Result<Resolution> {
        self.resolution.parse()
    }
}

/// Read and validate the profile list. Every profile needs a usable id, a
/// parseable resolution and a non-zero interval; ids must be unique.
pub fn load_profiles(path: &Path, layout: &Layout) -> Result<Vec<Profile>> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            LapseError::NotFound(format!("profile list {}", path.display()))
        }
        _ => e.into(),
    })?;
    let profiles: Vec<Profile> = serde_json::from_slice(&bytes)?;
    for (i, p) in profiles.iter().enumerate() {
        layout.profile_dir(&p.id)?;
        p.resolution()?;
        if p.interval_secs == 0 {
            return Err(LapseError::InvalidInput(format!(
                "profile {}: interval_secs must be positive",
                p.id
            )));
        }
        if profiles[..i].iter().any(|q| q.id == p.id) {
            return Err(LapseError::InvalidInput(format!("duplicate profile id {}", p.id)));
        }
    }
    Ok(profiles)
}

use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;

use crate::error::LapseError;

/// `WIDTHxHEIGHT`, e.g. `1920x1080`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Resolution {
    type Err = LapseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LapseError::InvalidInput(format!("bad resolution {s:?}, want WIDTHxHEIGHT"));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(bad)?;
        let width: u32 = w.trim().parse().map_err(|_| bad())?;
        let height: u32 = h.trim().parse().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The bits of a capture profile the recorder needs.
#[derive(Clone, Debug)]
pub struct ProfileRef {
    pub id: String,
    /// Display name; archive files are named after it.
    pub name: String,
}

impl ProfileRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One captured image to append.
#[derive(Clone, Debug)]
pub struct Capture<'a> {
    pub profile: &'a ProfileRef,
    /// Encoded JPEG bytes.
    pub payload: &'a [u8],
    pub resolution: Resolution,
    pub fps: u32,
    pub timestamp: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    /// 1-based number of the frame just written.
    pub frame: u32,
    /// Cumulative unpadded payload bytes in the active container.
    pub size: u64,
    /// Set when this append crossed the size threshold and rotated the container.
    pub archived: Option<String>,
}

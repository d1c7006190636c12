#![forbid(unsafe_code)]

pub mod domain;
pub mod error;
pub mod layout;
pub mod policy;

pub mod util {
    pub mod le;
    pub mod locks;
    pub mod sanitize;
}

pub mod container {
    pub mod idx;
    pub mod movi;
    pub mod riff;
}

pub mod store;

pub mod record {
    pub mod reconcile;
    pub mod writer;
}

pub mod read {
    pub mod archived;
    pub mod frame;
}

/// Rotation of full containers into dated archive files, and their expiry.
pub mod archive {
    pub mod manager;
    pub mod retention;
}

pub mod repo;
pub mod repo_factory;
pub mod repo_fs;

// Re-exports: stable API surface
pub use domain::{AppendOutcome, Capture, ProfileRef, Resolution};
pub use error::{LapseError, Result};
pub use layout::Layout;
pub use policy::RetentionPolicy;
pub use read::archived::ArchivedVideo;
pub use repo::{OpenParams, TimelapseRepo};
pub use repo_factory::{Backend, open_repo};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "lapsectl: inspect and maintain timelapse recordings", long_about = None)]
pub struct Cli {
    /// Data root holding profile directories, archives and settings.json
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Override the auto-archive threshold from settings.json (MiB)
    #[arg(long, global = true)]
    pub threshold_mib: Option<u64>,

    /// Override the archive retention period from settings.json (months)
    #[arg(long, global = true)]
    pub retention_months: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// List catalogued archives, oldest first
    List,
    /// Delete an archive and its catalog entry
    Delete { file: String },
    /// Check that a merged archive is self-consistent
    Verify { file: String },
    /// Write one frame of an archive to a file or stdout
    Frame {
        file: String,
        n: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete archives older than the retention period
    Sweep {
        /// Unix seconds to treat as now (defaults to the current time)
        #[arg(long)]
        at: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Append a JPEG file as the next frame of a profile's recording
    Append {
        profile: String,
        image: PathBuf,
        /// Frame geometry, WIDTHxHEIGHT
        #[arg(long)]
        resolution: String,
        #[arg(long, default_value_t = 10)]
        fps: u32,
        /// Display name used for archive file names (defaults to the id)
        #[arg(long)]
        name: Option<String>,
        /// Capture time in unix seconds (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Write frame N (1-based) of the active recording to a file or stdout
    Frame {
        profile: String,
        n: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Write the active recording as a playable AVI
    Export {
        profile: String,
        out: PathBuf,
        /// Playback rate, clamped to 1..=60 (defaults to the stored rate)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Rotate the active recording into the archive directory now
    Archive {
        profile: String,
        #[arg(long)]
        name: Option<String>,
    },

    #[command(subcommand)]
    /// Archive catalog commands
    Archives(ArchiveCommands),

    /// Change the playback rate of the active recording
    Fps { profile: String, fps: u32 },

    /// Show recording counters for every profile
    Recordings,

    /// Empty a profile's active recording
    Clear { profile: String },

    /// Delete a profile's directory and counters
    Rm { profile: String },

    /// Repair index and counters from the container
    Check { profile: String },
}

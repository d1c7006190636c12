pub mod handlers;

use crate::presentation::cli::{ArchiveCommands, Cli, Commands};
use clap::Parser;
use lapse_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let repo = handlers::repo_from_args(cli.root, cli.threshold_mib, cli.retention_months)?;
    let repo = repo.as_ref();
    match cli.command {
        Commands::Append {
            profile,
            image,
            resolution,
            fps,
            name,
            at,
        } => handlers::handle_append(repo, profile, image, resolution, fps, name, at),
        Commands::Frame { profile, n, out } => handlers::handle_frame(repo, profile, n, out),
        Commands::Export { profile, out, fps } => handlers::handle_export(repo, profile, out, fps),
        Commands::Archive { profile, name } => handlers::handle_archive(repo, profile, name),
        Commands::Archives(cmd) => match cmd {
            ArchiveCommands::List => handlers::handle_archives_list(repo),
            ArchiveCommands::Delete { file } => handlers::handle_archives_delete(repo, file),
            ArchiveCommands::Verify { file } => handlers::handle_archives_verify(repo, file),
            ArchiveCommands::Frame { file, n, out } => {
                handlers::handle_archives_frame(repo, file, n, out)
            }
            ArchiveCommands::Sweep { at } => handlers::handle_archives_sweep(repo, at),
        },
        Commands::Fps { profile, fps } => handlers::handle_fps(repo, profile, fps),
        Commands::Recordings => handlers::handle_recordings(repo),
        Commands::Clear { profile } => handlers::handle_clear(repo, profile),
        Commands::Rm { profile } => handlers::handle_rm(repo, profile),
        Commands::Check { profile } => handlers::handle_check(repo, profile),
    }
}

mod profiles;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lapse_core::error::Result;
use lapse_core::{Backend, Layout, OpenParams, open_repo};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "lapsed: timelapse capture service", long_about = None)]
struct Args {
    /// Data root holding recordings, archives and settings.json
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Capture profiles (defaults to <root>/profiles.json)
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Capture each profile and sweep retention once, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let layout = Layout::new(&args.root);
    let profiles_path = args
        .profiles
        .unwrap_or_else(|| args.root.join("profiles.json"));
    let profiles = profiles::load_profiles(&profiles_path, &layout)?;
    let repo: Arc<dyn lapse_core::TimelapseRepo> =
        Arc::from(open_repo(Backend::Fs, OpenParams::new(args.root))?);
    info!(profiles = profiles.len(), "lapsed starting");

    if args.once {
        scheduler::reconcile_all(repo.clone(), &profiles).await;
        let now = time::OffsetDateTime::now_utc();
        for p in &profiles {
            if let Err(e) = scheduler::capture_once(repo.as_ref(), p, now) {
                warn!(profile = %p.id, error = %e, "capture failed");
            }
        }
        repo.check_retention(now)?;
        return Ok(());
    }

    scheduler::run(repo, profiles, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c, stopping");
        }
    })
    .await;
    Ok(())
}

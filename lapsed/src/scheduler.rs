use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use lapse_core::error::Result;
use lapse_core::{AppendOutcome, Capture, TimelapseRepo};
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::profiles::Profile;

/// Append the profile's current snapshot. A missing or empty snapshot skips
/// the capture and returns `Ok(None)`.
pub fn capture_once(
    repo: &dyn TimelapseRepo,
    profile: &Profile,
    now: OffsetDateTime,
) -> Result<Option<AppendOutcome>> {
    let payload = match std::fs::read(&profile.snapshot) {
        Ok(b) if !b.is_empty() => b,
        Ok(_) => {
            warn!(profile = %profile.id, "snapshot is empty, capture skipped");
            return Ok(None);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                profile = %profile.id,
                snapshot = %profile.snapshot.display(),
                "no snapshot, capture skipped"
            );
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let p = profile.profile_ref();
    let cap = Capture {
        profile: &p,
        payload: &payload,
        resolution: profile.resolution()?,
        fps: profile.fps,
        timestamp: now,
    };
    let out = repo.append_frame(&cap)?;
    debug!(profile = %profile.id, frame = out.frame, size = out.size, "captured");
    if let Some(file) = &out.archived {
        info!(profile = %profile.id, file = %file, "recording rotated");
    }
    Ok(Some(out))
}

/// Repair every profile's recording before capturing into it.
pub async fn reconcile_all(repo: Arc<dyn TimelapseRepo>, profiles: &[Profile]) {
    for p in profiles {
        let repo = repo.clone();
        let id = p.id.clone();
        let res = tokio::task::spawn_blocking(move || repo.reconcile(&id)).await;
        match res {
            Ok(Ok(report)) => debug!(profile = %p.id, ?report, "startup check"),
            Ok(Err(e)) => error!(profile = %p.id, error = %e, "startup check failed"),
            Err(e) => error!(profile = %p.id, error = %e, "startup check panicked"),
        }
    }
}

async fn capture_loop(repo: Arc<dyn TimelapseRepo>, profile: Profile) {
    let mut ticker = interval(Duration::from_secs(profile.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let repo = repo.clone();
        let p = profile.clone();
        let res = tokio::task::spawn_blocking(move || {
            capture_once(repo.as_ref(), &p, OffsetDateTime::now_utc())
        })
        .await;
        match res {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(profile = %profile.id, error = %e, "capture failed"),
            Err(e) => error!(profile = %profile.id, error = %e, "capture task panicked"),
        }
    }
}

async fn retention_loop(repo: Arc<dyn TimelapseRepo>) {
    let every = Duration::from_secs(repo.policy().sweep_interval_secs.max(1));
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let repo = repo.clone();
        let res =
            tokio::task::spawn_blocking(move || repo.check_retention(OffsetDateTime::now_utc()))
                .await;
        match res {
            Ok(Ok(removed)) if !removed.is_empty() => {
                info!(removed = removed.len(), "expired archives deleted")
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "retention sweep failed"),
            Err(e) => error!(error = %e, "retention task panicked"),
        }
    }
}

/// Run capture timers for every profile plus the retention sweep until
/// `shutdown` resolves. Ticks missed while a capture runs long are dropped.
pub async fn run(
    repo: Arc<dyn TimelapseRepo>,
    profiles: Vec<Profile>,
    shutdown: impl Future<Output = ()>,
) {
    reconcile_all(repo.clone(), &profiles).await;

    let mut tasks = JoinSet::new();
    for p in profiles {
        info!(profile = %p.id, every_secs = p.interval_secs, "capture timer started");
        tasks.spawn(capture_loop(repo.clone(), p));
    }
    tasks.spawn(retention_loop(repo));

    shutdown.await;
    info!("shutting down");
    tasks.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapse_core::{Backend, OpenParams, RetentionPolicy, open_repo};
    use std::path::Path;

    fn repo(root: &Path) -> Arc<dyn TimelapseRepo> {
        let repo = open_repo(
            Backend::Fs,
            OpenParams {
                root: root.to_path_buf(),
                policy: Some(RetentionPolicy::default()),
            },
        )
        .unwrap();
        Arc::from(repo)
    }

    fn profile(dir: &Path) -> Profile {
        Profile {
            id: "cam1".into(),
            name: "Cam 1".into(),
            resolution: "320x240".into(),
            fps: 10,
            interval_secs: 3600,
            snapshot: dir.join("snap.jpg"),
        }
    }

    #[test]
    fn missing_snapshot_skips_capture() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let p = profile(dir.path());
        assert!(
            capture_once(repo.as_ref(), &p, OffsetDateTime::UNIX_EPOCH)
                .unwrap()
                .is_none()
        );
        std::fs::write(&p.snapshot, b"").unwrap();
        assert!(
            capture_once(repo.as_ref(), &p, OffsetDateTime::UNIX_EPOCH)
                .unwrap()
                .is_none()
        );
        assert!(repo.recording("cam1").unwrap().is_none());
    }

    #[test]
    fn snapshot_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let p = profile(dir.path());
        std::fs::write(&p.snapshot, b"jpeg bytes").unwrap();
        let out = capture_once(repo.as_ref(), &p, OffsetDateTime::UNIX_EPOCH)
            .unwrap()
            .unwrap();
        assert_eq!(out.frame, 1);
        assert_eq!(repo.read_frame("cam1", 1).unwrap(), b"jpeg bytes");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn first_tick_captures_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let p = profile(dir.path());
        std::fs::write(&p.snapshot, b"frame").unwrap();

        run(repo.clone(), vec![p], async {
            tokio::time::sleep(Duration::from_millis(300)).await;
        })
        .await;

        let rec = repo.recording("cam1").unwrap().unwrap();
        assert_eq!(rec.images, 1);
    }
}

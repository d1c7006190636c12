use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use lapse_core::error::{LapseError, Result};
use lapse_core::{
    ArchivedVideo, Backend, Capture, OpenParams, ProfileRef, Resolution, RetentionPolicy,
    TimelapseRepo, open_repo,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

pub fn repo_from_args(
    root: PathBuf,
    threshold_mib: Option<u64>,
    retention_months: Option<u32>,
) -> Result<Box<dyn TimelapseRepo>> {
    let policy = if threshold_mib.is_some() || retention_months.is_some() {
        let mut p = RetentionPolicy::load(&root.join(lapse_core::layout::SETTINGS_FILE))?;
        if let Some(t) = threshold_mib {
            p.archive_threshold_mib = t;
        }
        if let Some(m) = retention_months {
            p.retention_months = m;
        }
        Some(p)
    } else {
        None
    };
    open_repo(Backend::Fs, OpenParams { root, policy })
}

fn timestamp(at: Option<i64>) -> Result<OffsetDateTime> {
    match at {
        Some(secs) => OffsetDateTime::from_unix_timestamp(secs)
            .map_err(|e| LapseError::InvalidInput(format!("timestamp {secs}: {e}"))),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

fn show_time(secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| secs.to_string())
}

fn write_out(out: Option<PathBuf>, bytes: &[u8]) -> Result<()> {
    match out {
        Some(path) => std::fs::write(path, bytes)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn handle_append(
    repo: &dyn TimelapseRepo,
    profile: String,
    image: PathBuf,
    resolution: String,
    fps: u32,
    name: Option<String>,
    at: Option<i64>,
) -> Result<()> {
    let resolution: Resolution = resolution.parse()?;
    let payload = std::fs::read(&image)?;
    let name = name.unwrap_or_else(|| profile.clone());
    let p = ProfileRef::new(profile, name);
    let cap = Capture {
        profile: &p,
        payload: &payload,
        resolution,
        fps,
        timestamp: timestamp(at)?,
    };
    let out = repo.append_frame(&cap)?;
    println!("frame {} appended, {} bytes recorded", out.frame, out.size);
    if let Some(file) = out.archived {
        println!("threshold reached, archived as {file}");
    }
    Ok(())
}

pub fn handle_frame(
    repo: &dyn TimelapseRepo,
    profile: String,
    n: u32,
    out: Option<PathBuf>,
) -> Result<()> {
    let bytes = repo.read_frame(&profile, n)?;
    write_out(out, &bytes)
}

pub fn handle_export(
    repo: &dyn TimelapseRepo,
    profile: String,
    out: PathBuf,
    fps: Option<u32>,
) -> Result<()> {
    let fps = match fps {
        Some(f) => f,
        None => repo
            .recording(&profile)?
            .map(|r| r.fps)
            .filter(|f| *f > 0)
            .unwrap_or(lapse_core::container::riff::DEFAULT_FPS),
    };
    let mut w = BufWriter::new(File::create(&out)?);
    let n = repo.export(&profile, fps, &mut w)?;
    w.flush()?;
    info!(profile = %profile, out = %out.display(), bytes = n, "exported");
    println!("{n} bytes written to {}", out.display());
    Ok(())
}

pub fn handle_archive(
    repo: &dyn TimelapseRepo,
    profile: String,
    name: Option<String>,
) -> Result<()> {
    let name = name.unwrap_or_else(|| profile.clone());
    let e = repo.archive(&ProfileRef::new(profile, name), OffsetDateTime::now_utc())?;
    println!("{} ({} frames, {} bytes)", e.file, e.images, e.size);
    Ok(())
}

pub fn handle_archives_list(repo: &dyn TimelapseRepo) -> Result<()> {
    for e in repo.list_archives()? {
        println!(
            "{:<40} {:<12} frames={:<7} bytes={:<11} fps={:<3} archived={}",
            e.file,
            e.profile,
            e.images,
            e.size,
            e.fps,
            show_time(e.archived)
        );
    }
    Ok(())
}

pub fn handle_archives_delete(repo: &dyn TimelapseRepo, file: String) -> Result<()> {
    repo.delete_archive(&file)?;
    eprintln!("deleted {file}");
    Ok(())
}

pub fn handle_archives_verify(repo: &dyn TimelapseRepo, file: String) -> Result<()> {
    let v = ArchivedVideo::open(&repo.archive_path(&file)?)?;
    let s = v.verify()?;
    println!(
        "verify: OK ({} frames, {} payload bytes, riff size {})",
        s.frames, s.payload_bytes, s.riff_size
    );
    Ok(())
}

pub fn handle_archives_frame(
    repo: &dyn TimelapseRepo,
    file: String,
    n: u32,
    out: Option<PathBuf>,
) -> Result<()> {
    let v = ArchivedVideo::open(&repo.archive_path(&file)?)?;
    write_out(out, &v.read_frame(n)?)
}

pub fn handle_archives_sweep(repo: &dyn TimelapseRepo, at: Option<i64>) -> Result<()> {
    let removed = repo.check_retention(timestamp(at)?)?;
    for e in &removed {
        println!("expired {}", e.file);
    }
    eprintln!("{} archive(s) removed", removed.len());
    Ok(())
}

pub fn handle_fps(repo: &dyn TimelapseRepo, profile: String, fps: u32) -> Result<()> {
    if repo.update_fps(&profile, fps)? {
        println!("{profile}: playback rate updated");
    } else {
        println!("{profile}: unchanged");
    }
    Ok(())
}

pub fn handle_recordings(repo: &dyn TimelapseRepo) -> Result<()> {
    for (id, r) in repo.recordings()? {
        let span = if r.images > 0 {
            format!("{} .. {}", show_time(r.first), show_time(r.last))
        } else {
            "-".to_string()
        };
        println!(
            "{:<12} frames={:<7} bytes={:<11} fps={:<3} {span}",
            id, r.images, r.size, r.fps
        );
    }
    Ok(())
}

pub fn handle_clear(repo: &dyn TimelapseRepo, profile: String) -> Result<()> {
    repo.clear(&profile)?;
    eprintln!("cleared {profile}");
    Ok(())
}

pub fn handle_rm(repo: &dyn TimelapseRepo, profile: String) -> Result<()> {
    repo.remove(&profile)?;
    eprintln!("removed {profile}");
    Ok(())
}

pub fn handle_check(repo: &dyn TimelapseRepo, profile: String) -> Result<()> {
    let r = repo.reconcile(&profile)?;
    if r.is_clean() {
        println!("{profile}: OK ({} frames, {} bytes)", r.frames, r.size);
    } else {
        println!(
            "{profile}: repaired ({} frames, {} bytes; trimmed {} bytes, header repaired: {}, \
             index rebuilt: {}, counters fixed: {})",
            r.frames, r.size, r.trimmed_bytes, r.header_repaired, r.index_rebuilt, r.counters_fixed
        );
    }
    Ok(())
}

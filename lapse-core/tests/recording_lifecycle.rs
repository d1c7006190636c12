use std::fs;

use lapse_core::container::idx::FrameIndex;
use lapse_core::container::riff::RiffHeader;
use lapse_core::{
    ArchivedVideo, Backend, Capture, OpenParams, ProfileRef, Resolution, RetentionPolicy,
    TimelapseRepo, open_repo,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

fn open(root: &std::path::Path, policy: RetentionPolicy) -> Box<dyn TimelapseRepo> {
    open_repo(
        Backend::Fs,
        OpenParams {
            root: root.to_path_buf(),
            policy: Some(policy),
        },
    )
    .unwrap()
}

fn frame(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn append(
    repo: &dyn TimelapseRepo,
    p: &ProfileRef,
    payload: &[u8],
    at: OffsetDateTime,
) -> lapse_core::AppendOutcome {
    let cap = Capture {
        profile: p,
        payload,
        resolution: "1920x1080".parse::<Resolution>().unwrap(),
        fps: 10,
        timestamp: at,
    };
    repo.append_frame(&cap).unwrap()
}

#[test]
fn three_frames_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(dir.path(), RetentionPolicy::default());
    let cam = ProfileRef::new("cam1", "Cam 1");
    let t0 = datetime!(2024-03-01 7:00 UTC);

    let frames = [frame(1000, 1), frame(1500, 2), frame(999, 3)];
    for (i, f) in frames.iter().enumerate() {
        let out = append(repo.as_ref(), &cam, f, t0 + Duration::minutes(i as i64));
        assert_eq!(out.frame, i as u32 + 1);
        assert!(out.archived.is_none());
    }

    let rec = repo.recording("cam1").unwrap().unwrap();
    assert_eq!(rec.images, 3);
    assert_eq!(rec.size, 3499);
    assert_eq!(rec.fps, 10);

    let root = lapse_core::Layout::new(dir.path());
    let mut avi = fs::File::open(root.container("cam1").unwrap()).unwrap();
    let header = RiffHeader::read_at_start(&mut avi).unwrap();
    assert_eq!(header.frames, 3);
    assert_eq!((header.width, header.height), (1920, 1080));

    let offsets: Vec<u32> = FrameIndex::open_read(&root.index("cam1").unwrap())
        .unwrap()
        .entries()
        .unwrap()
        .iter()
        .map(|e| e.offset)
        .collect();
    assert_eq!(offsets, [4, 1012, 2520]);

    assert_eq!(repo.read_frame("cam1", 2).unwrap(), frames[1]);
    for (i, f) in frames.iter().enumerate() {
        assert_eq!(&repo.read_frame("cam1", i as u32 + 1).unwrap(), f);
    }
    assert!(repo.read_frame("cam1", 4).unwrap_err().is_not_found());
}

#[test]
fn crossing_threshold_archives_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(
        dir.path(),
        RetentionPolicy {
            archive_threshold_mib: 1,
            ..Default::default()
        },
    );
    let cam = ProfileRef::new("cam1", "Back Yard");
    let now = datetime!(2024-03-05 12:00 UTC);
    let big = frame(300 * 1024, 9);

    let outcomes: Vec<_> = (0..4)
        .map(|_| append(repo.as_ref(), &cam, &big, now))
        .collect();
    let archived: Vec<_> = outcomes.iter().filter_map(|o| o.archived.clone()).collect();
    assert_eq!(archived, ["Back_Yard_2024-03-05.avi"]);
    assert_eq!(outcomes[3].frame, 4);

    let rec = repo.recording("cam1").unwrap().unwrap();
    assert_eq!(rec.images, 0);
    assert_eq!(rec.size, 0);

    let listed = repo.list_archives().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].images, 4);

    let v = ArchivedVideo::open(&repo.archive_path(&archived[0]).unwrap()).unwrap();
    let summary = v.verify().unwrap();
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.riff_size as u64 + 8, v.len);
    assert_eq!(v.read_frame(4).unwrap(), big);

    // next capture starts a fresh container
    let out = append(repo.as_ref(), &cam, b"tiny", now);
    assert_eq!(out.frame, 1);
    assert_eq!(repo.read_frame("cam1", 1).unwrap(), b"tiny");
}

#[test]
fn retention_sweep_keeps_young_archives() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(
        dir.path(),
        RetentionPolicy {
            retention_months: 1,
            ..Default::default()
        },
    );
    let cam = ProfileRef::new("cam1", "Cam 1");
    let now = datetime!(2024-09-15 3:00 UTC);

    append(repo.as_ref(), &cam, &frame(64, 0), now);
    let old = repo.archive(&cam, now - Duration::days(61)).unwrap();
    append(repo.as_ref(), &cam, &frame(64, 1), now);
    let young = repo.archive(&cam, now - Duration::days(10)).unwrap();

    let removed = repo.check_retention(now).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].file, old.file);
    assert!(repo.archive_path(&old.file).unwrap_err().is_not_found());
    assert!(repo.archive_path(&young.file).unwrap().is_file());
}

#[test]
fn clear_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(dir.path(), RetentionPolicy::default());
    let cam = ProfileRef::new("cam1", "Cam 1");
    let now = datetime!(2024-09-15 3:00 UTC);

    append(repo.as_ref(), &cam, &frame(10, 0), now);
    repo.clear("cam1").unwrap();
    assert_eq!(repo.recording("cam1").unwrap().unwrap().images, 0);
    assert!(repo.read_frame("cam1", 1).unwrap_err().is_not_found());

    append(repo.as_ref(), &cam, &frame(12, 5), now);
    assert_eq!(repo.read_frame("cam1", 1).unwrap(), frame(12, 5));

    repo.remove("cam1").unwrap();
    assert!(repo.recording("cam1").unwrap().is_none());
    assert!(repo.remove("cam1").unwrap_err().is_not_found());
}

#[test]
fn empty_frame_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(dir.path(), RetentionPolicy::default());
    let cam = ProfileRef::new("cam1", "Cam 1");
    let cap = Capture {
        profile: &cam,
        payload: &[],
        resolution: Resolution {
            width: 1,
            height: 1,
        },
        fps: 10,
        timestamp: OffsetDateTime::UNIX_EPOCH,
    };
    let err = repo.append_frame(&cap).unwrap_err();
    assert!(matches!(err, lapse_core::LapseError::InvalidInput(_)));
    assert!(repo.recording("cam1").unwrap().is_none());
    assert!(!dir.path().join("cam1").exists());
}

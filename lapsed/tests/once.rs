use std::process::Command;

#[test]
fn once_captures_every_profile() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("a.jpg"), b"AAAA").unwrap();
    std::fs::write(root.join("b.jpg"), b"BBBBB").unwrap();
    let profiles = format!(
        r#"[
  {{"id":"a","name":"Cam A","resolution":"640x480","interval_secs":60,"snapshot":"{}"}},
  {{"id":"b","name":"Cam B","resolution":"640x480","fps":5,"interval_secs":60,"snapshot":"{}"}},
  {{"id":"c","name":"Cam C","resolution":"640x480","interval_secs":60,"snapshot":"{}"}}
]"#,
        root.join("a.jpg").display(),
        root.join("b.jpg").display(),
        root.join("missing.jpg").display()
    );
    std::fs::write(root.join("profiles.json"), profiles).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_lapsed"))
        .arg("--root")
        .arg(root)
        .arg("--once")
        .status()
        .unwrap();
    assert!(status.success());

    let recs: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join("recordings.json")).unwrap()).unwrap();
    assert_eq!(recs["a"]["images"], 1);
    assert_eq!(recs["a"]["size"], 4);
    assert_eq!(recs["b"]["fps"], 5);
    assert!(recs.get("c").is_none());
    assert_eq!(std::fs::read(root.join("b/timelapse.idx")).unwrap().len(), 8 + 16);
}

#[test]
fn bad_profiles_fail_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("profiles.json"), b"[{}]").unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_lapsed"))
        .arg("--root")
        .arg(dir.path())
        .arg("--once")
        .status()
        .unwrap();
    assert!(!status.success());
}

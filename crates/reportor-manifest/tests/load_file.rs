// Loading manifests from disk, the way the driver does it.

use std::io::Write;
use std::path::PathBuf;

use reportor_manifest::{Command, CopyRule, Manifest, ManifestError};

fn write_manifest(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_full_job_definition() {
    let file = write_manifest(
        r#"
sizes:
  schedule_tag: hourly
  command: [python, sizes.py, --verbose]
  working_dir: reports/sizes
  requires: [fetch]
  locks: [statusdb, graphite]
  max_time_seconds: 600
  stdout_path: sizes.json
  stderr_path: logs/sizes.log
  copy_files:
    - "out/*.txt"
    - ["flot/*.js", "static"]
fetch:
  schedule_tag: hourly
"#,
    );

    let manifest = Manifest::load(file.path(), &["hourly"]).unwrap();
    assert_eq!(manifest.len(), 2);

    let sizes = manifest.get("sizes").unwrap();
    assert_eq!(
        sizes.command,
        Some(Command::Argv(vec![
            "python".into(),
            "sizes.py".into(),
            "--verbose".into()
        ]))
    );
    assert_eq!(sizes.working_dir, PathBuf::from("reports/sizes"));
    assert!(sizes.requires.contains("fetch"));
    assert_eq!(sizes.locks.len(), 2);
    assert_eq!(sizes.max_time_seconds, 600);
    assert_eq!(sizes.stdout_path, PathBuf::from("sizes.json"));
    assert_eq!(sizes.copy_files.len(), 2);
    assert_eq!(sizes.copy_files[0], CopyRule::Pattern("out/*.txt".into()));

    let fetch = manifest.get("fetch").unwrap();
    assert!(fetch.command.is_none());
    assert_eq!(fetch.working_dir, PathBuf::from("fetch"));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Manifest::load("/nonexistent/manifest.yaml", &["hourly"]).unwrap_err();
    assert!(matches!(err, ManifestError::Io(_)));
}

#[test]
fn duplicate_lock_names_collapse() {
    let file = write_manifest("a:\n  schedule_tag: hourly\n  locks: [db, db]\n");
    let manifest = Manifest::load(file.path(), &["hourly"]).unwrap();
    assert_eq!(manifest.get("a").unwrap().locks.len(), 1);
}

//! Post-run file collection (`copy_files`).
//!
//! Copies are incremental: a file is only copied when its destination is
//! missing or has an older modification time, and the copy takes over the
//! source's mode and timestamps. Running collection twice over unchanged
//! sources therefore copies nothing the second time.

use std::fs::{self, FileTimes};
use std::io;
use std::path::Path;

use reportor_manifest::JobSpec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::glob;

/// Per-job tally of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    /// Files written to their destination.
    pub copied: usize,
    /// Files whose destination was already at least as new as the source.
    pub up_to_date: usize,
    /// Matches that could not be copied (bad destination, I/O error).
    pub skipped: usize,
}

impl CopyStats {
    fn absorb(&mut self, other: CopyStats) {
        self.copied += other.copied;
        self.up_to_date += other.up_to_date;
        self.skipped += other.skipped;
    }
}

/// Expand every `copy_files` rule of `spec` against `working_dir` and copy
/// the matches into `output_dir` (or the rule's destination).
///
/// Never fails: problems are logged and counted in [`CopyStats::skipped`].
pub fn collect_files(spec: &JobSpec, working_dir: &Path, output_dir: &Path) -> CopyStats {
    let mut stats = CopyStats::default();

    for rule in &spec.copy_files {
        let dst_dir = match rule.destination() {
            // `join` keeps absolute destinations as they are.
            Some(dst) => output_dir.join(dst),
            None => output_dir.to_path_buf(),
        };

        let matches = glob::expand(working_dir, rule.pattern());
        if matches.is_empty() {
            debug!(job = %spec.name, pattern = rule.pattern(), "copy_files pattern matched nothing");
            continue;
        }

        if !dst_dir.is_dir() {
            warn!(
                job = %spec.name,
                pattern = rule.pattern(),
                destination = %dst_dir.display(),
                "copy_files destination is not a directory; skipping"
            );
            stats.skipped += matches.len();
            continue;
        }

        for src in matches {
            let Some(file_name) = src.file_name() else {
                stats.skipped += 1;
                continue;
            };
            let dst = dst_dir.join(file_name);
            if src.is_dir() {
                stats.absorb(copy_tree(&spec.name, &src, &dst));
            } else {
                tally(&spec.name, &src, &dst, copy_if_newer(&src, &dst), &mut stats);
            }
        }
    }

    stats
}

/// Recursively mirror `src` into `dst` using the same newer-than rule per file.
fn copy_tree(job: &str, src: &Path, dst: &Path) -> CopyStats {
    let mut stats = CopyStats::default();

    if let Err(e) = fs::create_dir_all(dst) {
        warn!(%job, destination = %dst.display(), "cannot create directory: {e}");
        stats.skipped += 1;
        return stats;
    }

    let entries = match fs::read_dir(src) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(%job, source = %src.display(), "cannot read directory: {e}");
            stats.skipped += 1;
            return stats;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            stats.absorb(copy_tree(job, &from, &to));
        } else {
            tally(job, &from, &to, copy_if_newer(&from, &to), &mut stats);
        }
    }

    stats
}

fn tally(job: &str, src: &Path, dst: &Path, result: io::Result<bool>, stats: &mut CopyStats) {
    match result {
        Ok(true) => stats.copied += 1,
        Ok(false) => stats.up_to_date += 1,
        Err(e) => {
            warn!(
                %job,
                source = %src.display(),
                destination = %dst.display(),
                "copy failed: {e}"
            );
            stats.skipped += 1;
        }
    }
}

/// Copy `src` to `dst` unless `dst` exists and is at least as new.
///
/// Returns whether a copy happened. Permissions are carried over by
/// [`fs::copy`]; access and modification times are set explicitly.
pub fn copy_if_newer(src: &Path, dst: &Path) -> io::Result<bool> {
    let src_meta = fs::metadata(src)?;
    let src_modified = src_meta.modified()?;

    if let Ok(dst_meta) = fs::metadata(dst) {
        if dst_meta.modified()? >= src_modified {
            return Ok(false);
        }
    }

    info!(source = %src.display(), destination = %dst.display(), "copying");
    fs::copy(src, dst)?;

    let times = FileTimes::new()
        .set_accessed(src_meta.accessed()?)
        .set_modified(src_modified);
    fs::File::open(dst)?.set_times(times)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportor_manifest::CopyRule;
    use std::time::{Duration, SystemTime};

    fn spec_with(rules: Vec<CopyRule>) -> JobSpec {
        let mut spec = JobSpec::new("collector", "hourly");
        spec.copy_files = rules;
        spec
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn copies_matches_and_preserves_mtime() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir(work.path().join("out")).unwrap();
        fs::write(work.path().join("out/one.txt"), "one").unwrap();
        fs::write(work.path().join("out/two.txt"), "two").unwrap();
        fs::write(work.path().join("out/skip.csv"), "no").unwrap();

        let spec = spec_with(vec![CopyRule::Pattern("out/*.txt".into())]);
        let stats = collect_files(&spec, work.path(), out.path());

        assert_eq!(stats.copied, 2);
        assert_eq!(fs::read_to_string(out.path().join("one.txt")).unwrap(), "one");
        assert_eq!(fs::read_to_string(out.path().join("two.txt")).unwrap(), "two");
        assert!(!out.path().join("skip.csv").exists());

        for name in ["one.txt", "two.txt"] {
            let src = fs::metadata(work.path().join("out").join(name)).unwrap();
            let dst = fs::metadata(out.path().join(name)).unwrap();
            assert!(dst.modified().unwrap() >= src.modified().unwrap());
        }
    }

    #[test]
    fn second_pass_copies_nothing() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(work.path().join("report.html"), "<html/>").unwrap();

        let spec = spec_with(vec![CopyRule::Pattern("*.html".into())]);
        assert_eq!(collect_files(&spec, work.path(), out.path()).copied, 1);

        let again = collect_files(&spec, work.path(), out.path());
        assert_eq!(again.copied, 0);
        assert_eq!(again.up_to_date, 1);
    }

    #[test]
    fn newer_destination_is_left_alone() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let src = work.path().join("data.json");
        let dst = out.path().join("data.json");
        fs::write(&src, "source").unwrap();
        fs::write(&dst, "newer").unwrap();
        set_mtime(&src, SystemTime::now() - Duration::from_secs(3600));

        assert!(!copy_if_newer(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "newer");
    }

    #[test]
    fn older_destination_is_replaced() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let src = work.path().join("data.json");
        let dst = out.path().join("data.json");
        fs::write(&dst, "stale").unwrap();
        fs::write(&src, "fresh").unwrap();
        set_mtime(&dst, SystemTime::now() - Duration::from_secs(3600));

        assert!(copy_if_newer(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "fresh");
    }

    #[test]
    fn explicit_destination_relative_to_output_dir() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(work.path().join("chart.js"), "js").unwrap();
        fs::create_dir(out.path().join("static")).unwrap();

        let spec = spec_with(vec![CopyRule::To("*.js".into(), "static".into())]);
        let stats = collect_files(&spec, work.path(), out.path());
        assert_eq!(stats.copied, 1);
        assert!(out.path().join("static/chart.js").exists());
    }

    #[test]
    fn missing_destination_directory_is_skipped() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(work.path().join("a.txt"), "a").unwrap();

        let spec = spec_with(vec![CopyRule::To("*.txt".into(), "nowhere".into())]);
        let stats = collect_files(&spec, work.path(), out.path());
        assert_eq!(stats.copied, 0);
        assert_eq!(stats.skipped, 1);
        assert!(!out.path().join("nowhere").exists());
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let spec = spec_with(vec![CopyRule::Pattern("*.nothing".into())]);
        assert_eq!(
            collect_files(&spec, work.path(), out.path()),
            CopyStats::default()
        );
    }

    #[test]
    fn matched_directory_is_copied_recursively() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::create_dir_all(work.path().join("flot/plugins")).unwrap();
        fs::write(work.path().join("flot/jquery.flot.js"), "flot").unwrap();
        fs::write(work.path().join("flot/plugins/pie.js"), "pie").unwrap();

        let spec = spec_with(vec![CopyRule::Pattern("flot/".into())]);
        let stats = collect_files(&spec, work.path(), out.path());
        assert_eq!(stats.copied, 2);
        assert!(out.path().join("flot/jquery.flot.js").exists());
        assert!(out.path().join("flot/plugins/pie.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_mode_is_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let src = work.path().join("run.sh");
        fs::write(&src, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        let spec = spec_with(vec![CopyRule::Pattern("run.sh".into())]);
        collect_files(&spec, work.path(), out.path());

        let mode = fs::metadata(out.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

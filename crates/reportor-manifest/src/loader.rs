use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::{
    error::{ManifestError, Result},
    types::{JobSpec, RawJob},
};

/// The set of jobs selected for one scheduling pass, keyed by job name.
///
/// Iteration order is by name; scheduling order comes only from each job's
/// `requires` and `locks`.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    jobs: BTreeMap<String, JobSpec>,
}

impl Manifest {
    /// Read and parse the manifest at `path`. See [`Manifest::parse`].
    pub fn load<S: AsRef<str>>(path: impl AsRef<Path>, tags: &[S]) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading manifest");
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, tags)
    }

    /// Parse manifest text, validate every entry, and keep only the jobs whose
    /// `schedule_tag` is one of `tags`.
    ///
    /// Every entry is validated, including ones the tag filter drops, so a
    /// broken daily job is reported on the hourly run too.
    pub fn parse<S: AsRef<str>>(text: &str, tags: &[S]) -> Result<Self> {
        let root: Value = serde_yaml::from_str(text)?;
        let Value::Mapping(entries) = root else {
            return Err(ManifestError::NotAMapping);
        };

        let mut all = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let name = match key {
                Value::String(s) => s,
                other => {
                    return Err(ManifestError::InvalidJob {
                        name: format!("{other:?}"),
                        reason: "job names must be strings".to_string(),
                    })
                }
            };
            let raw: RawJob =
                serde_yaml::from_value(value).map_err(|e| ManifestError::InvalidJob {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let spec = raw
                .into_spec(&name)
                .map_err(|reason| ManifestError::InvalidJob {
                    name: name.clone(),
                    reason,
                })?;
            all.push(spec);
        }

        let jobs: BTreeMap<String, JobSpec> = all
            .into_iter()
            .filter(|spec| tags.iter().any(|t| t.as_ref() == spec.schedule_tag))
            .map(|spec| (spec.name.clone(), spec))
            .collect();

        if jobs.is_empty() {
            return Err(ManifestError::NoJobsSelected {
                tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
            });
        }

        let manifest = Self { jobs };
        for (name, missing) in manifest.unresolved_requirements() {
            warn!(job = %name, ?missing, "requires jobs that are not part of this run");
        }
        Ok(manifest)
    }

    /// Build a manifest directly from already validated specs.
    pub fn from_jobs(jobs: impl IntoIterator<Item = JobSpec>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|j| (j.name.clone(), j)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    /// Jobs whose `requires` name a job absent from this manifest, together
    /// with the missing names. Such jobs can never become eligible.
    pub fn unresolved_requirements(&self) -> BTreeMap<&str, Vec<&str>> {
        self.jobs
            .values()
            .filter_map(|spec| {
                let missing: Vec<&str> = spec
                    .requires
                    .iter()
                    .filter(|r| !self.jobs.contains_key(r.as_str()))
                    .map(String::as_str)
                    .collect();
                (!missing.is_empty()).then_some((spec.name.as_str(), missing))
            })
            .collect()
    }
}

impl IntoIterator for Manifest {
    type Item = JobSpec;
    type IntoIter = std::collections::btree_map::IntoValues<String, JobSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
report1:
    schedule_tag: hourly
    command: [python, report1.py]
    max_time_seconds: 10

report2:
    schedule_tag: hourly
    command: python report2.py
    requires: [report1]
    locks: [statusdb]

nightly:
    schedule_tag: daily
    command: ./nightly.sh
"#;

    #[test]
    fn filters_by_tag() {
        let m = Manifest::parse(MANIFEST, &["hourly"]).unwrap();
        assert_eq!(m.names().collect::<Vec<_>>(), vec!["report1", "report2"]);
        assert!(m.get("nightly").is_none());
    }

    #[test]
    fn multiple_tags_union() {
        let m = Manifest::parse(MANIFEST, &["hourly", "daily"]).unwrap();
        assert_eq!(m.len(), 3);
        assert!(!m.is_empty());
    }

    #[test]
    fn manifest_built_from_no_jobs_is_empty() {
        let m = Manifest::from_jobs(Vec::new());
        assert!(m.is_empty());
        assert_eq!(m.len(), 0);
    }

    #[test]
    fn no_matching_tag_fails() {
        let err = Manifest::parse(MANIFEST, &["weekly"]).unwrap_err();
        assert!(matches!(err, ManifestError::NoJobsSelected { ref tags } if tags == &["weekly"]));
    }

    #[test]
    fn missing_schedule_tag_names_the_job() {
        let err = Manifest::parse("broken:\n  command: echo hi\n", &["hourly"]).unwrap_err();
        match err {
            ManifestError::InvalidJob { name, reason } => {
                assert_eq!(name, "broken");
                assert!(reason.contains("schedule_tag"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_filtered_out_job_still_fails_the_load() {
        let text = "ok:\n  schedule_tag: hourly\nbad:\n  schedule_tag: daily\n  max_time_seconds: nope\n";
        assert!(matches!(
            Manifest::parse(text, &["hourly"]),
            Err(ManifestError::InvalidJob { .. })
        ));
    }

    #[test]
    fn non_mapping_root_fails() {
        assert!(matches!(
            Manifest::parse("- a\n- b\n", &["hourly"]),
            Err(ManifestError::NotAMapping)
        ));
        assert!(matches!(
            Manifest::parse("~\n", &["hourly"]),
            Err(ManifestError::NotAMapping)
        ));
    }

    #[test]
    fn malformed_yaml_fails() {
        assert!(matches!(
            Manifest::parse("a: [unclosed", &["hourly"]),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn unresolved_requirements_are_reported() {
        let m = Manifest::parse(MANIFEST, &["hourly"]).unwrap();
        assert!(m.unresolved_requirements().is_empty());

        let text = "a:\n  schedule_tag: hourly\n  requires: [nightly, ghost]\nnightly:\n  schedule_tag: daily\n";
        let m = Manifest::parse(text, &["hourly"]).unwrap();
        let unresolved = m.unresolved_requirements();
        assert_eq!(unresolved.get("a"), Some(&vec!["ghost", "nightly"]));
    }
}

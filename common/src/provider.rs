//! Course providers: the outside systems that supply submissions and their source text.
//!
//! Each course names its provider. The pipeline looks the provider up in a
//! [`ProviderRegistry`] and only talks to it through the [`Provider`] trait.

use crate::store::SubmissionStore;
use crate::{CourseRecord, ExerciseRecord, NewSubmission, SubmissionRecord};
use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Name of the per-exercise file listing sources the pipeline rejected.
const REJECTED_LIST: &str = ".rejected";

/// Capabilities a course provider offers to the pipeline and the review workflow.
pub trait Provider {
    /// Housekeeping run once per course at the start of every cron run,
    /// typically registering new submissions. An error aborts the whole run.
    fn cron(&self, course: &CourseRecord, store: &mut dyn SubmissionStore) -> Result<()>;

    /// The source text of a submission.
    fn get_submission_text(&self, submission: &SubmissionRecord) -> Result<String>;

    /// Whether the review workflow may offer [`Provider::reload`].
    fn supports_reload(&self) -> bool {
        false
    }

    /// Fetch an exercise's submissions again from scratch.
    fn reload(&self, exercise: &ExerciseRecord, _store: &mut dyn SubmissionStore) -> Result<()> {
        bail!("Exercise {} has a provider that cannot reload", exercise.key)
    }

    /// Called after the pipeline deleted a submission it could not tokenize,
    /// so the provider does not hand it out again.
    fn rejected(&self, _submission: &SubmissionRecord) -> Result<()> {
        Ok(())
    }
}

/// Providers by the identifier courses refer to them with.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn Provider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one with the same identifier.
    pub fn register(&mut self, name: &str, provider: Box<dyn Provider>) {
        self.providers.insert(name.to_string(), provider);
    }

    /// # Errors
    /// Returns an error if no provider is registered under `name`.
    pub fn get(&self, name: &str) -> Result<&dyn Provider> {
        self.providers
            .get(name)
            .map(|provider| &**provider)
            .ok_or_else(|| anyhow!("No provider registered as {name:?}"))
    }
}

/// Submissions stored as plain files:
/// `<root>/<course key>/<exercise key>/<student key>/<file>`.
/// A submission's source reference is its path relative to the root.
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemProvider { root: root.into() }
    }

    /// Register every file of the exercise that is neither stored nor rejected yet.
    /// Returns how many new submissions were found.
    fn scan_exercise(
        &self,
        course: &CourseRecord,
        exercise: &ExerciseRecord,
        store: &mut dyn SubmissionStore,
    ) -> Result<usize> {
        let exercise_dir = self.root.join(&course.key).join(&exercise.key);
        if !exercise_dir.is_dir() {
            return Ok(0);
        }

        let mut known: HashSet<String> = store
            .get_submissions_for_exercise(exercise.exercise_id)?
            .into_iter()
            .map(|s| s.source_ref)
            .collect();
        known.extend(read_rejected_list(&exercise_dir)?);

        let mut found = 0;
        for student_dir in sorted_entries(&exercise_dir)? {
            if !student_dir.is_dir() {
                continue;
            }
            let Some(student_key) = file_name(&student_dir) else {
                continue;
            };
            for file in sorted_entries(&student_dir)? {
                let Some(file_key) = file_name(&file).filter(|_| file.is_file()) else {
                    continue;
                };
                let source_ref = format!(
                    "{}/{}/{}/{}",
                    course.key, exercise.key, student_key, file_key
                );
                if known.contains(&source_ref) {
                    continue;
                }
                store.insert_submission(NewSubmission {
                    exercise_id: exercise.exercise_id,
                    student_key: student_key.clone(),
                    source_ref,
                })?;
                found += 1;
            }
        }
        Ok(found)
    }

    fn resolve(&self, source_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(source_ref);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("Source reference {source_ref:?} escapes the submission root");
        }
        Ok(self.root.join(relative))
    }
}

impl Provider for FilesystemProvider {
    fn cron(&self, course: &CourseRecord, store: &mut dyn SubmissionStore) -> Result<()> {
        let mut found = 0;
        for exercise in store.get_exercises_in_course(course.course_id)? {
            found += self
                .scan_exercise(course, &exercise, store)
                .with_context(|| format!("Failed to scan exercise {}", exercise.key))?;
        }
        if found > 0 {
            info!("Course {}: registered {found} new submissions", course.key);
        } else {
            debug!("Course {}: no new submissions", course.key);
        }
        Ok(())
    }

    fn get_submission_text(&self, submission: &SubmissionRecord) -> Result<String> {
        let path = self.resolve(&submission.source_ref)?;
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        // student files are not always UTF-8, e.g. Latin-1 comments
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn supports_reload(&self) -> bool {
        true
    }

    fn reload(&self, exercise: &ExerciseRecord, store: &mut dyn SubmissionStore) -> Result<()> {
        let course = store.get_course_by_id(exercise.course_id)?;
        store.clear_tokens_and_matches(exercise.exercise_id)?;
        let found = self.scan_exercise(&course, exercise, store)?;
        info!(
            "Exercise {}: reloaded, {found} new submissions",
            exercise.key
        );
        Ok(())
    }

    fn rejected(&self, submission: &SubmissionRecord) -> Result<()> {
        let path = self.resolve(&submission.source_ref)?;
        let Some(exercise_dir) = path.parent().and_then(Path::parent) else {
            warn!(
                "Submission #{} has no exercise directory to record the rejection in",
                submission.submission_id
            );
            return Ok(());
        };
        let mut list = OpenOptions::new()
            .create(true)
            .append(true)
            .open(exercise_dir.join(REJECTED_LIST))
            .context("Failed to open the rejected list")?;
        writeln!(list, "{}", submission.source_ref).context("Failed to update the rejected list")?;
        Ok(())
    }
}

fn read_rejected_list(exercise_dir: &Path) -> Result<BTreeSet<String>> {
    let path = exercise_dir.join(REJECTED_LIST);
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Directory entries sorted by name, hidden files left out.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if file_name(&path).is_some_and(|name| !name.starts_with('.')) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

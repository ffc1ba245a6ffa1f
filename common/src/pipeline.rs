//! The cron pipeline: provide, tokenize and match new submissions.
//!
//! One run walks every active course. New submissions are tokenized and matched
//! right away, submissions that cannot be tokenized are deleted once the sweep
//! is over, and a second sweep matches anything left tokenized but unmatched by
//! an earlier run. A run can end early on the time budget or when matching
//! fails; whatever is left is picked up by the next run.

use crate::lock::CronLock;
use crate::matcher::{MatchOutcome, match_submission};
use crate::provider::{Provider, ProviderRegistry};
use crate::store::SubmissionStore;
use crate::tokenizer::{TokenizeOutcome, tokenize_submission};
use crate::{CourseRecord, ExerciseRecord, PipelineSettings, SubmissionRecord};
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use std::collections::HashMap;
use std::time::Instant;

/// How a run ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Every active course was processed.
    #[default]
    Completed,
    /// Another run holds the lock, nothing was done.
    LockUnavailable,
    /// The time budget ran out.
    BudgetExhausted,
    /// Matching a submission failed.
    MatcherStopped,
}

/// What a run got done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub courses: usize,
    pub tokenized: usize,
    pub rejected: usize,
    pub matched: usize,
}

/// Run the pipeline once if the lock can be taken.
///
/// The run stops early once the budget is spent or the matcher signals a stop.
/// Submissions already rejected in the interrupted tokenize pass are still
/// deleted before returning, so the next run does not tokenize them again.
///
/// # Errors
/// Returns an error if a provider's cron hook fails, if a course names an
/// unknown provider, or if the store fails outside of matching. These abort
/// the whole run.
pub fn run_cron<L: CronLock>(
    lock: &L,
    store: &mut dyn SubmissionStore,
    providers: &ProviderRegistry,
    settings: &PipelineSettings,
) -> Result<RunReport> {
    let Some(_guard) = lock.try_acquire().context("Failed to check the cron lock")? else {
        match lock.holder() {
            Some(holder) => info!("Cannot get the cron lock, held by {holder}."),
            None => info!("Cannot get the cron lock, another process is running."),
        }
        return Ok(RunReport {
            outcome: RunOutcome::LockUnavailable,
            ..RunReport::default()
        });
    };

    Pipeline {
        store,
        providers,
        settings,
        started: Instant::now(),
        report: RunReport::default(),
    }
    .run()
}

struct Pipeline<'a> {
    store: &'a mut dyn SubmissionStore,
    providers: &'a ProviderRegistry,
    settings: &'a PipelineSettings,
    started: Instant,
    report: RunReport,
}

impl Pipeline<'_> {
    fn run(mut self) -> Result<RunReport> {
        let courses = self
            .store
            .get_active_courses()
            .context("Failed to load courses")?;
        for course in courses {
            self.report.courses += 1;
            if let Some(outcome) = self.process_course(&course)? {
                self.report.outcome = outcome;
                info!("Stopping early in course {}: {outcome:?}", course.key);
                break;
            }
        }
        Ok(self.report)
    }

    /// Returns the reason to stop the run, if any.
    fn process_course(&mut self, course: &CourseRecord) -> Result<Option<RunOutcome>> {
        let providers = self.providers;
        let provider = providers.get(&course.provider)?;
        provider
            .cron(course, &mut *self.store)
            .with_context(|| format!("Provider cron failed for course {}", course.key))?;

        let exercises: HashMap<u32, ExerciseRecord> = self
            .store
            .get_exercises_in_course(course.course_id)?
            .into_iter()
            .map(|e| (e.exercise_id, e))
            .collect();

        // tokenize and match new submissions
        let mut invalid = Vec::new();
        let mut stop = None;
        for mut submission in self.store.get_untokenized_submissions(course.course_id)? {
            let exercise = lookup(&exercises, &submission)?;
            match tokenize_submission(&mut *self.store, provider, &mut submission, exercise)? {
                TokenizeOutcome::Tokenized { .. } => self.report.tokenized += 1,
                TokenizeOutcome::Rejected(reason) => {
                    info!(
                        "Submission #{} ({}) cannot be tokenized: {reason}",
                        submission.submission_id, submission.source_ref
                    );
                    invalid.push(submission);
                    continue;
                }
            }
            stop = self.match_and_check(&submission, exercise);
            if stop.is_some() {
                break;
            }
        }

        // deleting after the sweep keeps the walk above stable
        self.delete_invalid(provider, invalid)?;
        if stop.is_some() {
            return Ok(stop);
        }

        // pick up anything an earlier run tokenized but never matched
        for submission in self.store.get_unmatched_submissions(course.course_id)? {
            let exercise = lookup(&exercises, &submission)?;
            if let Some(outcome) = self.match_and_check(&submission, exercise) {
                return Ok(Some(outcome));
            }
        }

        Ok(None)
    }

    fn match_and_check(
        &mut self,
        submission: &SubmissionRecord,
        exercise: &ExerciseRecord,
    ) -> Option<RunOutcome> {
        if match_submission(&mut *self.store, submission, exercise, self.settings)
            == MatchOutcome::Stop
        {
            return Some(RunOutcome::MatcherStopped);
        }
        self.report.matched += 1;
        match self.settings.stop_after {
            Some(budget) if self.started.elapsed() > budget => Some(RunOutcome::BudgetExhausted),
            _ => None,
        }
    }

    fn delete_invalid(
        &mut self,
        provider: &dyn Provider,
        invalid: Vec<SubmissionRecord>,
    ) -> Result<()> {
        for submission in invalid {
            self.store
                .delete_submission(submission.submission_id)
                .with_context(|| {
                    format!(
                        "Failed to delete invalid submission #{}",
                        submission.submission_id
                    )
                })?;
            self.report.rejected += 1;
            if let Err(err) = provider.rejected(&submission) {
                warn!(
                    "Provider could not record rejected submission #{}: {err:#}",
                    submission.submission_id
                );
            }
        }
        Ok(())
    }
}

fn lookup<'e>(
    exercises: &'e HashMap<u32, ExerciseRecord>,
    submission: &SubmissionRecord,
) -> Result<&'e ExerciseRecord> {
    exercises.get(&submission.exercise_id).ok_or_else(|| {
        anyhow!(
            "Submission #{} belongs to exercise #{} outside its course",
            submission.submission_id,
            submission.exercise_id
        )
    })
}

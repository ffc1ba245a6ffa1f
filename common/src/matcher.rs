//! Compare a submission against the other submissions of its exercise.

use crate::greedy_tiling;
use crate::store::SubmissionStore;
use crate::{ExerciseRecord, NewComparison, PipelineSettings, SubmissionRecord};
use anyhow::{Context, Result, bail};
use log::{debug, error};

/// Whether the caller may go on with the next submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    Stop,
}

/// Match one tokenized submission against every tokenized sibling in its exercise.
///
/// Each eligible pair gets its one comparison created or refreshed. Pairs
/// where either side has fewer tokens than the exercise's minimum are skipped.
/// `max_similarity` of the submission is written last, so a match that fails
/// halfway leaves the submission unmatched for the next run.
///
/// Returns [`MatchOutcome::Stop`] if the work could not be finished.
pub fn match_submission<S: SubmissionStore + ?Sized>(
    store: &mut S,
    submission: &SubmissionRecord,
    exercise: &ExerciseRecord,
    settings: &PipelineSettings,
) -> MatchOutcome {
    match try_match_submission(store, submission, exercise, settings) {
        Ok(max_similarity) => {
            debug!(
                "Submission #{} matched, max similarity {max_similarity:.3}",
                submission.submission_id
            );
            MatchOutcome::Matched
        }
        Err(err) => {
            error!(
                "Matching submission #{} failed: {err:#}",
                submission.submission_id
            );
            MatchOutcome::Stop
        }
    }
}

fn try_match_submission<S: SubmissionStore + ?Sized>(
    store: &mut S,
    submission: &SubmissionRecord,
    exercise: &ExerciseRecord,
    settings: &PipelineSettings,
) -> Result<f32> {
    let Some(tokens) = submission.tokens.as_deref() else {
        bail!("Submission #{} has no tokens", submission.submission_id);
    };
    let minimum = exercise.minimum_match_tokens as usize;

    if tokens.chars().count() >= minimum {
        let siblings = store
            .get_tokenized_submissions(exercise.exercise_id)
            .context("Failed to load sibling submissions")?;
        for sibling in siblings {
            if sibling.submission_id == submission.submission_id
                || (settings.exclude_same_student && sibling.student_key == submission.student_key)
                || sibling.token_count() < minimum
            {
                continue;
            }
            let Some(comparison) = compare_pair(exercise, submission, &sibling) else {
                continue;
            };
            let comparison = store.upsert_comparison(comparison).with_context(|| {
                format!(
                    "Failed to save the comparison with submission #{}",
                    sibling.submission_id
                )
            })?;

            // only raise siblings that were matched already, the rest still need a full pass
            if let Some(current) = sibling.max_similarity
                && comparison.similarity > current
            {
                store
                    .set_submission_max_similarity(sibling.submission_id, comparison.similarity)
                    .context("Failed to update sibling similarity")?;
            }
        }
    }

    let closest = store
        .get_comparisons_for_submission(submission.submission_id)
        .context("Failed to load comparisons")?
        .into_iter()
        .max_by(|x, y| x.similarity.total_cmp(&y.similarity));
    let max_similarity = closest.as_ref().map_or(0.0, |c| c.similarity);
    if let Some(sibling) = closest.and_then(|c| c.other(submission.submission_id)) {
        debug!(
            "Submission #{} is closest to #{sibling}",
            submission.submission_id
        );
    }
    store
        .set_submission_max_similarity(submission.submission_id, max_similarity)
        .context("Failed to save max similarity")?;

    Ok(max_similarity)
}

/// Tile two submissions in id order, so the same pair always gets the same score.
fn compare_pair(
    exercise: &ExerciseRecord,
    x: &SubmissionRecord,
    y: &SubmissionRecord,
) -> Option<NewComparison> {
    let (first, second) = if x.submission_id < y.submission_id {
        (x, y)
    } else {
        (y, x)
    };
    let tiling = greedy_tiling::compare(
        first.tokens.as_deref()?,
        second.tokens.as_deref()?,
        exercise.minimum_match_tokens as usize,
    );
    Some(NewComparison::new(
        exercise.exercise_id,
        first.submission_id,
        second.submission_id,
        tiling.similarity,
        tiling.matches,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenizerKind;
    use crate::memory_store::MemoryStore;

    fn setup(minimum_match_tokens: u32) -> (MemoryStore, ExerciseRecord) {
        let mut store = MemoryStore::default();
        let course_id = store.add_course("prog1", "filesystem");
        let exercise_id =
            store.add_exercise(course_id, "ex1", TokenizerKind::Text, minimum_match_tokens);
        let exercise = store.get_exercise_by_id(exercise_id).unwrap();
        (store, exercise)
    }

    fn tokenized(store: &mut MemoryStore, exercise: &ExerciseRecord, student: &str, tokens: &str) -> u64 {
        let submission_id = store.add_submission(exercise.exercise_id, student, student);
        store.set_submission_tokens(submission_id, tokens).unwrap();
        submission_id
    }

    #[test_log::test]
    fn test_pair_gets_one_comparison() {
        let (mut store, exercise) = setup(3);
        let settings = PipelineSettings::default();
        let a = tokenized(&mut store, &exercise, "alice", "abcdefgh");
        let b = tokenized(&mut store, &exercise, "bob", "abcdXYZW");

        let sub_a = store.submission(a).clone();
        assert_eq!(
            match_submission(&mut store, &sub_a, &exercise, &settings),
            MatchOutcome::Matched
        );
        let sub_b = store.submission(b).clone();
        assert_eq!(
            match_submission(&mut store, &sub_b, &exercise, &settings),
            MatchOutcome::Matched
        );

        assert_eq!(store.comparisons.len(), 1);
        let comparison = store.comparisons.values().next().unwrap().clone();
        assert_eq!((comparison.submission_a, comparison.submission_b), (a, b));
        assert!((comparison.similarity - 0.5).abs() < 1e-6);
        assert_eq!(store.submission(a).max_similarity, Some(comparison.similarity));
        assert_eq!(store.submission(b).max_similarity, Some(comparison.similarity));
    }

    #[test_log::test]
    fn test_rematching_is_stable() {
        let (mut store, exercise) = setup(2);
        let settings = PipelineSettings::default();
        let a = tokenized(&mut store, &exercise, "alice", "abcdefgh");
        tokenized(&mut store, &exercise, "bob", "xxabcdyy");

        let sub_a = store.submission(a).clone();
        match_submission(&mut store, &sub_a, &exercise, &settings);
        let first = store.comparisons.values().next().unwrap().clone();
        match_submission(&mut store, &sub_a, &exercise, &settings);

        assert_eq!(store.comparisons.len(), 1);
        assert_eq!(store.comparisons.values().next().unwrap(), &first);
    }

    #[test_log::test]
    fn test_score_does_not_depend_on_match_order() {
        let (mut store, exercise) = setup(2);
        let settings = PipelineSettings::default();
        let a = tokenized(&mut store, &exercise, "alice", "abcabcXY");
        let b = tokenized(&mut store, &exercise, "bob", "XYabcab");

        let sub_a = store.submission(a).clone();
        match_submission(&mut store, &sub_a, &exercise, &settings);
        let from_a = store.comparisons.values().next().unwrap().similarity;

        store.comparisons.clear();
        let sub_b = store.submission(b).clone();
        match_submission(&mut store, &sub_b, &exercise, &settings);
        let from_b = store.comparisons.values().next().unwrap().similarity;

        assert!((from_a - from_b).abs() < f32::EPSILON);
    }

    #[test_log::test]
    fn test_short_submissions_are_skipped() {
        let (mut store, exercise) = setup(5);
        let settings = PipelineSettings::default();
        let short = tokenized(&mut store, &exercise, "alice", "abc");
        let long = tokenized(&mut store, &exercise, "bob", "abcdefg");

        let sub_short = store.submission(short).clone();
        assert_eq!(
            match_submission(&mut store, &sub_short, &exercise, &settings),
            MatchOutcome::Matched
        );
        let sub_long = store.submission(long).clone();
        match_submission(&mut store, &sub_long, &exercise, &settings);

        assert!(store.comparisons.is_empty());
        assert_eq!(store.submission(short).max_similarity, Some(0.0));
        assert_eq!(store.submission(long).max_similarity, Some(0.0));
    }

    #[test_log::test]
    fn test_same_student_policy() {
        let (mut store, exercise) = setup(2);
        let a = tokenized(&mut store, &exercise, "alice", "abcdef");
        tokenized(&mut store, &exercise, "alice", "abcdef");
        let sub_a = store.submission(a).clone();

        match_submission(&mut store, &sub_a, &exercise, &PipelineSettings::default());
        assert!(store.comparisons.is_empty());

        let settings = PipelineSettings {
            exclude_same_student: false,
            ..PipelineSettings::default()
        };
        match_submission(&mut store, &sub_a, &exercise, &settings);
        assert_eq!(store.comparisons.len(), 1);
    }

    #[test_log::test]
    fn test_unmatched_siblings_stay_unmatched() {
        let (mut store, exercise) = setup(2);
        let settings = PipelineSettings::default();
        let a = tokenized(&mut store, &exercise, "alice", "abcdef");
        let b = tokenized(&mut store, &exercise, "bob", "abcdef");

        let sub_a = store.submission(a).clone();
        match_submission(&mut store, &sub_a, &exercise, &settings);

        assert_eq!(store.submission(a).max_similarity, Some(1.0));
        assert_eq!(store.submission(b).max_similarity, None);
    }

    #[test_log::test]
    fn test_store_failure_stops() {
        let (mut store, exercise) = setup(2);
        let settings = PipelineSettings::default();
        let a = tokenized(&mut store, &exercise, "alice", "abcdef");
        tokenized(&mut store, &exercise, "bob", "abcdef");
        store.fail_comparison_writes = true;

        let sub_a = store.submission(a).clone();
        assert_eq!(
            match_submission(&mut store, &sub_a, &exercise, &settings),
            MatchOutcome::Stop
        );
        assert_eq!(store.submission(a).max_similarity, None);
    }

    #[test_log::test]
    fn test_untokenized_submission_stops() {
        let (mut store, exercise) = setup(2);
        let a = store.add_submission(exercise.exercise_id, "alice", "alice");
        let sub_a = store.submission(a).clone();
        assert_eq!(
            match_submission(&mut store, &sub_a, &exercise, &PipelineSettings::default()),
            MatchOutcome::Stop
        );
    }
}

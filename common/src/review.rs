//! Read and write operations of the review and configuration workflows.

use crate::store::SubmissionStore;
use crate::{ComparisonRecord, MARKED_REVIEW_THRESHOLD, ReviewRating, TokenizerKind};
use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;

/// A student that appears in comparisons reviewed as suspicious or worse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspectSummary {
    pub student_key: String,
    /// Sum of the review ratings of every marked comparison the student is in.
    pub review_sum: i32,
    pub comparisons: Vec<u64>,
}

/// The most similar comparisons of an exercise.
///
/// # Errors
/// Returns an error if the store cannot be read.
pub fn top_comparisons<S: SubmissionStore + ?Sized>(
    store: &mut S,
    exercise_id: u32,
    limit: usize,
) -> Result<Vec<ComparisonRecord>> {
    let mut comparisons = store.get_comparisons_for_exercise(exercise_id)?;
    comparisons.truncate(limit);
    Ok(comparisons)
}

/// Every comparison of an exercise that involves one of the student's submissions,
/// most similar first.
///
/// # Errors
/// Returns an error if the store cannot be read.
pub fn comparisons_for_student<S: SubmissionStore + ?Sized>(
    store: &mut S,
    exercise_id: u32,
    student_key: &str,
) -> Result<Vec<ComparisonRecord>> {
    let owned: Vec<u64> = store
        .get_submissions_for_exercise(exercise_id)?
        .into_iter()
        .filter(|s| s.student_key == student_key)
        .map(|s| s.submission_id)
        .collect();
    Ok(store
        .get_comparisons_for_exercise(exercise_id)?
        .into_iter()
        .filter(|c| owned.contains(&c.submission_a) || owned.contains(&c.submission_b))
        .collect())
}

/// Set the review rating of a comparison.
/// Returns false for values that are not a [`ReviewRating`] and for unknown comparisons.
///
/// # Errors
/// Returns an error if the store cannot be written.
pub fn update_review<S: SubmissionStore + ?Sized>(
    store: &mut S,
    comparison_id: u64,
    value: i32,
) -> Result<bool> {
    let rating = match ReviewRating::try_from(value) {
        Ok(rating) => rating,
        Err(err) => {
            warn!("Rejected review for comparison #{comparison_id}: {err}");
            return Ok(false);
        }
    };
    store
        .set_comparison_review(comparison_id, rating)
        .with_context(|| format!("Failed to save review for comparison #{comparison_id}"))
}

/// Switch an exercise to another tokenizer or threshold.
///
/// Unreviewed comparisons are deleted, and tokens and matches of every
/// submission are cleared so the next run redoes the exercise with the new
/// settings.
///
/// # Errors
/// Returns an error for a zero threshold or if the store fails.
pub fn configure_exercise<S: SubmissionStore + ?Sized>(
    store: &mut S,
    exercise_id: u32,
    tokenizer: TokenizerKind,
    minimum_match_tokens: u32,
) -> Result<()> {
    if minimum_match_tokens == 0 {
        bail!("Minimum match tokens must be at least 1");
    }
    let exercise = store.get_exercise_by_id(exercise_id)?;
    store.update_exercise_settings(exercise_id, tokenizer, minimum_match_tokens)?;
    let removed = store.clean_for_exercise(exercise_id)?;
    store.clear_tokens_and_matches(exercise_id)?;
    info!(
        "Exercise {} now uses {tokenizer} with {minimum_match_tokens} tokens, {removed} unreviewed comparisons dropped",
        exercise.key
    );
    Ok(())
}

/// Students of a course involved in comparisons marked at least suspicious,
/// highest summed rating first.
///
/// # Errors
/// Returns an error if the store cannot be read or a comparison points at a
/// missing submission.
pub fn marked_students<S: SubmissionStore + ?Sized>(
    store: &mut S,
    course_id: u32,
) -> Result<Vec<SuspectSummary>> {
    let comparisons = store.get_reviewed_comparisons_for_course(course_id, MARKED_REVIEW_THRESHOLD)?;

    let mut students: HashMap<u64, String> = HashMap::new();
    let mut suspects: HashMap<String, SuspectSummary> = HashMap::new();
    for comparison in comparisons {
        for submission_id in [comparison.submission_a, comparison.submission_b] {
            if !students.contains_key(&submission_id) {
                let submission = store
                    .get_submission_by_id(submission_id)?
                    .with_context(|| format!("Comparison refers to missing submission #{submission_id}"))?;
                students.insert(submission_id, submission.student_key);
            }
            let student_key = students[&submission_id].clone();
            let suspect = suspects
                .entry(student_key.clone())
                .or_insert_with(|| SuspectSummary {
                    student_key,
                    review_sum: 0,
                    comparisons: Vec::new(),
                });
            suspect.review_sum += comparison.review.value();
            suspect.comparisons.push(comparison.comparison_id);
        }
    }

    Ok(suspects
        .into_values()
        .sorted_by(|a, b| {
            b.review_sum
                .cmp(&a.review_sum)
                .then_with(|| a.student_key.cmp(&b.student_key))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::NewComparison;

    struct Fixture {
        store: MemoryStore,
        course_id: u32,
        exercise_id: u32,
        comparisons: Vec<u64>,
    }

    /// alice-bob 0.9, alice-carol 0.5, bob-carol 0.2
    fn fixture() -> Fixture {
        let mut store = MemoryStore::default();
        let course_id = store.add_course("prog1", "filesystem");
        let exercise_id = store.add_exercise(course_id, "ex1", TokenizerKind::CLike, 5);
        let alice = store.add_submission(exercise_id, "alice", "a");
        let bob = store.add_submission(exercise_id, "bob", "b");
        let carol = store.add_submission(exercise_id, "carol", "c");
        let comparisons = [(alice, bob, 0.9), (alice, carol, 0.5), (bob, carol, 0.2)]
            .into_iter()
            .map(|(x, y, similarity)| {
                store
                    .upsert_comparison(NewComparison::new(exercise_id, x, y, similarity, Vec::new()))
                    .unwrap()
                    .comparison_id
            })
            .collect();
        Fixture {
            store,
            course_id,
            exercise_id,
            comparisons,
        }
    }

    #[test_log::test]
    fn test_top_comparisons_are_sorted_and_limited() {
        let mut f = fixture();
        let top = top_comparisons(&mut f.store, f.exercise_id, 2).unwrap();
        let scores: Vec<f32> = top.iter().map(|c| c.similarity).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[test_log::test]
    fn test_comparisons_for_student() {
        let mut f = fixture();
        let carol = comparisons_for_student(&mut f.store, f.exercise_id, "carol").unwrap();
        let scores: Vec<f32> = carol.iter().map(|c| c.similarity).collect();
        assert_eq!(scores, vec![0.5, 0.2]);
        assert!(
            comparisons_for_student(&mut f.store, f.exercise_id, "dave")
                .unwrap()
                .is_empty()
        );
    }

    #[test_log::test]
    fn test_update_review_validates() {
        let mut f = fixture();
        let id = f.comparisons[0];
        assert!(update_review(&mut f.store, id, 10).unwrap());
        assert_eq!(f.store.comparisons[&id].review, ReviewRating::Plagiarized);
        assert!(!update_review(&mut f.store, id, 7).unwrap());
        assert_eq!(f.store.comparisons[&id].review, ReviewRating::Plagiarized);
        assert!(!update_review(&mut f.store, 9999, 5).unwrap());
    }

    #[test_log::test]
    fn test_review_survives_rematching() {
        let mut f = fixture();
        let id = f.comparisons[0];
        update_review(&mut f.store, id, 5).unwrap();
        let existing = f.store.comparisons[&id].clone();
        f.store
            .upsert_comparison(NewComparison::new(
                f.exercise_id,
                existing.submission_b,
                existing.submission_a,
                0.95,
                Vec::new(),
            ))
            .unwrap();
        assert_eq!(f.store.comparisons.len(), 3);
        assert_eq!(f.store.comparisons[&id].review, ReviewRating::Suspicious);
        assert!((f.store.comparisons[&id].similarity - 0.95).abs() < f32::EPSILON);
    }

    #[test_log::test]
    fn test_marked_students() {
        let mut f = fixture();
        update_review(&mut f.store, f.comparisons[0], 10).unwrap();
        update_review(&mut f.store, f.comparisons[1], 5).unwrap();
        update_review(&mut f.store, f.comparisons[2], -10).unwrap();

        let suspects = marked_students(&mut f.store, f.course_id).unwrap();
        let summary: Vec<(&str, i32, usize)> = suspects
            .iter()
            .map(|s| (s.student_key.as_str(), s.review_sum, s.comparisons.len()))
            .collect();
        assert_eq!(summary, vec![("alice", 15, 2), ("bob", 10, 1), ("carol", 5, 1)]);
    }

    #[test_log::test]
    fn test_configure_exercise_resets_matching() {
        let mut f = fixture();
        for submission in f.store.submissions.values_mut() {
            submission.tokens = Some("abcdef".to_string());
            submission.max_similarity = Some(0.5);
        }

        configure_exercise(&mut f.store, f.exercise_id, TokenizerKind::Python, 8).unwrap();

        let exercise = f.store.get_exercise_by_id(f.exercise_id).unwrap();
        assert_eq!(exercise.tokenizer, TokenizerKind::Python);
        assert_eq!(exercise.minimum_match_tokens, 8);
        assert!(f.store.comparisons.is_empty());
        assert!(
            f.store
                .submissions
                .values()
                .all(|s| s.tokens.is_none() && s.max_similarity.is_none())
        );
    }

    #[test_log::test]
    fn test_configure_exercise_rejects_zero_threshold() {
        let mut f = fixture();
        assert!(configure_exercise(&mut f.store, f.exercise_id, TokenizerKind::Text, 0).is_err());
        let exercise = f.store.get_exercise_by_id(f.exercise_id).unwrap();
        assert_eq!(exercise.tokenizer, TokenizerKind::CLike);
        assert_eq!(f.store.comparisons.len(), 3);
    }

    #[test_log::test]
    fn test_clean_for_exercise_keeps_reviewed() {
        let mut f = fixture();
        update_review(&mut f.store, f.comparisons[0], -10).unwrap();
        let removed = f.store.clean_for_exercise(f.exercise_id).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            f.store.comparisons.keys().copied().collect::<Vec<_>>(),
            vec![f.comparisons[0]]
        );
    }
}

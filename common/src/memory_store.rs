//! An in-memory `SubmissionStore` for unit tests.

use crate::store::SubmissionStore;
use crate::{
    ComparisonRecord, CourseRecord, ExerciseRecord, NewComparison, NewSubmission, ReviewRating,
    SubmissionRecord, TokenizerKind,
};
use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub courses: BTreeMap<u32, CourseRecord>,
    pub exercises: BTreeMap<u32, ExerciseRecord>,
    pub submissions: BTreeMap<u64, SubmissionRecord>,
    pub comparisons: BTreeMap<u64, ComparisonRecord>,
    /// Make every comparison write fail, to simulate a broken database.
    pub fail_comparison_writes: bool,
    /// Number of successful writes, used to check that a run did nothing.
    pub writes: usize,
    next_id: u64,
}

impl MemoryStore {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_course(&mut self, key: &str, provider: &str) -> u32 {
        let course_id = u32::try_from(self.next_id()).unwrap();
        self.courses.insert(
            course_id,
            CourseRecord {
                course_id,
                key: key.to_string(),
                name: key.to_uppercase(),
                provider: provider.to_string(),
                archived: false,
            },
        );
        course_id
    }

    pub fn add_exercise(
        &mut self,
        course_id: u32,
        key: &str,
        tokenizer: TokenizerKind,
        minimum_match_tokens: u32,
    ) -> u32 {
        let exercise_id = u32::try_from(self.next_id()).unwrap();
        self.exercises.insert(
            exercise_id,
            ExerciseRecord {
                exercise_id,
                course_id,
                key: key.to_string(),
                name: key.to_string(),
                paused: false,
                tokenizer,
                minimum_match_tokens,
            },
        );
        exercise_id
    }

    pub fn add_submission(&mut self, exercise_id: u32, student_key: &str, source_ref: &str) -> u64 {
        self.insert_submission(NewSubmission {
            exercise_id,
            student_key: student_key.to_string(),
            source_ref: source_ref.to_string(),
        })
        .unwrap()
        .submission_id
    }

    pub fn submission(&self, submission_id: u64) -> &SubmissionRecord {
        &self.submissions[&submission_id]
    }

    fn course_submissions(&self, course_id: u32) -> impl Iterator<Item = &SubmissionRecord> {
        self.submissions.values().filter(move |s| {
            self.exercises
                .get(&s.exercise_id)
                .is_some_and(|e| e.course_id == course_id && !e.paused)
        })
    }
}

impl SubmissionStore for MemoryStore {
    fn get_active_courses(&mut self) -> Result<Vec<CourseRecord>> {
        Ok(self.courses.values().filter(|c| !c.archived).cloned().collect())
    }

    fn get_course_by_id(&mut self, course_id: u32) -> Result<CourseRecord> {
        self.courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| anyhow!("No course #{course_id}"))
    }

    fn get_exercise_by_id(&mut self, exercise_id: u32) -> Result<ExerciseRecord> {
        self.exercises
            .get(&exercise_id)
            .cloned()
            .ok_or_else(|| anyhow!("No exercise #{exercise_id}"))
    }

    fn update_exercise_settings(
        &mut self,
        exercise_id: u32,
        tokenizer: TokenizerKind,
        minimum_match_tokens: u32,
    ) -> Result<()> {
        let exercise = self
            .exercises
            .get_mut(&exercise_id)
            .ok_or_else(|| anyhow!("No exercise #{exercise_id}"))?;
        exercise.tokenizer = tokenizer;
        exercise.minimum_match_tokens = minimum_match_tokens;
        self.writes += 1;
        Ok(())
    }

    fn get_exercises_in_course(&mut self, course_id: u32) -> Result<Vec<ExerciseRecord>> {
        Ok(self
            .exercises
            .values()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect())
    }

    fn insert_submission(&mut self, new: NewSubmission) -> Result<SubmissionRecord> {
        let submission = SubmissionRecord {
            submission_id: self.next_id(),
            exercise_id: new.exercise_id,
            student_key: new.student_key,
            source_ref: new.source_ref,
            created: Utc::now(),
            tokens: None,
            max_similarity: None,
        };
        self.submissions
            .insert(submission.submission_id, submission.clone());
        self.writes += 1;
        Ok(submission)
    }

    fn get_submission_by_id(&mut self, submission_id: u64) -> Result<Option<SubmissionRecord>> {
        Ok(self.submissions.get(&submission_id).cloned())
    }

    fn get_submissions_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .submissions
            .values()
            .filter(|s| s.exercise_id == exercise_id)
            .cloned()
            .collect())
    }

    fn get_untokenized_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .course_submissions(course_id)
            .filter(|s| s.tokens.is_none())
            .cloned()
            .collect())
    }

    fn get_unmatched_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .course_submissions(course_id)
            .filter(|s| s.tokens.is_some() && s.max_similarity.is_none())
            .cloned()
            .collect())
    }

    fn get_tokenized_submissions(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .submissions
            .values()
            .filter(|s| s.exercise_id == exercise_id && s.tokens.is_some())
            .cloned()
            .collect())
    }

    fn set_submission_tokens(&mut self, submission_id: u64, tokens: &str) -> Result<()> {
        let submission = self
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| anyhow!("No submission #{submission_id}"))?;
        submission.tokens = Some(tokens.to_string());
        self.writes += 1;
        Ok(())
    }

    fn set_submission_max_similarity(&mut self, submission_id: u64, value: f32) -> Result<()> {
        let submission = self
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| anyhow!("No submission #{submission_id}"))?;
        submission.max_similarity = Some(value);
        self.writes += 1;
        Ok(())
    }

    fn delete_submission(&mut self, submission_id: u64) -> Result<()> {
        self.comparisons
            .retain(|_, c| c.submission_a != submission_id && c.submission_b != submission_id);
        self.submissions.remove(&submission_id);
        self.writes += 1;
        Ok(())
    }

    fn upsert_comparison(&mut self, new: NewComparison) -> Result<ComparisonRecord> {
        if self.fail_comparison_writes {
            bail!("comparison table is unavailable");
        }
        self.writes += 1;
        if let Some(existing) = self
            .comparisons
            .values_mut()
            .find(|c| c.submission_a == new.submission_a && c.submission_b == new.submission_b)
        {
            existing.similarity = new.similarity;
            existing.matches = new.matches;
            return Ok(existing.clone());
        }
        let comparison = ComparisonRecord {
            comparison_id: self.next_id(),
            exercise_id: new.exercise_id,
            submission_a: new.submission_a,
            submission_b: new.submission_b,
            similarity: new.similarity,
            matches: new.matches,
            review: ReviewRating::Unspecified,
        };
        self.comparisons
            .insert(comparison.comparison_id, comparison.clone());
        Ok(comparison)
    }

    fn get_comparison_by_id(&mut self, comparison_id: u64) -> Result<Option<ComparisonRecord>> {
        Ok(self.comparisons.get(&comparison_id).cloned())
    }

    fn get_comparisons_for_submission(&mut self, submission_id: u64) -> Result<Vec<ComparisonRecord>> {
        Ok(self
            .comparisons
            .values()
            .filter(|c| c.other(submission_id).is_some())
            .cloned()
            .collect())
    }

    fn get_comparisons_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<ComparisonRecord>> {
        let mut comparisons: Vec<ComparisonRecord> = self
            .comparisons
            .values()
            .filter(|c| c.exercise_id == exercise_id)
            .cloned()
            .collect();
        comparisons.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(comparisons)
    }

    fn get_reviewed_comparisons_for_course(
        &mut self,
        course_id: u32,
        min_review: i32,
    ) -> Result<Vec<ComparisonRecord>> {
        Ok(self
            .comparisons
            .values()
            .filter(|c| {
                c.review.value() >= min_review
                    && self
                        .exercises
                        .get(&c.exercise_id)
                        .is_some_and(|e| e.course_id == course_id)
            })
            .cloned()
            .collect())
    }

    fn set_comparison_review(&mut self, comparison_id: u64, review: ReviewRating) -> Result<bool> {
        match self.comparisons.get_mut(&comparison_id) {
            Some(comparison) => {
                comparison.review = review;
                self.writes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear_tokens_and_matches(&mut self, exercise_id: u32) -> Result<()> {
        self.comparisons.retain(|_, c| c.exercise_id != exercise_id);
        for submission in self
            .submissions
            .values_mut()
            .filter(|s| s.exercise_id == exercise_id)
        {
            submission.tokens = None;
            submission.max_similarity = None;
        }
        self.writes += 1;
        Ok(())
    }

    fn clean_for_exercise(&mut self, exercise_id: u32) -> Result<usize> {
        let before = self.comparisons.len();
        self.comparisons.retain(|_, c| {
            c.exercise_id != exercise_id || c.review != ReviewRating::Unspecified
        });
        for submission in self
            .submissions
            .values_mut()
            .filter(|s| s.exercise_id == exercise_id)
        {
            submission.max_similarity = None;
        }
        self.writes += 1;
        Ok(before - self.comparisons.len())
    }
}

//! The storage interface shared by the pipeline, the providers and the review workflow.

use crate::{
    ComparisonRecord, CourseRecord, ExerciseRecord, NewComparison, NewSubmission, ReviewRating,
    SubmissionRecord, TokenizerKind,
};
use anyhow::Result;

/// Everything the pipeline and the review workflow need from persistent storage.
///
/// Every write is committed on its own. A long run never holds one big
/// transaction, so readers see progress as it is made.
pub trait SubmissionStore {
    /// All courses that are not archived, ordered by id.
    fn get_active_courses(&mut self) -> Result<Vec<CourseRecord>>;

    fn get_course_by_id(&mut self, course_id: u32) -> Result<CourseRecord>;

    fn get_exercise_by_id(&mut self, exercise_id: u32) -> Result<ExerciseRecord>;

    /// Change the tokenizer and threshold of an exercise.
    fn update_exercise_settings(
        &mut self,
        exercise_id: u32,
        tokenizer: TokenizerKind,
        minimum_match_tokens: u32,
    ) -> Result<()>;

    /// All exercises of a course, ordered by id.
    fn get_exercises_in_course(&mut self, course_id: u32) -> Result<Vec<ExerciseRecord>>;

    fn insert_submission(&mut self, new: NewSubmission) -> Result<SubmissionRecord>;

    fn get_submission_by_id(&mut self, submission_id: u64) -> Result<Option<SubmissionRecord>>;

    /// All submissions of an exercise, ordered by id.
    fn get_submissions_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>>;

    /// Submissions of the course without tokens, in exercises that are not paused, ordered by id.
    fn get_untokenized_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>>;

    /// Submissions of the course with tokens but no `max_similarity`, in exercises
    /// that are not paused, ordered by id.
    fn get_unmatched_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>>;

    /// Submissions of the exercise that have tokens, ordered by id.
    fn get_tokenized_submissions(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>>;

    fn set_submission_tokens(&mut self, submission_id: u64, tokens: &str) -> Result<()>;

    fn set_submission_max_similarity(&mut self, submission_id: u64, value: f32) -> Result<()>;

    /// Delete a submission along with every comparison that references it.
    fn delete_submission(&mut self, submission_id: u64) -> Result<()>;

    /// Insert the comparison, or update the similarity and tiles of the one
    /// already stored for the pair. The review is never touched.
    fn upsert_comparison(&mut self, new: NewComparison) -> Result<ComparisonRecord>;

    fn get_comparison_by_id(&mut self, comparison_id: u64) -> Result<Option<ComparisonRecord>>;

    fn get_comparisons_for_submission(&mut self, submission_id: u64) -> Result<Vec<ComparisonRecord>>;

    /// All comparisons of an exercise, most similar first.
    fn get_comparisons_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<ComparisonRecord>>;

    /// Comparisons in the course reviewed at or above `min_review`, ordered by id.
    fn get_reviewed_comparisons_for_course(
        &mut self,
        course_id: u32,
        min_review: i32,
    ) -> Result<Vec<ComparisonRecord>>;

    /// Returns false if there is no such comparison.
    fn set_comparison_review(&mut self, comparison_id: u64, review: ReviewRating) -> Result<bool>;

    /// Unset tokens and `max_similarity` on every submission of the exercise
    /// and delete all of its comparisons.
    fn clear_tokens_and_matches(&mut self, exercise_id: u32) -> Result<()>;

    /// Delete the comparisons of the exercise that nobody reviewed and unset
    /// `max_similarity` on its submissions, so the next run matches them again.
    /// Tokens and reviewed comparisons are kept. Returns how many comparisons
    /// were deleted.
    fn clean_for_exercise(&mut self, exercise_id: u32) -> Result<usize>;
}

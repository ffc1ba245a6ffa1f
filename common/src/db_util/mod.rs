//! Interfaces between the application code and database.

use crate::lock::CronLock;
use crate::store::SubmissionStore;
use crate::{
    ComparisonRecord, CourseRecord, ExerciseRecord, NewComparison, NewSubmission, ReviewRating,
    SubmissionRecord, TokenMatch, TokenizerKind,
};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use std::env;

mod advisory_lock;
mod comparisons;
mod conversions;
mod courses;
mod exercises;
mod submissions;

pub use advisory_lock::*;
pub use comparisons::*;
pub use courses::*;
pub use exercises::*;
pub use submissions::*;

/// Read `DATABASE_URL` from the environment or a `.env` file.
///
/// # Errors
/// Returns an error if the variable is not set.
pub fn get_database_url() -> Result<String> {
    dotenvy::dotenv().ok();
    env::var("DATABASE_URL").context("DATABASE_URL must be set")
}

/// # Errors
/// Returns an error if the database cannot be reached.
pub fn get_database_connection(database_url: &str) -> Result<PgConnection> {
    PgConnection::establish(database_url)
        .map_err(|e| anyhow!("{e}"))
        .context("Error connecting to the database")
}

/// A [`SubmissionStore`] backed by Postgres.
/// Every call runs in its own implicit transaction unless noted otherwise.
pub struct PgStore {
    conn: PgConnection,
}

impl PgStore {
    #[must_use]
    pub fn new(conn: PgConnection) -> Self {
        PgStore { conn }
    }

    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub fn connect(database_url: &str) -> Result<Self> {
        get_database_connection(database_url).map(PgStore::new)
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl SubmissionStore for PgStore {
    fn get_active_courses(&mut self) -> Result<Vec<CourseRecord>> {
        get_active_courses(&mut self.conn)
    }

    fn get_course_by_id(&mut self, course_id: u32) -> Result<CourseRecord> {
        get_course_by_id(&mut self.conn, course_id)
    }

    fn get_exercise_by_id(&mut self, exercise_id: u32) -> Result<ExerciseRecord> {
        get_exercise_by_id(&mut self.conn, exercise_id)
    }

    fn update_exercise_settings(
        &mut self,
        exercise_id: u32,
        tokenizer: TokenizerKind,
        minimum_match_tokens: u32,
    ) -> Result<()> {
        update_exercise_settings(&mut self.conn, exercise_id, tokenizer, minimum_match_tokens)
    }

    fn get_exercises_in_course(&mut self, course_id: u32) -> Result<Vec<ExerciseRecord>> {
        get_exercises_in_course(&mut self.conn, course_id)
    }

    fn insert_submission(&mut self, new: NewSubmission) -> Result<SubmissionRecord> {
        insert_submission(&mut self.conn, new)
    }

    fn get_submission_by_id(&mut self, submission_id: u64) -> Result<Option<SubmissionRecord>> {
        get_submission_by_id(&mut self.conn, submission_id)
    }

    fn get_submissions_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>> {
        get_submissions_for_exercise(&mut self.conn, exercise_id)
    }

    fn get_untokenized_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>> {
        get_untokenized_submissions_for_course(&mut self.conn, course_id)
    }

    fn get_unmatched_submissions(&mut self, course_id: u32) -> Result<Vec<SubmissionRecord>> {
        get_unmatched_submissions_for_course(&mut self.conn, course_id)
    }

    fn get_tokenized_submissions(&mut self, exercise_id: u32) -> Result<Vec<SubmissionRecord>> {
        get_tokenized_submissions_for_exercise(&mut self.conn, exercise_id)
    }

    fn set_submission_tokens(&mut self, submission_id: u64, tokens: &str) -> Result<()> {
        update_submission_tokens(&mut self.conn, submission_id, tokens)
    }

    fn set_submission_max_similarity(&mut self, submission_id: u64, value: f32) -> Result<()> {
        update_submission_max_similarity(&mut self.conn, submission_id, value)
    }

    fn delete_submission(&mut self, submission_id: u64) -> Result<()> {
        delete_submission(&mut self.conn, submission_id)
    }

    fn upsert_comparison(&mut self, new: NewComparison) -> Result<ComparisonRecord> {
        upsert_comparison(&mut self.conn, new)
    }

    fn get_comparison_by_id(&mut self, comparison_id: u64) -> Result<Option<ComparisonRecord>> {
        get_comparison_by_id(&mut self.conn, comparison_id)
    }

    fn get_comparisons_for_submission(&mut self, submission_id: u64) -> Result<Vec<ComparisonRecord>> {
        get_comparisons_for_submission(&mut self.conn, submission_id)
    }

    fn get_comparisons_for_exercise(&mut self, exercise_id: u32) -> Result<Vec<ComparisonRecord>> {
        get_comparisons_for_exercise(&mut self.conn, exercise_id)
    }

    fn get_reviewed_comparisons_for_course(
        &mut self,
        course_id: u32,
        min_review: i32,
    ) -> Result<Vec<ComparisonRecord>> {
        get_reviewed_comparisons_for_course(&mut self.conn, course_id, min_review)
    }

    fn set_comparison_review(&mut self, comparison_id: u64, review: ReviewRating) -> Result<bool> {
        update_comparison_review(&mut self.conn, comparison_id, review)
    }

    fn clear_tokens_and_matches(&mut self, exercise_id: u32) -> Result<()> {
        // one transaction so readers never see half-cleared state
        self.conn.transaction(|conn| {
            delete_comparisons_for_exercise(conn, exercise_id)?;
            reset_submissions_for_exercise(conn, exercise_id)
        })
    }

    fn clean_for_exercise(&mut self, exercise_id: u32) -> Result<usize> {
        self.conn.transaction(|conn| {
            let removed = delete_unreviewed_comparisons_for_exercise(conn, exercise_id)?;
            unmatch_submissions_for_exercise(conn, exercise_id)?;
            Ok(removed)
        })
    }
}

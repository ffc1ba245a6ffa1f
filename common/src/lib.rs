//! A library with common utilities for tokenizing and matching student submissions.

#[cfg(feature = "database")]
pub mod db_util;
pub mod greedy_tiling;
pub mod lock;
pub mod matcher;
pub mod pipeline;
pub mod provider;
pub mod review;
pub mod store;
pub mod tokenizer;

#[cfg(test)]
mod memory_store;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Threshold used when an exercise is created without an explicit one.
pub const DEFAULT_MINIMUM_MATCH_TOKENS: u32 = 15;
/// Comparisons reviewed at or above this rating mark both students.
pub const MARKED_REVIEW_THRESHOLD: i32 = 5;
/// Where the cron lock file lives unless configured otherwise.
pub const DEFAULT_LOCK_FILE: &str = "/tmp/simcheck-cron.lock";
/// Key for `pg_try_advisory_lock`, shared by every cron process on the database.
pub const CRON_ADVISORY_LOCK_KEY: i64 = 0x5349_4d43_484b;

/// Each tokenizer an exercise can be configured with.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenizerKind {
    Skip,
    Text,
    CLike,
    Python,
}

impl TokenizerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TokenizerKind::Skip => "skip",
            TokenizerKind::Text => "text",
            TokenizerKind::CLike => "c-like",
            TokenizerKind::Python => "python",
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(TokenizerKind::Skip),
            "text" => Ok(TokenizerKind::Text),
            "c-like" => Ok(TokenizerKind::CLike),
            "python" => Ok(TokenizerKind::Python),
            other => Err(format!("unknown tokenizer {other:?}")),
        }
    }
}

/// A human rating on a comparison, independent of its similarity score.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ReviewRating {
    FalseAlarm,
    #[default]
    Unspecified,
    ApprovedPlagiarism,
    Suspicious,
    Plagiarized,
}

impl ReviewRating {
    #[must_use]
    pub fn value(self) -> i32 {
        match self {
            ReviewRating::FalseAlarm => -10,
            ReviewRating::Unspecified => 0,
            ReviewRating::ApprovedPlagiarism => 1,
            ReviewRating::Suspicious => 5,
            ReviewRating::Plagiarized => 10,
        }
    }
}

impl TryFrom<i32> for ReviewRating {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -10 => Ok(ReviewRating::FalseAlarm),
            0 => Ok(ReviewRating::Unspecified),
            1 => Ok(ReviewRating::ApprovedPlagiarism),
            5 => Ok(ReviewRating::Suspicious),
            10 => Ok(ReviewRating::Plagiarized),
            other => Err(format!("{other} is not a recognized review rating")),
        }
    }
}

impl From<ReviewRating> for i32 {
    fn from(rating: ReviewRating) -> i32 {
        rating.value()
    }
}

/// A course as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub course_id: u32,
    pub key: String,
    pub name: String,
    pub provider: String,
    pub archived: bool,
}

/// An exercise as stored in the database. Only the configuration workflow writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub exercise_id: u32,
    pub course_id: u32,
    pub key: String,
    pub name: String,
    pub paused: bool,
    pub tokenizer: TokenizerKind,
    pub minimum_match_tokens: u32,
}

/// A student submission.
/// `tokens` is set once tokenized, `max_similarity` once matched at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: u64,
    pub exercise_id: u32,
    pub student_key: String,
    pub source_ref: String,
    pub created: DateTime<Utc>,
    pub tokens: Option<String>,
    pub max_similarity: Option<f32>,
}

impl SubmissionRecord {
    /// Number of tokens, zero if the submission was never tokenized.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.as_deref().map_or(0, |t| t.chars().count())
    }
}

/// A submission reported by a provider that is not stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub exercise_id: u32,
    pub student_key: String,
    pub source_ref: String,
}

/// One matched run of tokens, `length` long, starting at `a_start` in
/// submission A and `b_start` in submission B.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenMatch {
    pub a_start: usize,
    pub b_start: usize,
    pub length: usize,
}

/// A stored similarity result for a pair of submissions.
/// Always stored with `submission_a < submission_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub comparison_id: u64,
    pub exercise_id: u32,
    pub submission_a: u64,
    pub submission_b: u64,
    pub similarity: f32,
    pub matches: Vec<TokenMatch>,
    pub review: ReviewRating,
}

impl ComparisonRecord {
    /// The submission on the other side of the pair, if `submission_id` is part of it.
    #[must_use]
    pub fn other(&self, submission_id: u64) -> Option<u64> {
        if self.submission_a == submission_id {
            Some(self.submission_b)
        } else if self.submission_b == submission_id {
            Some(self.submission_a)
        } else {
            None
        }
    }
}

/// A comparison to insert, or to update if the pair already has one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComparison {
    pub exercise_id: u32,
    pub submission_a: u64,
    pub submission_b: u64,
    pub similarity: f32,
    pub matches: Vec<TokenMatch>,
}

impl NewComparison {
    /// Build a comparison between `first` and `second` with tiles given in that orientation.
    /// The pair is normalized so the lower id is always `submission_a`.
    #[must_use]
    pub fn new(
        exercise_id: u32,
        first: u64,
        second: u64,
        similarity: f32,
        matches: Vec<TokenMatch>,
    ) -> Self {
        if first < second {
            NewComparison {
                exercise_id,
                submission_a: first,
                submission_b: second,
                similarity,
                matches,
            }
        } else {
            NewComparison {
                exercise_id,
                submission_a: second,
                submission_b: first,
                similarity,
                matches: matches
                    .into_iter()
                    .map(|m| TokenMatch {
                        a_start: m.b_start,
                        b_start: m.a_start,
                        length: m.length,
                    })
                    .collect(),
            }
        }
    }
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Stop the run once this much time has passed. `None` runs until done.
    pub stop_after: Option<Duration>,
    /// Never compare two submissions from the same student.
    pub exclude_same_student: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            stop_after: None,
            exclude_same_student: true,
        }
    }
}

#!/usr/bin/env rust-script
//! ```cargo
//! [dependencies]
//! simcheck_common = { path = "../common", features = ["database"] }
//! read_input = "0.8"
//! ```

use read_input::prelude::*;
use simcheck_common::db_util::{self, PgStore};
use simcheck_common::review;
use simcheck_common::store::SubmissionStore;

fn main() {
    let url = db_util::get_database_url().unwrap();
    let mut store = PgStore::connect(&url).unwrap();

    print!("Exercise id: ");
    let exercise_id = input::<u32>().get();
    let exercise = store.get_exercise_by_id(exercise_id).unwrap();
    let comparisons = review::top_comparisons(&mut store, exercise_id, 20).unwrap();

    println!("Exercise {} ({}):", exercise.key, exercise.tokenizer);
    for comparison in comparisons {
        let a = store.get_submission_by_id(comparison.submission_a).unwrap().unwrap();
        let b = store.get_submission_by_id(comparison.submission_b).unwrap().unwrap();
        println!(
            "  #{:<6} {:>5.1}%  {} vs {}  ({} tiles, review {})",
            comparison.comparison_id,
            comparison.similarity * 100.0,
            a.student_key,
            b.student_key,
            comparison.matches.len(),
            comparison.review.value()
        );
    }
}

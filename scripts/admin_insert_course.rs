#!/usr/bin/env rust-script
//! ```cargo
//! [dependencies]
//! simcheck_common = { path = "../common", features = ["database"] }
//! read_input = "0.8"
//! ```

use read_input::prelude::*;
use simcheck_common::TokenizerKind;
use simcheck_common::db_util;

fn main() {
    print!("Course key: ");
    let key = input::<String>().get();
    print!("Course name: ");
    let name = input::<String>().get();
    print!("Provider [filesystem]: ");
    let mut provider = input::<String>().get();
    if provider.is_empty() {
        provider = "filesystem".to_string();
    }

    let mut exercises = Vec::new();
    loop {
        print!("Exercise key (empty to finish): ");
        let exercise_key = input::<String>().get();
        if exercise_key.is_empty() {
            break;
        }
        print!("Tokenizer (skip, text, c-like, python): ");
        let tokenizer = input::<TokenizerKind>().get();
        print!(
            "Minimum match tokens [{}]: ",
            simcheck_common::DEFAULT_MINIMUM_MATCH_TOKENS
        );
        let minimum = input::<u32>()
            .default(simcheck_common::DEFAULT_MINIMUM_MATCH_TOKENS)
            .get();
        exercises.push((exercise_key, tokenizer, minimum));
    }

    println!();
    println!("Course {key} ({name}) via {provider}:");
    for (exercise_key, tokenizer, minimum) in &exercises {
        println!("  {exercise_key}: {tokenizer}, {minimum} tokens");
    }
    print!("Add to database? [y/N] ");
    let confirm = input::<String>().get();
    if !["y", "Y", "ye", "yes"].contains(&confirm.as_str()) {
        return;
    }

    let url = db_util::get_database_url().unwrap();
    let mut conn = db_util::get_database_connection(&url).unwrap();
    let course = db_util::insert_course(&mut conn, &key, &name, &provider).unwrap();
    for (exercise_key, tokenizer, minimum) in exercises {
        db_util::get_or_insert_exercise(&mut conn, course.course_id, &exercise_key, tokenizer, minimum)
            .unwrap();
    }
    println!("Course #{} added!", course.course_id);
}

#!/usr/bin/env rust-script
//! ```cargo
//! [dependencies]
//! simcheck_common = { path = "../common", features = ["database"] }
//! read_input = "0.8"
//! ```

use read_input::prelude::*;
use simcheck_common::db_util;

fn main() {
    let url = db_util::get_database_url().unwrap();
    let mut conn = db_util::get_database_connection(&url).unwrap();

    print!("Course or exercise? [c/e] ");
    let target = input::<String>().get();
    print!("Id: ");
    let id = input::<u32>().get();
    print!("Set flag to [true/false]: ");
    let value = input::<bool>().get();

    match target.as_str() {
        "c" => {
            let course = db_util::get_course_by_id(&mut conn, id).unwrap();
            db_util::set_course_archived(&mut conn, id, value).unwrap();
            println!("Course {} archived: {value}", course.key);
        }
        "e" => {
            let exercise = db_util::get_exercise_by_id(&mut conn, id).unwrap();
            db_util::set_exercise_paused(&mut conn, id, value).unwrap();
            println!("Exercise {} paused: {value}", exercise.key);
        }
        _ => println!("Nothing to do."),
    }
}

use super::*;

table! {
    exercises (id) {
        id -> Integer,
        course_id -> Integer,
        exercise_key -> Varchar,
        name -> Varchar,
        paused -> Bool,
        tokenizer -> Varchar,
        minimum_match_tokens -> Integer,
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = exercises)]
struct ExercisePrivate {
    id: i32,
    course_id: i32,
    exercise_key: String,
    name: String,
    paused: bool,
    tokenizer: String,
    minimum_match_tokens: i32,
}

#[derive(Insertable)]
#[diesel(table_name = exercises)]
struct ExercisePrivateNew {
    course_id: i32,
    exercise_key: String,
    name: String,
    tokenizer: String,
    minimum_match_tokens: i32,
}

fn exercise_to_public(p: ExercisePrivate) -> Result<ExerciseRecord> {
    use conversions::*;
    Ok(ExerciseRecord {
        exercise_id: i32_to_u32(p.id)?,
        course_id: i32_to_u32(p.course_id)?,
        key: p.exercise_key,
        name: p.name,
        paused: p.paused,
        tokenizer: deserialize_tokenizer(&p.tokenizer)?,
        minimum_match_tokens: i32_to_u32(p.minimum_match_tokens)?,
    })
}

fn build_exercise_row(
    course: u32,
    key: &str,
    exercise_name: &str,
    kind: TokenizerKind,
    minimum: u32,
) -> Result<ExercisePrivateNew> {
    use conversions::*;
    Ok(ExercisePrivateNew {
        course_id: u32_to_i32(course)?,
        exercise_key: key.to_string(),
        name: exercise_name.to_string(),
        tokenizer: serialize_tokenizer(kind),
        minimum_match_tokens: u32_to_i32(minimum)?,
    })
}

/// Exercises are created by the admin scripts. Provider crons only scan
/// exercises that already exist.
pub fn insert_exercise(
    conn: &mut PgConnection,
    course: u32,
    key: &str,
    exercise_name: &str,
    kind: TokenizerKind,
    minimum: u32,
) -> Result<ExerciseRecord> {
    let row = build_exercise_row(course, key, exercise_name, kind, minimum)?;
    diesel::insert_into(exercises::table)
        .values(&row)
        .get_result::<ExercisePrivate>(conn)
        .context("Failed to insert exercise")
        .and_then(exercise_to_public)
}

/// Look up an exercise by its provider key, creating it with the given
/// defaults if it does not exist yet.
pub fn get_or_insert_exercise(
    conn: &mut PgConnection,
    course: u32,
    key: &str,
    kind: TokenizerKind,
    minimum: u32,
) -> Result<ExerciseRecord> {
    use self::exercises::dsl::*;

    let course_i32 = conversions::u32_to_i32(course)?;
    let existing = exercises
        .filter(course_id.eq(course_i32))
        .filter(exercise_key.eq(key))
        .first::<ExercisePrivate>(conn)
        .optional()?;
    match existing {
        Some(row) => exercise_to_public(row),
        None => insert_exercise(conn, course, key, key, kind, minimum),
    }
}

pub fn get_exercise_by_id(conn: &mut PgConnection, row_id: u32) -> Result<ExerciseRecord> {
    use self::exercises::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    exercises
        .filter(id.eq(row_id))
        .first::<ExercisePrivate>(conn)
        .with_context(|| format!("No exercise #{row_id}"))
        .and_then(exercise_to_public)
}

pub fn get_exercises_in_course(conn: &mut PgConnection, course: u32) -> Result<Vec<ExerciseRecord>> {
    use self::exercises::dsl::*;

    let course = conversions::u32_to_i32(course)?;
    exercises
        .filter(course_id.eq(course))
        .order(id.asc())
        .load::<ExercisePrivate>(conn)?
        .into_iter()
        .map(exercise_to_public)
        .collect()
}

pub fn update_exercise_settings(
    conn: &mut PgConnection,
    row_id: u32,
    kind: TokenizerKind,
    minimum: u32,
) -> Result<()> {
    use self::exercises::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let minimum = conversions::u32_to_i32(minimum)?;
    diesel::update(exercises.filter(id.eq(row_id)))
        .set((
            tokenizer.eq(conversions::serialize_tokenizer(kind)),
            minimum_match_tokens.eq(minimum),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn set_exercise_paused(conn: &mut PgConnection, row_id: u32, value: bool) -> Result<()> {
    use self::exercises::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    diesel::update(exercises.filter(id.eq(row_id)))
        .set(paused.eq(value))
        .execute(conn)?;
    Ok(())
}

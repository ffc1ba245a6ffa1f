use super::*;

table! {
    submissions (id) {
        id -> BigInt,
        exercise_id -> Integer,
        student_key -> Varchar,
        source_ref -> Varchar,
        created -> Timestamptz,
        tokens -> Nullable<Text>,
        max_similarity -> Nullable<Float>,
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = submissions)]
struct SubmissionPrivate {
    id: i64,
    exercise_id: i32,
    student_key: String,
    source_ref: String,
    created: DateTime<Utc>,
    tokens: Option<String>,
    max_similarity: Option<f32>,
}

#[derive(Insertable)]
#[diesel(table_name = submissions)]
struct SubmissionPrivateNew {
    exercise_id: i32,
    student_key: String,
    source_ref: String,
}

fn submission_to_public(p: SubmissionPrivate) -> Result<SubmissionRecord> {
    use conversions::*;
    Ok(SubmissionRecord {
        submission_id: i64_to_u64(p.id)?,
        exercise_id: i32_to_u32(p.exercise_id)?,
        student_key: p.student_key,
        source_ref: p.source_ref,
        created: p.created,
        tokens: p.tokens,
        max_similarity: p.max_similarity,
    })
}

fn build_submission_row(new: NewSubmission) -> Result<SubmissionPrivateNew> {
    use conversions::*;
    Ok(SubmissionPrivateNew {
        exercise_id: u32_to_i32(new.exercise_id)?,
        student_key: new.student_key,
        source_ref: new.source_ref,
    })
}

fn load_submissions(items: Vec<SubmissionPrivate>) -> Result<Vec<SubmissionRecord>> {
    items.into_iter().map(submission_to_public).collect()
}

pub fn insert_submission(conn: &mut PgConnection, new: NewSubmission) -> Result<SubmissionRecord> {
    let row = build_submission_row(new)?;
    diesel::insert_into(submissions::table)
        .values(&row)
        .get_result::<SubmissionPrivate>(conn)
        .context("Failed to insert submission")
        .and_then(submission_to_public)
}

pub fn get_submission_by_id(conn: &mut PgConnection, row_id: u64) -> Result<Option<SubmissionRecord>> {
    use self::submissions::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    submissions
        .filter(id.eq(row_id))
        .first::<SubmissionPrivate>(conn)
        .optional()?
        .map(submission_to_public)
        .transpose()
}

pub fn get_submissions_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<Vec<SubmissionRecord>> {
    use self::submissions::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    load_submissions(
        submissions
            .filter(exercise_id.eq(exercise))
            .order(id.asc())
            .load(conn)?,
    )
}

pub fn get_tokenized_submissions_for_exercise(
    conn: &mut PgConnection,
    exercise: u32,
) -> Result<Vec<SubmissionRecord>> {
    use self::submissions::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    load_submissions(
        submissions
            .filter(exercise_id.eq(exercise))
            .filter(tokens.is_not_null())
            .order(id.asc())
            .load(conn)?,
    )
}

/// Submissions without tokens in the unpaused exercises of a course.
pub fn get_untokenized_submissions_for_course(
    conn: &mut PgConnection,
    course: u32,
) -> Result<Vec<SubmissionRecord>> {
    use diesel::sql_query;
    use diesel::sql_types::Integer;

    let course = conversions::u32_to_i32(course)?;
    let query = "SELECT s.* FROM submissions s
        JOIN exercises e ON e.id = s.exercise_id
        WHERE e.course_id = $1
        AND NOT e.paused
        AND s.tokens IS NULL
        ORDER BY s.id ASC;";

    load_submissions(sql_query(query).bind::<Integer, _>(course).load(conn)?)
}

/// Tokenized submissions without a max similarity in the unpaused exercises of a course.
pub fn get_unmatched_submissions_for_course(
    conn: &mut PgConnection,
    course: u32,
) -> Result<Vec<SubmissionRecord>> {
    use diesel::sql_query;
    use diesel::sql_types::Integer;

    let course = conversions::u32_to_i32(course)?;
    let query = "SELECT s.* FROM submissions s
        JOIN exercises e ON e.id = s.exercise_id
        WHERE e.course_id = $1
        AND NOT e.paused
        AND s.tokens IS NOT NULL
        AND s.max_similarity IS NULL
        ORDER BY s.id ASC;";

    load_submissions(sql_query(query).bind::<Integer, _>(course).load(conn)?)
}

pub fn update_submission_tokens(conn: &mut PgConnection, row_id: u64, value: &str) -> Result<()> {
    use self::submissions::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    diesel::update(submissions.filter(id.eq(row_id)))
        .set(tokens.eq(Some(value)))
        .execute(conn)?;
    Ok(())
}

pub fn update_submission_max_similarity(conn: &mut PgConnection, row_id: u64, value: f32) -> Result<()> {
    use self::submissions::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    diesel::update(submissions.filter(id.eq(row_id)))
        .set(max_similarity.eq(Some(value)))
        .execute(conn)?;
    Ok(())
}

/// Delete the submission and its comparisons together.
pub fn delete_submission(conn: &mut PgConnection, row_id: u64) -> Result<()> {
    use self::submissions::dsl::*;

    let row_id_i64 = conversions::u64_to_i64(row_id)?;
    conn.transaction(|conn| {
        delete_comparisons_for_submission(conn, row_id)?;
        diesel::delete(submissions.filter(id.eq(row_id_i64))).execute(conn)?;
        Ok(())
    })
}

/// Unset max similarity on every submission of an exercise, keeping the tokens.
pub fn unmatch_submissions_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<()> {
    use self::submissions::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    diesel::update(submissions.filter(exercise_id.eq(exercise)))
        .set(max_similarity.eq(None::<f32>))
        .execute(conn)?;
    Ok(())
}

/// Unset tokens and max similarity on every submission of an exercise.
pub fn reset_submissions_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<()> {
    use self::submissions::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    diesel::update(submissions.filter(exercise_id.eq(exercise)))
        .set((
            tokens.eq(None::<String>),
            max_similarity.eq(None::<f32>),
        ))
        .execute(conn)?;
    Ok(())
}

use super::*;

table! {
    comparisons (id) {
        id -> BigInt,
        exercise_id -> Integer,
        submission_a -> BigInt,
        submission_b -> BigInt,
        similarity -> Float,
        matches -> Jsonb,
        review -> Integer,
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = comparisons)]
struct ComparisonPrivate {
    id: i64,
    exercise_id: i32,
    submission_a: i64,
    submission_b: i64,
    similarity: f32,
    matches: Value,
    review: i32,
}

#[derive(Insertable)]
#[diesel(table_name = comparisons)]
struct ComparisonPrivateNew {
    exercise_id: i32,
    submission_a: i64,
    submission_b: i64,
    similarity: f32,
    matches: Value,
}

fn comparison_to_public(p: ComparisonPrivate) -> Result<ComparisonRecord> {
    use conversions::*;
    Ok(ComparisonRecord {
        comparison_id: i64_to_u64(p.id)?,
        exercise_id: i32_to_u32(p.exercise_id)?,
        submission_a: i64_to_u64(p.submission_a)?,
        submission_b: i64_to_u64(p.submission_b)?,
        similarity: p.similarity,
        matches: deserialize_matches(p.matches)?,
        review: deserialize_review(p.review)?,
    })
}

fn build_comparison_row(new: NewComparison) -> Result<ComparisonPrivateNew> {
    use conversions::*;
    Ok(ComparisonPrivateNew {
        exercise_id: u32_to_i32(new.exercise_id)?,
        submission_a: u64_to_i64(new.submission_a)?,
        submission_b: u64_to_i64(new.submission_b)?,
        similarity: new.similarity,
        matches: serialize_matches(new.matches)?,
    })
}

fn load_comparisons(items: Vec<ComparisonPrivate>) -> Result<Vec<ComparisonRecord>> {
    items.into_iter().map(comparison_to_public).collect()
}

/// Insert the comparison of a pair or refresh the one that exists.
/// The review column is left as it is.
pub fn upsert_comparison(conn: &mut PgConnection, new: NewComparison) -> Result<ComparisonRecord> {
    use self::comparisons::dsl::*;
    use diesel::upsert::excluded;

    let row = build_comparison_row(new)?;
    diesel::insert_into(comparisons)
        .values(&row)
        .on_conflict((submission_a, submission_b))
        .do_update()
        .set((
            similarity.eq(excluded(similarity)),
            matches.eq(excluded(matches)),
        ))
        .get_result::<ComparisonPrivate>(conn)
        .context("Failed to upsert comparison")
        .and_then(comparison_to_public)
}

pub fn get_comparison_by_id(conn: &mut PgConnection, row_id: u64) -> Result<Option<ComparisonRecord>> {
    use self::comparisons::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    comparisons
        .filter(id.eq(row_id))
        .first::<ComparisonPrivate>(conn)
        .optional()?
        .map(comparison_to_public)
        .transpose()
}

pub fn get_comparisons_for_submission(
    conn: &mut PgConnection,
    submission: u64,
) -> Result<Vec<ComparisonRecord>> {
    use self::comparisons::dsl::*;

    let submission = conversions::u64_to_i64(submission)?;
    load_comparisons(
        comparisons
            .filter(submission_a.eq(submission).or(submission_b.eq(submission)))
            .order(id.asc())
            .load(conn)?,
    )
}

pub fn get_comparisons_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<Vec<ComparisonRecord>> {
    use self::comparisons::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    load_comparisons(
        comparisons
            .filter(exercise_id.eq(exercise))
            .order((similarity.desc(), id.asc()))
            .load(conn)?,
    )
}

pub fn get_reviewed_comparisons_for_course(
    conn: &mut PgConnection,
    course: u32,
    min_review: i32,
) -> Result<Vec<ComparisonRecord>> {
    use diesel::sql_query;
    use diesel::sql_types::Integer;

    let course = conversions::u32_to_i32(course)?;
    let query = "SELECT c.* FROM comparisons c
        JOIN exercises e ON e.id = c.exercise_id
        WHERE e.course_id = $1
        AND c.review >= $2
        ORDER BY c.id ASC;";

    load_comparisons(
        sql_query(query)
            .bind::<Integer, _>(course)
            .bind::<Integer, _>(min_review)
            .load(conn)?,
    )
}

/// Returns false if no comparison has that id.
pub fn update_comparison_review(conn: &mut PgConnection, row_id: u64, value: ReviewRating) -> Result<bool> {
    use self::comparisons::dsl::*;

    let row_id = conversions::u64_to_i64(row_id)?;
    let updated = diesel::update(comparisons.filter(id.eq(row_id)))
        .set(review.eq(conversions::serialize_review(value)))
        .execute(conn)?;
    Ok(updated > 0)
}

pub fn delete_comparisons_for_submission(conn: &mut PgConnection, submission: u64) -> Result<usize> {
    use self::comparisons::dsl::*;

    let submission = conversions::u64_to_i64(submission)?;
    diesel::delete(comparisons.filter(submission_a.eq(submission).or(submission_b.eq(submission))))
        .execute(conn)
        .context("Failed to delete comparisons")
}

pub fn delete_comparisons_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<usize> {
    use self::comparisons::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    diesel::delete(comparisons.filter(exercise_id.eq(exercise)))
        .execute(conn)
        .context("Failed to delete comparisons")
}

pub fn delete_unreviewed_comparisons_for_exercise(conn: &mut PgConnection, exercise: u32) -> Result<usize> {
    use self::comparisons::dsl::*;

    let exercise = conversions::u32_to_i32(exercise)?;
    let unspecified = conversions::serialize_review(ReviewRating::Unspecified);
    diesel::delete(
        comparisons
            .filter(exercise_id.eq(exercise))
            .filter(review.eq(unspecified)),
    )
    .execute(conn)
    .context("Failed to delete unreviewed comparisons")
}

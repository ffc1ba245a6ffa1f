use super::*;

table! {
    courses (id) {
        id -> Integer,
        course_key -> Varchar,
        name -> Varchar,
        provider -> Varchar,
        archived -> Bool,
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = courses)]
struct CoursePrivate {
    id: i32,
    course_key: String,
    name: String,
    provider: String,
    archived: bool,
}

#[derive(Insertable)]
#[diesel(table_name = courses)]
struct CoursePrivateNew {
    course_key: String,
    name: String,
    provider: String,
}

fn course_to_public(p: CoursePrivate) -> Result<CourseRecord> {
    use conversions::*;
    Ok(CourseRecord {
        course_id: i32_to_u32(p.id)?,
        key: p.course_key,
        name: p.name,
        provider: p.provider,
        archived: p.archived,
    })
}

/// Only called by admin scripts.
pub fn insert_course(
    conn: &mut PgConnection,
    key: &str,
    course_name: &str,
    provider_name: &str,
) -> Result<CourseRecord> {
    use self::courses::dsl::*;

    let row = CoursePrivateNew {
        course_key: key.to_string(),
        name: course_name.to_string(),
        provider: provider_name.to_string(),
    };
    diesel::insert_into(courses)
        .values(&row)
        .get_result::<CoursePrivate>(conn)
        .context("Failed to insert course")
        .and_then(course_to_public)
}

pub fn get_active_courses(conn: &mut PgConnection) -> Result<Vec<CourseRecord>> {
    use self::courses::dsl::*;

    courses
        .filter(archived.eq(false))
        .order(id.asc())
        .load::<CoursePrivate>(conn)?
        .into_iter()
        .map(course_to_public)
        .collect()
}

pub fn get_course_by_id(conn: &mut PgConnection, row_id: u32) -> Result<CourseRecord> {
    use self::courses::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    courses
        .filter(id.eq(row_id))
        .first::<CoursePrivate>(conn)
        .with_context(|| format!("No course #{row_id}"))
        .and_then(course_to_public)
}

pub fn set_course_archived(conn: &mut PgConnection, row_id: u32, value: bool) -> Result<()> {
    use self::courses::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    diesel::update(courses.filter(id.eq(row_id)))
        .set(archived.eq(value))
        .execute(conn)?;
    Ok(())
}

use crate::{
    config::DbConfig,
    data::{
        StudentStore,
        student::{Student, StudentFields, StudentQuery},
    },
    error::{EscolaError, EscolaResult, MakeQuerySnafu, MigrateSnafu, OpenDatabaseSnafu},
};
use async_trait::async_trait;
use snafu::ResultExt;
use sqlx::{Pool, Postgres, QueryBuilder, postgres::PgPoolOptions};

const STUDENT_COLUMNS: &str = "id, first_name, preferred_name, surname, email, date_of_birth";

#[derive(Clone, Debug)]
pub struct PostgresStudentStore {
    pool: Pool<Postgres>,
}

impl PostgresStudentStore {
    pub async fn new(options: PgPoolOptions, db_config: &DbConfig) -> EscolaResult<Self> {
        let pool = options
            .connect(&db_config.get_db_path())
            .await
            .context(OpenDatabaseSnafu)?;

        sqlx::migrate!().run(&pool).await.context(MigrateSnafu)?;

        Ok(Self { pool })
    }
}

/// Escapes `LIKE` wildcards so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &StudentQuery) {
    if let Some(term) = query.search_term() {
        let pattern = like_pattern(term);
        builder.push(" WHERE first_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR preferred_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR surname ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR email ILIKE ");
        builder.push_bind(pattern);
    }
}

fn count_query(query: &StudentQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM public.students");
    push_filter(&mut builder, query);
    builder
}

fn select_query(query: &StudentQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {STUDENT_COLUMNS} FROM public.students"));
    push_filter(&mut builder, query);

    //columns come from a fixed list, never from the request
    builder.push(" ORDER BY ");
    for key in &query.ordering {
        builder.push(key.field.column());
        builder.push(if key.descending { " DESC, " } else { " ASC, " });
    }
    builder.push("id ASC");

    if let Some(window) = query.window {
        builder.push(" LIMIT ");
        builder.push_bind(i64::try_from(window.limit).unwrap_or(i64::MAX));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(window.offset).unwrap_or(i64::MAX));
    }

    builder
}

fn write_error(source: sqlx::Error) -> EscolaError {
    match &source {
        sqlx::Error::Database(db) if db.is_unique_violation() => EscolaError::EmailTaken,
        _ => EscolaError::MakeQuery { source },
    }
}

#[async_trait]
impl StudentStore for PostgresStudentStore {
    async fn list(&self, query: &StudentQuery) -> EscolaResult<(u64, Vec<Student>)> {
        let count: i64 = count_query(query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context(MakeQuerySnafu)?;

        let students = select_query(query)
            .build_query_as::<Student>()
            .fetch_all(&self.pool)
            .await
            .context(MakeQuerySnafu)?;

        Ok((u64::try_from(count).unwrap_or_default(), students))
    }

    async fn get(&self, id: i64) -> EscolaResult<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM public.students WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context(MakeQuerySnafu)
    }

    async fn insert(&self, fields: StudentFields) -> EscolaResult<Student> {
        let StudentFields {
            first_name,
            preferred_name,
            surname,
            email,
            date_of_birth,
        } = fields;

        let student = sqlx::query_as::<_, Student>(&format!(
            "INSERT INTO public.students (first_name, preferred_name, surname, email, date_of_birth) VALUES ($1, $2, $3, $4, $5) RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(first_name)
        .bind(preferred_name)
        .bind(surname)
        .bind(email)
        .bind(date_of_birth)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        info!(id = student.id, "Added student");
        Ok(student)
    }

    async fn update(&self, id: i64, fields: StudentFields) -> EscolaResult<Option<Student>> {
        let StudentFields {
            first_name,
            preferred_name,
            surname,
            email,
            date_of_birth,
        } = fields;

        let student = sqlx::query_as::<_, Student>(&format!(
            "UPDATE public.students SET first_name = $2, preferred_name = $3, surname = $4, email = $5, date_of_birth = $6 WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(id)
        .bind(first_name)
        .bind(preferred_name)
        .bind(surname)
        .bind(email)
        .bind(date_of_birth)
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error)?;

        if student.is_some() {
            info!(id, "Updated student");
        }
        Ok(student)
    }

    async fn remove(&self, id: i64) -> EscolaResult<bool> {
        let removed = sqlx::query("DELETE FROM public.students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context(MakeQuerySnafu)?
            .rows_affected()
            > 0;

        if removed {
            info!(id, "Removed student");
        }
        Ok(removed)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

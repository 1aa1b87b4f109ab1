use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateEnrollmentParams, EnrollmentsRepo, RepoError},
    domain::entities::EnrollmentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const ENROLLMENT_COLUMNS: &str = "id, journey_id, list_entry_id, email, enrolled_at, bypass, \
     unsubscribed, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: i64,
    journey_id: i64,
    list_entry_id: Option<i64>,
    email: String,
    enrolled_at: OffsetDateTime,
    bypass: bool,
    unsubscribed: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EnrollmentRow> for EnrollmentRecord {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: row.id,
            journey_id: row.journey_id,
            list_entry_id: row.list_entry_id,
            email: row.email,
            enrolled_at: row.enrolled_at,
            bypass: row.bypass,
            unsubscribed: row.unsubscribed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EnrollmentsRepo for PostgresRepositories {
    async fn find_enrollment(&self, id: i64) -> Result<Option<EnrollmentRecord>, RepoError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1");
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(EnrollmentRecord::from))
    }

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let sql = format!(
            "INSERT INTO enrollments (journey_id, list_entry_id, email, enrolled_at, bypass) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ENROLLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(params.journey_id)
            .bind(params.list_entry_id)
            .bind(&params.email)
            .bind(params.enrolled_at)
            .bind(params.bypass)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn enrollment_ids_for_email(&self, email: &str) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM enrollments WHERE email = $1 ORDER BY id")
            .bind(email)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_for_email_in_journey(
        &self,
        email: &str,
        journey_id: i64,
    ) -> Result<Option<EnrollmentRecord>, RepoError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE email = $1 AND journey_id = $2 \
             ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(email)
            .bind(journey_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(EnrollmentRecord::from))
    }

    async fn mark_unsubscribed(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE enrollments SET unsubscribed = TRUE, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }
}

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, StepsRepo},
    domain::{entities::StepRecord, rules::StepRules, send_time::SendTime},
};

use super::{PostgresRepositories, map_sqlx_error};

const STEP_COLUMNS: &str = "id, journey_id, subject, body, day_offset, send_time, delay_minutes, \
     rules, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct StepRow {
    id: i64,
    journey_id: i64,
    subject: String,
    body: String,
    day_offset: i32,
    send_time: Option<String>,
    delay_minutes: i32,
    rules: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<StepRow> for StepRecord {
    fn from(row: StepRow) -> Self {
        Self {
            id: row.id,
            journey_id: row.journey_id,
            subject: row.subject,
            body: row.body,
            day_offset: row.day_offset,
            send_time: row.send_time.as_deref().and_then(SendTime::parse),
            delay_minutes: row.delay_minutes,
            rules: StepRules::from_json(row.rules.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl StepsRepo for PostgresRepositories {
    async fn find_step(&self, id: i64) -> Result<Option<StepRecord>, RepoError> {
        let sql = format!("SELECT {STEP_COLUMNS} FROM steps WHERE id = $1");
        let row = sqlx::query_as::<_, StepRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(StepRecord::from))
    }

    async fn list_steps_for_journey(&self, journey_id: i64) -> Result<Vec<StepRecord>, RepoError> {
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM steps WHERE journey_id = $1 \
             ORDER BY day_offset, send_time NULLS FIRST, id"
        );
        let rows = sqlx::query_as::<_, StepRow>(&sql)
            .bind(journey_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(StepRecord::from).collect())
    }
}

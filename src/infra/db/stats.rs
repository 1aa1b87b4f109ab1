use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, StatsRepo},
    domain::{
        entities::{StatCounterRecord, StatCounts},
        types::StatKind,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct StatCounterRow {
    step_id: i64,
    enrollment_id: i64,
    sent: i64,
    opened: i64,
    clicked: i64,
    unsubscribed: i64,
    stopped: i64,
    redirected: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<StatCounterRow> for StatCounterRecord {
    fn from(row: StatCounterRow) -> Self {
        Self {
            step_id: row.step_id,
            enrollment_id: row.enrollment_id,
            counts: StatCounts {
                sent: row.sent,
                opened: row.opened,
                clicked: row.clicked,
                unsubscribed: row.unsubscribed,
                stopped: row.stopped,
                redirected: row.redirected,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatTotalsRow {
    sent: i64,
    opened: i64,
    clicked: i64,
    unsubscribed: i64,
    stopped: i64,
    redirected: i64,
}

#[async_trait]
impl StatsRepo for PostgresRepositories {
    async fn increment(
        &self,
        step_id: i64,
        enrollment_id: i64,
        kind: StatKind,
    ) -> Result<(), RepoError> {
        let column = kind.column();
        let sql = format!(
            "INSERT INTO stat_counters (step_id, enrollment_id, {column}) VALUES ($1, $2, 1) \
             ON CONFLICT (step_id, enrollment_id) \
             DO UPDATE SET {column} = stat_counters.{column} + 1, updated_at = now()"
        );
        sqlx::query(&sql)
            .bind(step_id)
            .bind(enrollment_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_counter(
        &self,
        step_id: i64,
        enrollment_id: i64,
    ) -> Result<Option<StatCounterRecord>, RepoError> {
        let row = sqlx::query_as::<_, StatCounterRow>(
            r#"
            SELECT step_id, enrollment_id, sent, opened, clicked, unsubscribed, stopped,
                   redirected, created_at, updated_at
            FROM stat_counters
            WHERE step_id = $1 AND enrollment_id = $2
            "#,
        )
        .bind(step_id)
        .bind(enrollment_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(StatCounterRecord::from))
    }

    async fn totals_for_step(&self, step_id: i64) -> Result<StatCounts, RepoError> {
        let row = sqlx::query_as::<_, StatTotalsRow>(
            r#"
            SELECT COALESCE(SUM(sent), 0)::BIGINT AS sent,
                   COALESCE(SUM(opened), 0)::BIGINT AS opened,
                   COALESCE(SUM(clicked), 0)::BIGINT AS clicked,
                   COALESCE(SUM(unsubscribed), 0)::BIGINT AS unsubscribed,
                   COALESCE(SUM(stopped), 0)::BIGINT AS stopped,
                   COALESCE(SUM(redirected), 0)::BIGINT AS redirected
            FROM stat_counters
            WHERE step_id = $1
            "#,
        )
        .bind(step_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(StatCounts {
            sent: row.sent,
            opened: row.opened,
            clicked: row.clicked,
            unsubscribed: row.unsubscribed,
            stopped: row.stopped,
            redirected: row.redirected,
        })
    }
}

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        DueListEntry, DueSend, NewScheduledSend, WithdrawScope, RepoError, ScheduledSendsRepo,
    },
    domain::{entities::ScheduledSendRecord, types::SendStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const SEND_COLUMNS: &str = "id, enrollment_id, step_id, send_at, status, attempts, last_error, \
     claimed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ScheduledSendRow {
    id: i64,
    enrollment_id: i64,
    step_id: i64,
    send_at: OffsetDateTime,
    status: SendStatus,
    attempts: i32,
    last_error: Option<String>,
    claimed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ScheduledSendRow> for ScheduledSendRecord {
    fn from(row: ScheduledSendRow) -> Self {
        Self {
            id: row.id,
            enrollment_id: row.enrollment_id,
            step_id: row.step_id,
            send_at: row.send_at,
            status: row.status,
            attempts: row.attempts,
            last_error: row.last_error,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DueSendRow {
    send_id: i64,
    step_id: i64,
    send_at: OffsetDateTime,
    enrollment_id: i64,
    enrollment_unsubscribed: bool,
    journey_id: i64,
    journey_bypass: bool,
    unsubscribe_text: Option<String>,
    list_entry_id: Option<i64>,
    list_email: Option<String>,
    list_confirmed: Option<bool>,
    list_document_url: Option<String>,
}

impl From<DueSendRow> for DueSend {
    fn from(row: DueSendRow) -> Self {
        let list_entry = match (row.list_entry_id, row.list_email) {
            (Some(id), Some(email)) => Some(DueListEntry {
                id,
                email,
                confirmed: row.list_confirmed.unwrap_or(false),
                document_url: row.list_document_url,
            }),
            _ => None,
        };

        Self {
            send_id: row.send_id,
            step_id: row.step_id,
            send_at: row.send_at,
            enrollment_id: row.enrollment_id,
            enrollment_unsubscribed: row.enrollment_unsubscribed,
            journey_id: row.journey_id,
            journey_bypass: row.journey_bypass,
            unsubscribe_text: row.unsubscribe_text,
            list_entry,
        }
    }
}

#[async_trait]
impl ScheduledSendsRepo for PostgresRepositories {
    async fn insert_all(&self, sends: &[NewScheduledSend]) -> Result<u64, RepoError> {
        if sends.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut inserted = 0;
        for send in sends {
            let result = sqlx::query(
                r#"
                INSERT INTO scheduled_sends (enrollment_id, step_id, send_at, status, attempts)
                VALUES ($1, $2, $3, 'pending', 0)
                "#,
            )
            .bind(send.enrollment_id)
            .bind(send.step_id)
            .bind(send.send_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(inserted)
    }

    async fn list_due(
        &self,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<DueSend>, RepoError> {
        let rows = sqlx::query_as::<_, DueSendRow>(
            r#"
            SELECT s.id AS send_id,
                   s.step_id,
                   s.send_at,
                   e.id AS enrollment_id,
                   e.unsubscribed AS enrollment_unsubscribed,
                   j.id AS journey_id,
                   j.bypass AS journey_bypass,
                   j.unsubscribe_text,
                   l.id AS list_entry_id,
                   l.email AS list_email,
                   l.confirmed AS list_confirmed,
                   l.document_url AS list_document_url
            FROM scheduled_sends s
            INNER JOIN enrollments e ON e.id = s.enrollment_id
            INNER JOIN journeys j ON j.id = e.journey_id
            LEFT JOIN list_entries l ON l.id = e.list_entry_id
            WHERE s.send_at <= $1
              AND (s.status = 'pending' OR (s.status = 'claimed' AND s.claimed_at < $2))
            ORDER BY s.send_at, s.id
            LIMIT $3
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DueSend::from).collect())
    }

    async fn claim(
        &self,
        id: i64,
        now: OffsetDateTime,
        stale_before: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_sends s
            SET status = 'claimed', claimed_at = $2, attempts = s.attempts + 1, updated_at = $2
            FROM enrollments e
            WHERE s.id = $1
              AND e.id = s.enrollment_id
              AND NOT e.unsubscribed
              AND (s.status = 'pending' OR (s.status = 'claimed' AND s.claimed_at < $3))
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(stale_before)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition(
        &self,
        id: i64,
        to: SendStatus,
        last_error: Option<String>,
    ) -> Result<bool, RepoError> {
        let sources = SendStatus::sources_of(to);
        if sources.is_empty() {
            return Ok(false);
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE scheduled_sends SET status = ");
        qb.push_bind(to);
        qb.push(", last_error = COALESCE(");
        qb.push_bind(last_error);
        qb.push(", last_error), updated_at = now() WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for source in sources {
            separated.push_bind(source);
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn withdraw(&self, scope: WithdrawScope, to: SendStatus) -> Result<u64, RepoError> {
        let open = SendStatus::open_states();
        for state in &open {
            state.transition(to).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE scheduled_sends SET status = ");
        qb.push_bind(to);
        qb.push(", updated_at = now() WHERE status IN (");
        let mut separated = qb.separated(", ");
        for state in open {
            separated.push_bind(state);
        }
        separated.push_unseparated(")");

        match scope {
            WithdrawScope::Enrollments(enrollment_ids) => {
                if enrollment_ids.is_empty() {
                    return Ok(0);
                }
                qb.push(" AND enrollment_id = ANY(");
                qb.push_bind(enrollment_ids);
                qb.push(")");
            }
            WithdrawScope::EnrollmentSteps {
                enrollment_ids,
                step_ids,
            } => {
                if enrollment_ids.is_empty() || step_ids.is_empty() {
                    return Ok(0);
                }
                qb.push(" AND enrollment_id = ANY(");
                qb.push_bind(enrollment_ids);
                qb.push(") AND step_id = ANY(");
                qb.push_bind(step_ids);
                qb.push(")");
            }
        }

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn open_step_ids(&self, enrollment_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT step_id FROM scheduled_sends
            WHERE enrollment_id = $1 AND status IN ('pending', 'claimed')
            ORDER BY step_id
            "#,
        )
        .bind(enrollment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn sent_step_ids(&self, enrollment_ids: &[i64]) -> Result<Vec<i64>, RepoError> {
        if enrollment_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT step_id FROM scheduled_sends
            WHERE enrollment_id = ANY($1) AND status = 'sent'
            ORDER BY step_id
            "#,
        )
        .bind(enrollment_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn earliest_pending(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError> {
        let sql = format!(
            "SELECT {SEND_COLUMNS} FROM scheduled_sends \
             WHERE enrollment_id = $1 AND status = 'pending' \
             ORDER BY send_at, id LIMIT 1"
        );
        let row = sqlx::query_as::<_, ScheduledSendRow>(&sql)
            .bind(enrollment_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ScheduledSendRecord::from))
    }

    async fn latest_for_enrollment(
        &self,
        enrollment_id: i64,
    ) -> Result<Option<ScheduledSendRecord>, RepoError> {
        let sql = format!(
            "SELECT {SEND_COLUMNS} FROM scheduled_sends \
             WHERE enrollment_id = $1 ORDER BY id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ScheduledSendRow>(&sql)
            .bind(enrollment_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ScheduledSendRecord::from))
    }
}

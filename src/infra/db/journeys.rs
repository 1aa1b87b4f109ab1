use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{JourneysRepo, RepoError},
    domain::entities::JourneyRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct JourneyRow {
    id: i64,
    title: String,
    owner: String,
    document_ref: Option<String>,
    bypass: bool,
    unsubscribe_text: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<JourneyRow> for JourneyRecord {
    fn from(row: JourneyRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            owner: row.owner,
            document_ref: row.document_ref,
            bypass: row.bypass,
            unsubscribe_text: row.unsubscribe_text,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl JourneysRepo for PostgresRepositories {
    async fn find_journey(&self, id: i64) -> Result<Option<JourneyRecord>, RepoError> {
        let row = sqlx::query_as::<_, JourneyRow>(
            r#"
            SELECT id, title, owner, document_ref, bypass, unsubscribe_text,
                   created_at, updated_at
            FROM journeys
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(JourneyRecord::from))
    }
}

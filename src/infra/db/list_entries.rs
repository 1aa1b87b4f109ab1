use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateListEntryParams, ListEntriesRepo, RepoError},
    domain::entities::ListEntryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const LIST_ENTRY_COLUMNS: &str =
    "id, journey_id, email, token, confirmed, confirmed_at, document_url, created_at";

#[derive(sqlx::FromRow)]
struct ListEntryRow {
    id: i64,
    journey_id: i64,
    email: String,
    token: String,
    confirmed: bool,
    confirmed_at: Option<OffsetDateTime>,
    document_url: Option<String>,
    created_at: OffsetDateTime,
}

impl From<ListEntryRow> for ListEntryRecord {
    fn from(row: ListEntryRow) -> Self {
        Self {
            id: row.id,
            journey_id: row.journey_id,
            email: row.email,
            token: row.token,
            confirmed: row.confirmed,
            confirmed_at: row.confirmed_at,
            document_url: row.document_url,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ListEntriesRepo for PostgresRepositories {
    async fn find_list_entry(&self, id: i64) -> Result<Option<ListEntryRecord>, RepoError> {
        let sql = format!("SELECT {LIST_ENTRY_COLUMNS} FROM list_entries WHERE id = $1");
        let row = sqlx::query_as::<_, ListEntryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ListEntryRecord::from))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ListEntryRecord>, RepoError> {
        let sql = format!("SELECT {LIST_ENTRY_COLUMNS} FROM list_entries WHERE token = $1");
        let row = sqlx::query_as::<_, ListEntryRow>(&sql)
            .bind(token)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ListEntryRecord::from))
    }

    async fn create_list_entry(
        &self,
        params: CreateListEntryParams,
    ) -> Result<ListEntryRecord, RepoError> {
        let sql = format!(
            "INSERT INTO list_entries \
             (journey_id, email, token, confirmed, confirmed_at, document_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {LIST_ENTRY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ListEntryRow>(&sql)
            .bind(params.journey_id)
            .bind(&params.email)
            .bind(&params.token)
            .bind(params.confirmed_at.is_some())
            .bind(params.confirmed_at)
            .bind(params.document_url.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn confirm_list_entry(&self, id: i64, at: OffsetDateTime) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE list_entries
            SET confirmed = TRUE, confirmed_at = $2
            WHERE id = $1 AND confirmed = FALSE
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}

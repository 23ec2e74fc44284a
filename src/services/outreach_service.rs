//! services/outreach_service.rs
//! Persistencia de registros de outreach en SQLite con sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::errors::StorageError;
use crate::models::outreach_model::{
    ListOutreachResponse, NewOutreachRecord, OutreachFilter, OutreachKind, OutreachRecord,
    OutreachStats, OutreachStatus, StatusUpdate,
};

const RECORD_COLUMNS: &str = r#"
    id, kind, customer_id, to_number, from_number, message_content,
    agent_id, agent_template_id, initialization_values, provider_reference_id,
    status, error_detail, created_at, updated_at
"#;

/// Lo que el workflow de despacho necesita del almacenamiento.
#[async_trait]
pub trait OutreachStore: Send + Sync {
    /// Guarda un registro nuevo en `pending` y devuelve su id.
    async fn create(&self, record: NewOutreachRecord) -> Result<String, StorageError>;

    /// Aplica `update` solo si el registro sigue en `update.expected()`.
    /// Devuelve `false` si no se escribió nada.
    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<bool, StorageError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<OutreachRecord>, StorageError>;

    /// Registros sin estado terminal, los más antiguos primero.
    async fn list_unfinished(&self) -> Result<Vec<OutreachRecord>, StorageError>;
}

#[derive(Clone, Debug)]
pub struct OutreachService {
    db_pool: Pool<Sqlite>,
}

impl OutreachService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        OutreachService { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.db_pool).await?;
        Ok(())
    }

    /// Lista registros con paginación, más recientes primero.
    pub async fn list(
        &self,
        filter: &OutreachFilter,
        page: u64,
        page_size: u64,
    ) -> Result<ListOutreachResponse, StorageError> {
        let page = page.max(1);
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        // Páginas fuera de rango devuelven una lista vacía
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok());

        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS cnt FROM outreach_records");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&self.db_pool)
            .await?
            .try_get("cnt")?;

        let items = match offset {
            Some(offset) if offset < total => {
                let mut items_query: QueryBuilder<Sqlite> =
                    QueryBuilder::new(format!("SELECT {} FROM outreach_records", RECORD_COLUMNS));
                push_filters(&mut items_query, filter);
                items_query
                    .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
                    .push_bind(limit)
                    .push(" OFFSET ")
                    .push_bind(offset);

                let rows = items_query.build().fetch_all(&self.db_pool).await?;
                rows.iter()
                    .map(record_from_row)
                    .collect::<Result<Vec<_>, _>>()?
            }
            _ => Vec::new(),
        };

        Ok(ListOutreachResponse {
            total: total as u64,
            page,
            page_size,
            items,
        })
    }

    pub async fn stats(&self, kind: Option<OutreachKind>) -> Result<OutreachStats, StorageError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT status, COUNT(*) AS cnt FROM outreach_records");
        if let Some(kind) = kind {
            query.push(" WHERE kind = ").push_bind(kind.as_str());
        }
        query.push(" GROUP BY status");

        let rows = query.build().fetch_all(&self.db_pool).await?;

        let mut stats = OutreachStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("cnt")?;
            let count = count as u64;
            stats.total += count;
            match status.parse::<OutreachStatus>() {
                Ok(OutreachStatus::Pending) => stats.pending += count,
                Ok(s) if s.is_in_flight() => stats.in_flight += count,
                Ok(s) if s.is_success() => stats.succeeded += count,
                Ok(_) => stats.failed += count,
                Err(e) => log::warn!("(stats) Ignorando estado desconocido: {}", e),
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl OutreachStore for OutreachService {
    async fn create(&self, record: NewOutreachRecord) -> Result<String, StorageError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let initialization_values = record
            .initialization_values
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let agent_id = record.agent_selector.as_ref().and_then(|s| s.agent_id());
        let agent_template_id = record
            .agent_selector
            .as_ref()
            .and_then(|s| s.agent_template_id());

        sqlx::query(
            r#"
            INSERT INTO outreach_records (
                id, kind, customer_id, to_number, from_number, message_content,
                agent_id, agent_template_id, initialization_values,
                provider_reference_id, status, error_detail, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 'pending', NULL, ?10, ?10)
            "#,
        )
        .bind(id.as_str())
        .bind(record.kind.as_str())
        .bind(record.customer_id)
        .bind(record.to_number.as_str())
        .bind(record.from_number.as_str())
        .bind(record.message_content.as_deref())
        .bind(agent_id)
        .bind(agent_template_id)
        .bind(initialization_values)
        .bind(now.as_str())
        .execute(&self.db_pool)
        .await?;

        log::info!(
            "(create) Registro {} creado: kind={}, customer_id={}",
            id,
            record.kind,
            record.customer_id
        );
        Ok(id)
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<bool, StorageError> {
        if !update.expected().can_transition_to(update.status()) {
            return Err(StorageError::InvalidTransition {
                from: update.expected(),
                to: update.status(),
            });
        }

        let now = Utc::now().to_rfc3339();
        // Una sola sentencia: estado + referencia/error se aplican juntos o no se aplican.
        let result = sqlx::query(
            r#"
            UPDATE outreach_records
            SET status = ?1,
                provider_reference_id = COALESCE(?2, provider_reference_id),
                error_detail = COALESCE(?3, error_detail),
                updated_at = ?4
            WHERE id = ?5 AND kind = ?6 AND status = ?7
            "#,
        )
        .bind(update.status().as_str())
        .bind(update.provider_reference_id())
        .bind(update.error_detail())
        .bind(now)
        .bind(id)
        .bind(update.kind().as_str())
        .bind(update.expected().as_str())
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<OutreachRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM outreach_records WHERE id = ?1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_unfinished(&self) -> Result<Vec<OutreachRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM outreach_records
            WHERE status IN ('pending', 'initiating', 'sending')
            ORDER BY created_at ASC, rowid ASC
            "#,
            RECORD_COLUMNS
        ))
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &OutreachFilter) {
    let mut sep = " WHERE ";
    if let Some(kind) = filter.kind {
        query.push(sep).push("kind = ").push_bind(kind.as_str());
        sep = " AND ";
    }
    if let Some(customer_id) = filter.customer_id {
        query.push(sep).push("customer_id = ").push_bind(customer_id);
        sep = " AND ";
    }
    if let Some(status) = filter.status {
        query.push(sep).push("status = ").push_bind(status.as_str());
    }
}

fn record_from_row(row: &SqliteRow) -> Result<OutreachRecord, StorageError> {
    let id: String = row.try_get("id")?;
    let corrupt = |detail: String| StorageError::Corrupt {
        id: id.clone(),
        detail,
    };

    let kind: String = row.try_get("kind")?;
    let kind = kind.parse::<OutreachKind>().map_err(corrupt)?;
    let status: String = row.try_get("status")?;
    let status = status.parse::<OutreachStatus>().map_err(corrupt)?;
    if !kind.accepts(status) {
        return Err(corrupt(format!("status '{}' does not apply to a {}", status, kind)));
    }

    let initialization_values = row
        .try_get::<Option<String>, _>("initialization_values")?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| corrupt(format!("initialization_values: {}", e)))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(OutreachRecord {
        kind,
        customer_id: row.try_get("customer_id")?,
        to_number: row.try_get("to_number")?,
        from_number: row.try_get("from_number")?,
        message_content: row.try_get("message_content")?,
        agent_id: row.try_get("agent_id")?,
        agent_template_id: row.try_get("agent_template_id")?,
        initialization_values,
        provider_reference_id: row.try_get("provider_reference_id")?,
        status,
        error_detail: row.try_get("error_detail")?,
        created_at: parse_timestamp(&created_at).map_err(corrupt)?,
        updated_at: parse_timestamp(&updated_at).map_err(corrupt)?,
        id,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

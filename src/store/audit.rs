use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::Role;
use crate::workflow::EntityKind;

use super::{rfc3339, time_col, uuid_col};

/// Append-only audit trail row, written in the same transaction as the
/// transition it records.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub id: i64,
    pub entity_kind: String,
    pub entity_id: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor_id: Uuid,
    pub actor_role: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn from_row(row: &SqliteRow) -> Result<TransitionRecord, sqlx::Error> {
    Ok(TransitionRecord {
        id: row.try_get("id")?,
        entity_kind: row.try_get("entity_kind")?,
        entity_id: uuid_col(row, "entity_id")?,
        from_status: row.try_get("from_status")?,
        to_status: row.try_get("to_status")?,
        actor_id: uuid_col(row, "actor_id")?,
        actor_role: row.try_get("actor_role")?,
        comment: row.try_get("comment")?,
        created_at: time_col(row, "created_at")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: Uuid,
    from_status: Option<&str>,
    to_status: &str,
    actor_id: Uuid,
    actor_role: Role,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transition_log
            (entity_kind, entity_id, from_status, to_status, actor_id,
             actor_role, comment, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(from_status)
    .bind(to_status)
    .bind(actor_id.to_string())
    .bind(actor_role.as_str())
    .bind(comment)
    .bind(rfc3339(now))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_for_entity(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<Vec<TransitionRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM transition_log
        WHERE entity_kind = ?1 AND entity_id = ?2
        ORDER BY id
        "#,
    )
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(from_row).collect()
}

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::workflow::EntityKind;

use super::{rfc3339, time_col, uuid_col};

/// A per-transition notice addressed to the party concerned by it.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: Uuid,
    pub entity_kind: String,
    pub entity_id: Uuid,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

fn from_row(row: &SqliteRow) -> Result<Notification, sqlx::Error> {
    Ok(Notification {
        id: row.try_get("id")?,
        recipient_id: uuid_col(row, "recipient_id")?,
        entity_kind: row.try_get("entity_kind")?,
        entity_id: uuid_col(row, "entity_id")?,
        message: row.try_get("message")?,
        read: row.try_get("read")?,
        created_at: time_col(row, "created_at")?,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    recipient_id: Uuid,
    entity_kind: EntityKind,
    entity_id: Uuid,
    message: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notifications (recipient_id, entity_kind, entity_id, message, read, created_at)
        VALUES (?1, ?2, ?3, ?4, 0, ?5)
        "#,
    )
    .bind(recipient_id.to_string())
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(message)
    .bind(rfc3339(now))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_for(
    conn: &mut SqliteConnection,
    recipient_id: Uuid,
) -> Result<Vec<Notification>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM notifications WHERE recipient_id = ?1 ORDER BY created_at DESC",
    )
    .bind(recipient_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn mark_read(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

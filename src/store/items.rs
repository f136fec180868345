use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::Item;

use super::{opt_id, opt_uuid_col, rfc3339, status_col, time_col, uuid_col};

fn from_row(row: &SqliteRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        id: uuid_col(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        asset_tag: row.try_get("asset_tag")?,
        status: status_col(row, "status")?,
        custodian_id: opt_uuid_col(row, "custodian_id")?,
        owner_department_id: opt_uuid_col(row, "owner_department_id")?,
        version: row.try_get("version")?,
        created_at: time_col(row, "created_at")?,
        updated_at: time_col(row, "updated_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, item: &Item) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO items
            (id, name, description, asset_tag, status, custodian_id,
             owner_department_id, version, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(item.id.to_string())
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.asset_tag)
    .bind(item.status.as_str())
    .bind(opt_id(item.custodian_id))
    .bind(opt_id(item.owner_department_id))
    .bind(item.version)
    .bind(rfc3339(item.created_at))
    .bind(rfc3339(item.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Item>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM items WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn fetch_by_tag(
    conn: &mut SqliteConnection,
    asset_tag: &str,
) -> Result<Option<Item>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM items WHERE asset_tag = ?1")
        .bind(asset_tag)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Item>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM items ORDER BY created_at")
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Allocation CAS: `available → allocated` with custody assigned. Returns
/// false when the item was not available anymore.
pub async fn cas_allocate(
    conn: &mut SqliteConnection,
    id: Uuid,
    custodian_id: Uuid,
    department_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = 'allocated', custodian_id = ?1, owner_department_id = ?2,
            version = version + 1, updated_at = ?3
        WHERE id = ?4 AND status = 'available'
        "#,
    )
    .bind(custodian_id.to_string())
    .bind(department_id.to_string())
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Transfer-completion CAS: the item stays allocated, custody and owning
/// department move to the receiver.
pub async fn cas_reassign_custody(
    conn: &mut SqliteConnection,
    id: Uuid,
    custodian_id: Uuid,
    department_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET custodian_id = ?1, owner_department_id = ?2,
            version = version + 1, updated_at = ?3
        WHERE id = ?4 AND status = 'allocated'
        "#,
    )
    .bind(custodian_id.to_string())
    .bind(department_id.to_string())
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Return-to-store CAS: `allocated → available`, custody cleared.
pub async fn cas_release(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = 'available', custodian_id = NULL, owner_department_id = NULL,
            version = version + 1, updated_at = ?1
        WHERE id = ?2 AND status = 'allocated'
        "#,
    )
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn cas_begin_maintenance(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = 'under_maintenance', version = version + 1, updated_at = ?1
        WHERE id = ?2 AND status IN ('available', 'allocated')
        "#,
    )
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Maintenance completion returns the item to the central store.
pub async fn cas_finish_maintenance(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = 'available', custodian_id = NULL, owner_department_id = NULL,
            version = version + 1, updated_at = ?1
        WHERE id = ?2 AND status = 'under_maintenance'
        "#,
    )
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn cas_mark_damaged(
    conn: &mut SqliteConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = 'damaged', version = version + 1, updated_at = ?1
        WHERE id = ?2 AND status != 'damaged'
        "#,
    )
    .bind(rfc3339(now))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// How many requests or transfers reference the item. Administrative
/// deletion is refused while this is non-zero.
pub async fn reference_count(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM requests WHERE allocated_item_id = ?1)
          + (SELECT COUNT(*) FROM transfers WHERE item_id = ?1) AS refs
        "#,
    )
    .bind(id.to_string())
    .fetch_one(&mut *conn)
    .await?;
    row.try_get("refs")
}

pub async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM items WHERE id = ?1")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

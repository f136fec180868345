use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{Transfer, TransferStatus};

use super::{opt_id, opt_time_col, opt_uuid_col, rfc3339, status_col, time_col, uuid_col};

fn from_row(row: &SqliteRow) -> Result<Transfer, sqlx::Error> {
    Ok(Transfer {
        id: uuid_col(row, "id")?,
        item_id: uuid_col(row, "item_id")?,
        initiator_id: uuid_col(row, "initiator_id")?,
        receiver_id: uuid_col(row, "receiver_id")?,
        receiver_department_id: uuid_col(row, "receiver_department_id")?,
        cross_department: row.try_get("cross_department")?,
        status: status_col(row, "status")?,
        dept_head_approver_id: opt_uuid_col(row, "dept_head_approver_id")?,
        dean_approver_id: opt_uuid_col(row, "dean_approver_id")?,
        storekeeper_approver_id: opt_uuid_col(row, "storekeeper_approver_id")?,
        rejection_reason: row.try_get("rejection_reason")?,
        version: row.try_get("version")?,
        created_at: time_col(row, "created_at")?,
        updated_at: time_col(row, "updated_at")?,
        completed_at: opt_time_col(row, "completed_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, transfer: &Transfer) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transfers
            (id, item_id, initiator_id, receiver_id, receiver_department_id,
             cross_department, status, dept_head_approver_id, dean_approver_id,
             storekeeper_approver_id, rejection_reason, version, created_at,
             updated_at, completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(transfer.id.to_string())
    .bind(transfer.item_id.to_string())
    .bind(transfer.initiator_id.to_string())
    .bind(transfer.receiver_id.to_string())
    .bind(transfer.receiver_department_id.to_string())
    .bind(transfer.cross_department)
    .bind(transfer.status.as_str())
    .bind(opt_id(transfer.dept_head_approver_id))
    .bind(opt_id(transfer.dean_approver_id))
    .bind(opt_id(transfer.storekeeper_approver_id))
    .bind(&transfer.rejection_reason)
    .bind(transfer.version)
    .bind(rfc3339(transfer.created_at))
    .bind(rfc3339(transfer.updated_at))
    .bind(transfer.completed_at.map(rfc3339))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Transfer>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM transfers WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list(
    conn: &mut SqliteConnection,
    only_pending: bool,
) -> Result<Vec<Transfer>, sqlx::Error> {
    let sql = if only_pending {
        "SELECT * FROM transfers WHERE status NOT IN ('completed', 'rejected') ORDER BY created_at"
    } else {
        "SELECT * FROM transfers ORDER BY created_at"
    };
    let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Writes the mutated transfer back, guarded by the status observed at read
/// time.
pub async fn cas_apply(
    conn: &mut SqliteConnection,
    transfer: &Transfer,
    expected: TransferStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE transfers
        SET status = ?1, dept_head_approver_id = ?2, dean_approver_id = ?3,
            storekeeper_approver_id = ?4, rejection_reason = ?5, version = ?6,
            updated_at = ?7, completed_at = ?8
        WHERE id = ?9 AND status = ?10
        "#,
    )
    .bind(transfer.status.as_str())
    .bind(opt_id(transfer.dept_head_approver_id))
    .bind(opt_id(transfer.dean_approver_id))
    .bind(opt_id(transfer.storekeeper_approver_id))
    .bind(&transfer.rejection_reason)
    .bind(transfer.version)
    .bind(rfc3339(transfer.updated_at))
    .bind(transfer.completed_at.map(rfc3339))
    .bind(transfer.id.to_string())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{Request, RequestStatus};

use super::{opt_id, opt_uuid_col, rfc3339, status_col, time_col, uuid_col};

fn from_row(row: &SqliteRow) -> Result<Request, sqlx::Error> {
    Ok(Request {
        id: uuid_col(row, "id")?,
        requester_id: uuid_col(row, "requester_id")?,
        requester_role: status_col(row, "requester_role")?,
        department_id: uuid_col(row, "department_id")?,
        item_description: row.try_get("item_description")?,
        quantity: row.try_get("quantity")?,
        urgency: status_col(row, "urgency")?,
        justification: row.try_get("justification")?,
        status: status_col(row, "status")?,
        dept_head_approver_id: opt_uuid_col(row, "dept_head_approver_id")?,
        dean_approver_id: opt_uuid_col(row, "dean_approver_id")?,
        storekeeper_approver_id: opt_uuid_col(row, "storekeeper_approver_id")?,
        rejection_reason: row.try_get("rejection_reason")?,
        allocated_item_id: opt_uuid_col(row, "allocated_item_id")?,
        version: row.try_get("version")?,
        created_at: time_col(row, "created_at")?,
        updated_at: time_col(row, "updated_at")?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, req: &Request) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO requests
            (id, requester_id, requester_role, department_id, item_description,
             quantity, urgency, justification, status, dept_head_approver_id,
             dean_approver_id, storekeeper_approver_id, rejection_reason,
             allocated_item_id, version, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(req.id.to_string())
    .bind(req.requester_id.to_string())
    .bind(req.requester_role.as_str())
    .bind(req.department_id.to_string())
    .bind(&req.item_description)
    .bind(req.quantity)
    .bind(req.urgency.as_str())
    .bind(&req.justification)
    .bind(req.status.as_str())
    .bind(opt_id(req.dept_head_approver_id))
    .bind(opt_id(req.dean_approver_id))
    .bind(opt_id(req.storekeeper_approver_id))
    .bind(&req.rejection_reason)
    .bind(opt_id(req.allocated_item_id))
    .bind(req.version)
    .bind(rfc3339(req.created_at))
    .bind(rfc3339(req.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Request>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM requests WHERE id = ?1")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list(
    conn: &mut SqliteConnection,
    only_pending: bool,
) -> Result<Vec<Request>, sqlx::Error> {
    let sql = if only_pending {
        "SELECT * FROM requests WHERE status NOT IN ('approved', 'rejected') ORDER BY created_at"
    } else {
        "SELECT * FROM requests ORDER BY created_at"
    };
    let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
    rows.iter().map(from_row).collect()
}

/// Writes the mutated request back, guarded by the status observed at read
/// time. Zero affected rows means the row moved underneath us.
pub async fn cas_apply(
    conn: &mut SqliteConnection,
    req: &Request,
    expected: RequestStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE requests
        SET status = ?1, dept_head_approver_id = ?2, dean_approver_id = ?3,
            storekeeper_approver_id = ?4, rejection_reason = ?5,
            allocated_item_id = ?6, version = ?7, updated_at = ?8
        WHERE id = ?9 AND status = ?10
        "#,
    )
    .bind(req.status.as_str())
    .bind(opt_id(req.dept_head_approver_id))
    .bind(opt_id(req.dean_approver_id))
    .bind(opt_id(req.storekeeper_approver_id))
    .bind(&req.rejection_reason)
    .bind(opt_id(req.allocated_item_id))
    .bind(req.version)
    .bind(rfc3339(req.updated_at))
    .bind(req.id.to_string())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

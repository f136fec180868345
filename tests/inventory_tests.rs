//! Tests for item registration, return, maintenance lifecycle, and the
//! administrative delete guard.

use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use custodian::store;
use custodian::{
    Actor, ChangeBus, DatabaseManager, Decision, InventoryService, ItemStatus, NewItem,
    NewRequest, Role, Urgency, WorkflowEngine, WorkflowError,
};

async fn setup() -> (TempDir, DatabaseManager, InventoryService) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("custodian.db").display());
    let db = DatabaseManager::new(&url, 5, true).await.expect("database");
    let inventory = InventoryService::new(db.pool().clone(), ChangeBus::default());
    (dir, db, inventory)
}

fn actor(role: Role) -> Actor {
    Actor::new(Uuid::new_v4(), "test", role, Some(Uuid::new_v4()))
}

fn new_item(tag: &str) -> NewItem {
    NewItem {
        name: "3d printer".into(),
        description: Some("workshop equipment".into()),
        asset_tag: tag.into(),
    }
}

async fn allocate(pool: &SqlitePool, item_id: Uuid, holder: Uuid, department: Uuid) {
    let mut conn = pool.acquire().await.unwrap();
    let ok = store::items::cas_allocate(&mut conn, item_id, holder, department, Utc::now())
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn add_item_enforces_role_and_tag_format() {
    let (_dir, _db, inventory) = setup().await;
    let keeper = actor(Role::Storekeeper);
    let staff = actor(Role::Staff);

    let err = inventory.add_item(&staff, new_item("WS-1001")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    let err = inventory
        .add_item(&keeper, new_item("not-a-tag"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    let item = inventory.add_item(&keeper, new_item("WS-1001")).await.unwrap();
    assert_eq!(item.status, ItemStatus::Available);
    assert_eq!(item.custodian_id, None);
    assert_eq!(item.owner_department_id, None);
}

#[tokio::test]
async fn duplicate_asset_tags_are_refused() {
    let (_dir, _db, inventory) = setup().await;
    let keeper = actor(Role::Storekeeper);

    inventory.add_item(&keeper, new_item("WS-1002")).await.unwrap();
    let err = inventory.add_item(&keeper, new_item("WS-1002")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn returning_an_item_restores_store_state() {
    let (_dir, db, inventory) = setup().await;
    let keeper = actor(Role::Storekeeper);
    let holder = Uuid::new_v4();
    let department = Uuid::new_v4();

    let item = inventory.add_item(&keeper, new_item("WS-1003")).await.unwrap();
    allocate(db.pool(), item.id, holder, department).await;

    let item = inventory.return_item(&keeper, item.id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Available);
    assert_eq!(item.custodian_id, None);
    assert_eq!(item.owner_department_id, None);

    // A second return has nothing to release.
    let err = inventory.return_item(&keeper, item.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn maintenance_lifecycle_round_trip() {
    let (_dir, _db, inventory) = setup().await;
    let keeper = actor(Role::Storekeeper);

    let item = inventory.add_item(&keeper, new_item("WS-1004")).await.unwrap();

    // Finishing maintenance that never started is invalid.
    let err = inventory.finish_maintenance(&keeper, item.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    let item = inventory.begin_maintenance(&keeper, item.id).await.unwrap();
    assert_eq!(item.status, ItemStatus::UnderMaintenance);

    // Maintenance does not nest.
    let err = inventory.begin_maintenance(&keeper, item.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    let item = inventory.finish_maintenance(&keeper, item.id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Available);
    assert_eq!(item.custodian_id, None);
}

#[tokio::test]
async fn damaged_is_a_dead_end() {
    let (_dir, _db, inventory) = setup().await;
    let keeper = actor(Role::Storekeeper);

    let item = inventory.add_item(&keeper, new_item("WS-1005")).await.unwrap();
    let item = inventory.mark_damaged(&keeper, item.id).await.unwrap();
    assert_eq!(item.status, ItemStatus::Damaged);

    let err = inventory.mark_damaged(&keeper, item.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn delete_is_refused_while_workflow_records_reference_the_item() {
    let (_dir, db, inventory) = setup().await;
    let department = Uuid::new_v4();
    let admin = actor(Role::Admin);
    let keeper = Actor::new(Uuid::new_v4(), "keeper", Role::Storekeeper, Some(department));
    let staff = Actor::new(Uuid::new_v4(), "staff", Role::Staff, Some(department));
    let head = Actor::new(Uuid::new_v4(), "head", Role::DepartmentHead, Some(department));
    let dean = Actor::new(Uuid::new_v4(), "dean", Role::Dean, Some(department));

    let engine = WorkflowEngine::new(db.pool().clone());
    let item = inventory.add_item(&keeper, new_item("WS-1006")).await.unwrap();

    // Walk a request to approval so the item is referenced by it.
    let request = engine
        .submit_request(
            &staff,
            NewRequest {
                item_description: "3d printer".into(),
                quantity: 1,
                urgency: Urgency::Medium,
                justification: "prototyping".into(),
            },
        )
        .await
        .unwrap();
    engine
        .decide_request(&head, request.id, &Decision::approve())
        .await
        .unwrap();
    engine
        .decide_request(&dean, request.id, &Decision::approve())
        .await
        .unwrap();
    engine
        .decide_request(&keeper, request.id, &Decision::approve_with_item(item.id))
        .await
        .unwrap();

    let err = inventory.delete_item(&admin, item.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    // Unreferenced items can be removed, and only by admins.
    let other = inventory.add_item(&keeper, new_item("WS-1007")).await.unwrap();
    let err = inventory.delete_item(&keeper, other.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");
    inventory.delete_item(&admin, other.id).await.unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let gone = store::items::fetch(&mut conn, other.id).await.unwrap();
    assert!(gone.is_none());
}

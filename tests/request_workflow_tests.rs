//! End-to-end tests for the request approval chain against a real SQLite
//! store: stage order, approver stamps, rejection short-circuits, and the
//! item side effects of final approval.

use tempfile::TempDir;
use uuid::Uuid;

use custodian::store;
use custodian::{
    Actor, DatabaseManager, Decision, EntityKind, InventoryService, ItemStatus, NewItem,
    NewRequest, Request, RequestStatus, Role, Urgency, WorkflowEngine, WorkflowError,
};

async fn setup() -> (TempDir, DatabaseManager) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("custodian.db").display());
    let db = DatabaseManager::new(&url, 5, true).await.expect("database");
    (dir, db)
}

fn actor(role: Role, department: Uuid) -> Actor {
    Actor::new(Uuid::new_v4(), "test", role, Some(department))
}

fn request_input(urgency: Urgency) -> NewRequest {
    NewRequest {
        item_description: "portable projector".into(),
        quantity: 1,
        urgency,
        justification: "lecture hall upgrades".into(),
    }
}

async fn fetch_request(engine: &WorkflowEngine, id: Uuid) -> Request {
    let mut conn = engine.pool().acquire().await.unwrap();
    store::requests::fetch(&mut conn, id)
        .await
        .unwrap()
        .expect("request row")
}

#[tokio::test]
async fn staff_request_walks_the_full_chain() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);
    let dean = actor(Role::Dean, department);
    let keeper = actor(Role::Storekeeper, department);

    let request = engine
        .submit_request(&staff, request_input(Urgency::Medium))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::PendingDeptHead);
    assert_eq!(request.version, 0);

    let request = engine
        .decide_request(&head, request.id, &Decision::approve())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::PendingDean);
    assert_eq!(request.dept_head_approver_id, Some(head.id));

    let request = engine
        .decide_request(&dean, request.id, &Decision::approve())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::PendingStorekeeper);
    assert_eq!(request.dean_approver_id, Some(dean.id));

    let request = engine
        .decide_request(&keeper, request.id, &Decision::approve())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.storekeeper_approver_id, Some(keeper.id));
    assert_eq!(request.version, 3);
    // Approval without a named item allocates nothing.
    assert_eq!(request.allocated_item_id, None);

    let mut conn = engine.pool().acquire().await.unwrap();
    let trail = store::audit::list_for_entity(&mut conn, EntityKind::Request, request.id)
        .await
        .unwrap();
    assert_eq!(trail.len(), 4, "submit plus three decisions");
    assert_eq!(trail[0].from_status, None);
    assert_eq!(trail[3].to_status, "approved");
}

#[tokio::test]
async fn dept_head_rejection_stores_reason_and_creates_no_item() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);

    let request = engine
        .submit_request(&staff, request_input(Urgency::Critical))
        .await
        .unwrap();

    let request = engine
        .decide_request(&head, request.id, &Decision::reject("budget"))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Rejected);
    assert_eq!(request.rejection_reason.as_deref(), Some("budget"));
    assert_eq!(request.allocated_item_id, None);

    let mut conn = engine.pool().acquire().await.unwrap();
    let items = store::items::list(&mut conn).await.unwrap();
    assert!(items.is_empty(), "rejection must not create items");
}

#[tokio::test]
async fn dept_head_self_request_is_directly_allocated() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let head = actor(Role::DepartmentHead, department);
    let dean = actor(Role::Dean, department);
    let keeper = actor(Role::Storekeeper, department);

    let request = engine
        .submit_request(&head, request_input(Urgency::High))
        .await
        .unwrap();
    // Self-approval is skipped: entry at the dean with the stamp already set.
    assert_eq!(request.status, RequestStatus::PendingDean);
    assert_eq!(request.dept_head_approver_id, Some(head.id));

    let request = engine
        .decide_request(&dean, request.id, &Decision::approve())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::PendingStorekeeper);

    let request = engine
        .decide_request(&keeper, request.id, &Decision::approve())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
    let item_id = request.allocated_item_id.expect("direct allocation");

    let mut conn = engine.pool().acquire().await.unwrap();
    let items = store::items::list(&mut conn).await.unwrap();
    assert_eq!(items.len(), 1, "exactly one item created");
    let item = store::items::fetch(&mut conn, item_id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Allocated);
    assert_eq!(item.custodian_id, Some(head.id));
    assert_eq!(item.owner_department_id, Some(department));
}

#[tokio::test]
async fn storekeeper_approval_allocates_the_named_item() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let inventory = InventoryService::new(db.pool().clone(), engine.events().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);
    let dean = actor(Role::Dean, department);
    let keeper = actor(Role::Storekeeper, department);

    let item = inventory
        .add_item(
            &keeper,
            NewItem {
                name: "portable projector".into(),
                description: None,
                asset_tag: "AV-1001".into(),
            },
        )
        .await
        .unwrap();

    let request = engine
        .submit_request(&staff, request_input(Urgency::Low))
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
    let request = engine
        .decide_request(&keeper, request.id, &Decision::approve_with_item(item.id))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Approved);
    assert_eq!(request.allocated_item_id, Some(item.id));

    let mut conn = engine.pool().acquire().await.unwrap();
    let item = store::items::fetch(&mut conn, item.id).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Allocated);
    assert_eq!(item.custodian_id, Some(staff.id));
    assert_eq!(item.owner_department_id, Some(department));
}

#[tokio::test]
async fn failed_allocation_rolls_back_the_approval() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let inventory = InventoryService::new(db.pool().clone(), engine.events().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);
    let dean = actor(Role::Dean, department);
    let keeper = actor(Role::Storekeeper, department);

    let item = inventory
        .add_item(
            &keeper,
            NewItem {
                name: "microscope".into(),
                description: None,
                asset_tag: "LAB-2002".into(),
            },
        )
        .await
        .unwrap();
    inventory.mark_damaged(&keeper, item.id).await.unwrap();

    let request = engine
        .submit_request(&staff, request_input(Urgency::Medium))
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

    let err = engine
        .decide_request(&keeper, request.id, &Decision::approve_with_item(item.id))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)), "got {err:?}");

    // The whole transaction rolled back: the request is still pending.
    let request = fetch_request(&engine, request.id).await;
    assert_eq!(request.status, RequestStatus::PendingStorekeeper);
    assert_eq!(request.storekeeper_approver_id, None);
    assert_eq!(request.allocated_item_id, None);
}

#[tokio::test]
async fn acting_on_a_terminal_request_fails_without_state_change() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);

    let request = engine
        .submit_request(&staff, request_input(Urgency::Low))
        .await
        .unwrap();
    let request = engine
        .decide_request(&head, request.id, &Decision::reject("duplicate"))
        .await
        .unwrap();
    let version_before = request.version;

    let err = engine
        .decide_request(&head, request.id, &Decision::approve())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyTerminal { .. }), "got {err:?}");

    let request = fetch_request(&engine, request.id).await;
    assert_eq!(request.status, RequestStatus::Rejected);
    assert_eq!(request.version, version_before);
}

#[tokio::test]
async fn wrong_role_for_the_stage_is_invalid() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let dean = actor(Role::Dean, department);

    let request = engine
        .submit_request(&staff, request_input(Urgency::Medium))
        .await
        .unwrap();

    let err = engine
        .decide_request(&dean, request.id, &Decision::approve())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidStage { .. }), "got {err:?}");
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let head = actor(Role::DepartmentHead, Uuid::new_v4());

    let err = engine
        .decide_request(&head, Uuid::new_v4(), &Decision::approve())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn stale_write_is_refused_by_the_status_guard() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);

    let submitted = engine
        .submit_request(&staff, request_input(Urgency::Medium))
        .await
        .unwrap();
    engine
        .decide_request(&head, submitted.id, &Decision::approve())
        .await
        .unwrap();

    // A writer still holding the pre-decision snapshot must not win.
    let mut stale = submitted.clone();
    stale.status = RequestStatus::PendingDean;
    stale.version += 1;
    let mut conn = engine.pool().acquire().await.unwrap();
    let applied = store::requests::cas_apply(&mut conn, &stale, RequestStatus::PendingDeptHead)
        .await
        .unwrap();
    assert!(!applied, "stale status guard must reject the write");
}

#[tokio::test]
async fn concurrent_decisions_have_a_single_winner() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);
    let rival = actor(Role::DepartmentHead, department);

    let request = engine
        .submit_request(&staff, request_input(Urgency::High))
        .await
        .unwrap();

    let decision = Decision::approve();
    let (a, b) = tokio::join!(
        engine.decide_request(&head, request.id, &decision),
        engine.decide_request(&rival, request.id, &decision),
    );
    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one approval may land");
    let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
    // The loser either lost the row race or observed the already-advanced
    // stage, depending on interleaving; both refuse the double-advance.
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        WorkflowError::Conflict { .. } | WorkflowError::InvalidStage { .. }
    ));

    let request = fetch_request(&engine, request.id).await;
    assert_eq!(request.status, RequestStatus::PendingDean);
    assert_eq!(request.version, 1, "only one transition applied");
}

#[tokio::test]
async fn every_transition_emits_a_change_event() {
    let (_dir, db) = setup().await;
    let engine = WorkflowEngine::new(db.pool().clone());
    let department = Uuid::new_v4();

    let staff = actor(Role::Staff, department);
    let head = actor(Role::DepartmentHead, department);

    let mut events = engine.subscribe();
    let request = engine
        .submit_request(&staff, request_input(Urgency::Medium))
        .await
        .unwrap();
    engine
        .decide_request(&head, request.id, &Decision::approve())
        .await
        .unwrap();

    let submitted = events.recv().await.unwrap();
    assert_eq!(submitted.entity_kind, EntityKind::Request);
    assert_eq!(submitted.entity_id, request.id);
    assert_eq!(submitted.version, 0);

    let decided = events.recv().await.unwrap();
    assert_eq!(decided.entity_id, request.id);
    assert_eq!(decided.version, 1);
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing::Instrument;
use uuid::Uuid;

mod config;
mod database;
mod domain;
mod inventory;
mod store;
mod telemetry;
mod workflow;

use config::CustodianConfig;
use database::DatabaseManager;
use domain::{Actor, NewItem, NewRequest, NewTransfer, Role};
use inventory::InventoryService;
use workflow::{ChangeBus, Decision, WorkflowEngine};

#[derive(Parser)]
#[command(name = "custodian")]
#[command(about = "Asset approval and transfer workflow service")]
#[command(
    long_about = "Custodian tracks item requests and custody transfers through their \
                  approval chains: department head, dean, storekeeper, receiver. Every \
                  decision is one atomic transaction; concurrent decisions on the same \
                  entity are serialized and the loser is told to refresh."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and initialize the database
    Init {
        /// Overwrite an existing custodian.toml
        #[arg(long, help = "Overwrite existing configuration file")]
        force: bool,
    },
    /// Register a new item into the central store (storekeeper/admin)
    AddItem {
        #[arg(long, help = "Acting user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Acting role: storekeeper or admin")]
        role: Role,
        #[arg(long, help = "Item name")]
        name: String,
        #[arg(long, help = "Unique asset tag, e.g. IT-0042")]
        tag: String,
        #[arg(long, help = "Optional free-form description")]
        description: Option<String>,
    },
    /// Submit an item request into the approval chain
    SubmitRequest {
        #[arg(long, help = "Requester user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Requester role")]
        role: Role,
        #[arg(long, help = "Requester's department id (UUID)")]
        department: Uuid,
        #[arg(long, help = "What is being requested")]
        description: String,
        #[arg(long, default_value = "1", help = "Quantity requested")]
        quantity: i64,
        #[arg(long, default_value = "medium", help = "low, medium, high or critical")]
        urgency: domain::Urgency,
        #[arg(long, help = "Why the item is needed")]
        justification: String,
    },
    /// Approve or reject a pending request at your stage
    DecideRequest {
        /// Request id (UUID)
        request_id: Uuid,
        #[arg(long, help = "Acting user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Acting role")]
        role: Role,
        #[arg(long, help = "approve or reject")]
        action: String,
        #[arg(long, help = "Comment, stored as rejection reason on reject")]
        comment: Option<String>,
        #[arg(long, help = "Existing available item to allocate (storekeeper approval)")]
        allocate_item: Option<Uuid>,
    },
    /// Initiate a custody transfer of an allocated item
    CreateTransfer {
        #[arg(long, help = "Initiator user id (UUID), usually the current custodian")]
        actor: Uuid,
        #[arg(long, help = "Initiator role")]
        role: Role,
        #[arg(long, help = "Item id (UUID)")]
        item: Uuid,
        #[arg(long, help = "Receiving user id (UUID)")]
        receiver: Uuid,
        #[arg(long, help = "Receiving user's department id (UUID)")]
        receiver_department: Uuid,
    },
    /// Approve, accept or reject a pending transfer at your stage
    DecideTransfer {
        /// Transfer id (UUID)
        transfer_id: Uuid,
        #[arg(long, help = "Acting user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Acting role")]
        role: Role,
        #[arg(long, help = "approve or reject")]
        action: String,
        #[arg(long, help = "Comment, stored as rejection reason on reject")]
        comment: Option<String>,
    },
    /// Return an allocated item to the central store (storekeeper/admin)
    ReturnItem {
        /// Item id (UUID)
        item_id: Uuid,
        #[arg(long, help = "Acting user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Acting role")]
        role: Role,
    },
    /// Move an item through its maintenance lifecycle (storekeeper/admin)
    Maintenance {
        /// Item id (UUID)
        item_id: Uuid,
        #[arg(long, help = "Acting user id (UUID)")]
        actor: Uuid,
        #[arg(long, help = "Acting role")]
        role: Role,
        #[arg(long, help = "start, finish or damaged")]
        op: String,
    },
    /// Show pending requests and transfers, and the item inventory
    Status {
        #[arg(long, help = "Include terminal requests and transfers")]
        all: bool,
    },
    /// List notifications for a recipient
    Notifications {
        #[arg(long, help = "Recipient user id (UUID)")]
        recipient: Uuid,
    },
    /// Show the transition history of a request, transfer or item
    History {
        /// request, transfer or item
        kind: workflow::EntityKind,
        /// Entity id (UUID)
        entity_id: Uuid,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = CustodianConfig::load()?;
    telemetry::init_telemetry(
        &config.observability.log_level,
        config.observability.json_logs,
    )?;

    let result = tokio::runtime::Runtime::new()?.block_on(run(cli, config));
    telemetry::shutdown_telemetry();
    result
}

async fn run(cli: Cli, config: CustodianConfig) -> Result<()> {
    if let Commands::Init { force } = &cli.command {
        return init_command(&config, *force).await;
    }

    let db = DatabaseManager::new(
        &config.database.url,
        config.database.max_connections,
        config.database.auto_migrate,
    )
    .await
    .with_context(|| format!("opening database {}", config.database.url))?;
    let bus = ChangeBus::new(config.workflow.event_capacity);
    let engine = WorkflowEngine::with_events(db.pool().clone(), bus.clone());
    let inventory = InventoryService::new(db.pool().clone(), bus);

    let outcome = dispatch(cli.command, &engine, &inventory).await;
    db.shutdown().await;
    outcome
}

async fn dispatch(
    command: Commands,
    engine: &WorkflowEngine,
    inventory: &InventoryService,
) -> Result<()> {
    match command {
        Commands::Init { .. } => unreachable!("handled before the database opens"),
        Commands::AddItem {
            actor,
            role,
            name,
            tag,
            description,
        } => {
            let actor = cli_actor(actor, role, None);
            let item = inventory
                .add_item(
                    &actor,
                    NewItem {
                        name,
                        description,
                        asset_tag: tag,
                    },
                )
                .await?;
            print_entity("item", &item)
        }
        Commands::SubmitRequest {
            actor,
            role,
            department,
            description,
            quantity,
            urgency,
            justification,
        } => {
            let requester = cli_actor(actor, role, Some(department));
            let request = engine
                .submit_request(
                    &requester,
                    NewRequest {
                        item_description: description,
                        quantity,
                        urgency,
                        justification,
                    },
                )
                .await?;
            print_entity("request", &request)
        }
        Commands::DecideRequest {
            request_id,
            actor,
            role,
            action,
            comment,
            allocate_item,
        } => {
            let decision = Decision::parse(&action, comment, allocate_item)?;
            let actor = cli_actor(actor, role, None);
            let correlation_id = telemetry::generate_correlation_id();
            let span = telemetry::create_decision_span(
                "request",
                request_id,
                role.as_str(),
                Some(&correlation_id),
            );
            let request = engine
                .decide_request(&actor, request_id, &decision)
                .instrument(span)
                .await?;
            print_entity("request", &request)
        }
        Commands::CreateTransfer {
            actor,
            role,
            item,
            receiver,
            receiver_department,
        } => {
            let initiator = cli_actor(actor, role, None);
            let transfer = engine
                .create_transfer(
                    &initiator,
                    NewTransfer {
                        item_id: item,
                        receiver_id: receiver,
                        receiver_department_id: receiver_department,
                    },
                )
                .await?;
            print_entity("transfer", &transfer)
        }
        Commands::DecideTransfer {
            transfer_id,
            actor,
            role,
            action,
            comment,
        } => {
            let decision = Decision::parse(&action, comment, None)?;
            let actor = cli_actor(actor, role, None);
            let correlation_id = telemetry::generate_correlation_id();
            let span = telemetry::create_decision_span(
                "transfer",
                transfer_id,
                role.as_str(),
                Some(&correlation_id),
            );
            let transfer = engine
                .decide_transfer(&actor, transfer_id, &decision)
                .instrument(span)
                .await?;
            print_entity("transfer", &transfer)
        }
        Commands::ReturnItem {
            item_id,
            actor,
            role,
        } => {
            let actor = cli_actor(actor, role, None);
            let item = inventory.return_item(&actor, item_id).await?;
            print_entity("item", &item)
        }
        Commands::Maintenance {
            item_id,
            actor,
            role,
            op,
        } => {
            let actor = cli_actor(actor, role, None);
            let item = match op.as_str() {
                "start" => inventory.begin_maintenance(&actor, item_id).await?,
                "finish" => inventory.finish_maintenance(&actor, item_id).await?,
                "damaged" => inventory.mark_damaged(&actor, item_id).await?,
                other => anyhow::bail!("unknown maintenance op: {other} (expected start, finish or damaged)"),
            };
            print_entity("item", &item)
        }
        Commands::Status { all } => status_command(engine, inventory, all).await,
        Commands::Notifications { recipient } => {
            let mut conn = engine.pool().acquire().await?;
            let notices = store::notifications::list_for(&mut conn, recipient).await?;
            println!("{} notification(s)", notices.len());
            for notice in &notices {
                let marker = if notice.read { " " } else { "*" };
                println!(
                    "{marker} [{}] {} {}: {}",
                    notice.created_at, notice.entity_kind, notice.entity_id, notice.message
                );
            }
            Ok(())
        }
        Commands::History { kind, entity_id } => {
            let mut conn = engine.pool().acquire().await?;
            let trail = store::audit::list_for_entity(&mut conn, kind, entity_id).await?;
            println!("{} transition(s)", trail.len());
            for record in &trail {
                println!(
                    "[{}] {} -> {} by {} ({}){}",
                    record.created_at,
                    record.from_status.as_deref().unwrap_or("-"),
                    record.to_status,
                    record.actor_id,
                    record.actor_role,
                    record
                        .comment
                        .as_deref()
                        .map(|c| format!(": {c}"))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

async fn init_command(config: &CustodianConfig, force: bool) -> Result<()> {
    let config_path = Path::new("custodian.toml");
    if config_path.exists() && !force {
        println!("custodian.toml already exists, use --force to overwrite");
    } else {
        CustodianConfig::write_default(config_path)?;
        println!("Wrote {}", config_path.display());
    }

    let db = DatabaseManager::new(&config.database.url, config.database.max_connections, true)
        .await
        .with_context(|| format!("initializing database {}", config.database.url))?;
    db.shutdown().await;
    println!("Database ready at {}", config.database.url);
    Ok(())
}

async fn status_command(
    engine: &WorkflowEngine,
    inventory: &InventoryService,
    all: bool,
) -> Result<()> {
    let mut conn = engine.pool().acquire().await?;
    let requests = store::requests::list(&mut conn, !all).await?;
    let transfers = store::transfers::list(&mut conn, !all).await?;
    drop(conn);
    let items = inventory.list_items().await?;

    println!(
        "{} request(s), {} transfer(s), {} item(s)",
        requests.len(),
        transfers.len(),
        items.len()
    );
    for request in &requests {
        println!(
            "request {} [{}] {} x{} ({})",
            request.id, request.status, request.item_description, request.quantity, request.urgency
        );
    }
    for transfer in &transfers {
        println!(
            "transfer {} [{}] item {} -> receiver {}",
            transfer.id, transfer.status, transfer.item_id, transfer.receiver_id
        );
    }
    for item in &items {
        println!(
            "item {} [{}] {} ({})",
            item.id, item.status, item.name, item.asset_tag
        );
    }
    Ok(())
}

fn cli_actor(id: Uuid, role: Role, department: Option<Uuid>) -> Actor {
    Actor::new(id, "cli", role, department)
}

fn print_entity<T: serde::Serialize>(label: &str, entity: &T) -> Result<()> {
    println!("{label}: {}", serde_json::to_string_pretty(entity)?);
    Ok(())
}

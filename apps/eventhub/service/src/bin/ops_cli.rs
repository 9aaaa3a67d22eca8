use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eventhub_service::config::Config;
use eventhub_service::domain_store::{DomainStore, EventRegistrationRecord, OrderStatus};
use eventhub_service::observability::Observability;
use eventhub_service::payments::gateway_from_config;
use eventhub_service::reconcile::PaymentReconciler;
use serde_json::json;

#[derive(Parser)]
#[command(name = "eventhub-ops")]
#[command(about = "Operator commands for the EventHub registration store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "users:list")]
    UsersList(StoreArgs),
    #[command(name = "registrations:export")]
    RegistrationsExport(RegistrationsExportArgs),
    #[command(name = "payments:pending")]
    PaymentsPending(StoreArgs),
    #[command(name = "payments:reconcile")]
    PaymentsReconcile(PaymentsReconcileArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// Store file; defaults to EH_DOMAIN_STORE_PATH.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

#[derive(Args)]
struct RegistrationsExportArgs {
    #[command(flatten)]
    store: StoreArgs,
    #[arg(long)]
    event_id: Option<u32>,
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    format: ExportFormat,
    #[arg(long)]
    paid_only: bool,
}

#[derive(Args)]
struct PaymentsReconcileArgs {
    #[command(flatten)]
    store: StoreArgs,
    /// Only orders older than this are queried; defaults to EH_PAYMENT_RECONCILE_GRACE_SECONDS.
    #[arg(long)]
    grace_seconds: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::UsersList(args) => users_list(args).await,
        Commands::RegistrationsExport(args) => registrations_export(args).await,
        Commands::PaymentsPending(args) => payments_pending(args).await,
        Commands::PaymentsReconcile(args) => payments_reconcile(args).await,
    }
}

fn load_config(args: &StoreArgs) -> Result<Config> {
    let mut config = Config::from_env().context("load configuration")?;
    if let Some(path) = args.store.clone() {
        config.domain_store_path = Some(path);
    }

    let Some(path) = config.domain_store_path.as_ref() else {
        bail!("a store file is required: pass --store or set EH_DOMAIN_STORE_PATH");
    };
    if !path.is_file() {
        bail!("store file {} does not exist", path.display());
    }
    Ok(config)
}

async fn users_list(args: StoreArgs) -> Result<()> {
    let config = load_config(&args)?;
    let store = DomainStore::from_config(&config);

    for user in store.list_users().await {
        let line = serde_json::to_string(&json!({
            "uid": user.uid,
            "name": user.name,
            "email": user.email,
            "college": user.college,
            "year": user.year,
            "team_id": user.team_id,
        }))?;
        println!("{line}");
    }
    Ok(())
}

async fn registrations_export(args: RegistrationsExportArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    let store = DomainStore::from_config(&config);

    let rows = store
        .list_registrations()
        .await
        .into_iter()
        .filter(|row| args.event_id.is_none_or(|event_id| row.event_id == event_id))
        .filter(|row| !args.paid_only || row.payment_details.is_some())
        .collect::<Vec<EventRegistrationRecord>>();

    match args.format {
        ExportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        ExportFormat::Csv => {
            println!("id,event_id,type,leader_email,participants,payment_status,payment_id,created_at");
            for row in rows {
                let payment_status = serde_json::to_value(row.payment_status)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let fields = [
                    row.id,
                    row.event_id.to_string(),
                    row.kind.as_str().to_string(),
                    row.leader_email,
                    row.participants.join(";"),
                    payment_status,
                    row.payment_details
                        .map(|details| details.payment_id)
                        .unwrap_or_default(),
                    row.created_at.to_rfc3339(),
                ];
                let line = fields
                    .iter()
                    .map(|field| csv_field(field))
                    .collect::<Vec<String>>()
                    .join(",");
                println!("{line}");
            }
        }
    }
    Ok(())
}

async fn payments_pending(args: StoreArgs) -> Result<()> {
    let config = load_config(&args)?;
    let store = DomainStore::from_config(&config);

    for order in store.list_payment_orders(Some(OrderStatus::Created)).await {
        println!("{}", serde_json::to_string(&order)?);
    }
    Ok(())
}

async fn payments_reconcile(args: PaymentsReconcileArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    let gateway = gateway_from_config(&config);
    if !gateway.is_configured() {
        bail!(
            "payment gateway '{}' is not configured",
            config.payment_gateway_mode
        );
    }

    let grace = Duration::from_secs(
        args.grace_seconds
            .unwrap_or(config.payment_reconcile_grace_seconds),
    );
    let store = DomainStore::from_config(&config);
    let reconciler = PaymentReconciler::new(&config, store, gateway, Observability::default());
    let request_id = format!("ops_{}", uuid::Uuid::new_v4().simple());

    let summary = reconciler.reconcile_pending(grace, &request_id).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

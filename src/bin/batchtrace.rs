use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use uuid::Uuid;

use batchtrace::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{self, EventSender},
    services::{
        factory::{ServiceContainer, ServiceFactory},
        lineage_resolver::Direction,
        reconciliation::{RecallBalance, RecallReport, ReadinessSummary},
        traceability::TraceResult,
    },
    validation::parse_date,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Trace(args) => handle_trace(&context, args, cli.json).await?,
        Commands::RecallBalance(args) => handle_recall_balance(&context, args, cli.json).await?,
        Commands::RecallReport(args) => handle_recall_report(&context, args, cli.json).await?,
        Commands::Readiness => handle_readiness(&context, cli.json).await?,
        Commands::Expire(args) => handle_expire(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "batchtrace",
    about = "Batch lineage tracing and recall reconciliation",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Print the genealogy graph of a stock batch
    Trace(TraceArgs),
    /// Affected versus recovered quantities of a recall
    RecallBalance(RecallArgs),
    /// Full recall document payload
    RecallReport(RecallArgs),
    /// Site-wide recall readiness counts
    Readiness,
    /// Expire active batches past their use-by date
    Expire(ExpireArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum TraceDirection {
    Backward,
    Forward,
    Both,
}

#[derive(Args)]
struct TraceArgs {
    /// Batch id or batch code
    #[arg(long)]
    batch: String,
    #[arg(long, value_enum, default_value = "backward")]
    direction: TraceDirection,
}

#[derive(Args)]
struct RecallArgs {
    /// Recall id or recall code
    #[arg(long)]
    recall: String,
}

#[derive(Args)]
struct ExpireArgs {
    /// Reference date, YYYY-MM-DD or DD/MM/YYYY; defaults to today
    #[arg(long)]
    date: Option<String>,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    services: ServiceContainer,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        if config.auto_migrate {
            db::run_migrations(&db)
                .await
                .context("failed to run migrations")?;
        }

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx, None));

        let factory = ServiceFactory::new(db.clone(), Some(event_sender), config.clone());
        let services = ServiceContainer::new(&factory);

        Ok(Self {
            config,
            db,
            services,
        })
    }

    async fn resolve_batch(&self, batch: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(batch) {
            return Ok(id);
        }
        let model = self
            .services
            .traceability
            .resolver()
            .find_batch_by_code(batch)
            .await
            .with_context(|| format!("no stock batch matches '{}'", batch))?;
        Ok(model.id)
    }

    async fn resolve_recall(&self, recall: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(recall) {
            return Ok(id);
        }
        let model = self
            .services
            .recalls
            .find_by_code(recall)
            .await
            .with_context(|| format!("no recall matches '{}'", recall))?;
        Ok(model.id)
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied to {}", context.config.database_url);
    Ok(())
}

async fn handle_trace(context: &CliContext, args: TraceArgs, json: bool) -> Result<()> {
    let batch_id = context.resolve_batch(&args.batch).await?;
    let tracer = &context.services.traceability;

    let results = match args.direction {
        TraceDirection::Backward => vec![tracer.trace(batch_id, Direction::Backward).await?],
        TraceDirection::Forward => vec![tracer.trace(batch_id, Direction::Forward).await?],
        TraceDirection::Both => {
            let (backward, forward) = futures::try_join!(
                tracer.trace(batch_id, Direction::Backward),
                tracer.trace(batch_id, Direction::Forward)
            )?;
            vec![backward, forward]
        }
    };

    if json {
        if let [single] = results.as_slice() {
            print_json(single)?;
        } else {
            print_json(&results)?;
        }
    } else {
        for result in &results {
            render_trace(result);
        }
    }
    Ok(())
}

async fn handle_recall_balance(context: &CliContext, args: RecallArgs, json: bool) -> Result<()> {
    let recall_id = context.resolve_recall(&args.recall).await?;
    let balance = context
        .services
        .reconciliation
        .recall_balance(recall_id)
        .await
        .context("failed to compute recall balance")?;

    if json {
        print_json(&balance)?;
    } else {
        render_balance(&balance);
    }
    Ok(())
}

async fn handle_recall_report(context: &CliContext, args: RecallArgs, json: bool) -> Result<()> {
    let recall_id = context.resolve_recall(&args.recall).await?;
    let report = context
        .services
        .reconciliation
        .recall_report(recall_id)
        .await
        .context("failed to build recall report")?;

    if json {
        print_json(&report)?;
    } else {
        render_report(&report);
    }
    Ok(())
}

async fn handle_readiness(context: &CliContext, json: bool) -> Result<()> {
    let summary = context
        .services
        .reconciliation
        .readiness_summary()
        .await
        .context("failed to compute readiness summary")?;

    if json {
        print_json(&summary)?;
    } else {
        render_readiness(&summary);
    }
    Ok(())
}

async fn handle_expire(context: &CliContext, args: ExpireArgs, json: bool) -> Result<()> {
    let today: NaiveDate = match args.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => Utc::now().date_naive(),
    };
    let expired = context
        .services
        .batches
        .expire_due(today)
        .await
        .context("failed to expire batches")?;

    if json {
        print_json(&expired)?;
    } else if expired.is_empty() {
        println!("No batches past use-by on {}", today);
    } else {
        println!("Expired {} batch(es) as of {}:", expired.len(), today);
        for batch in &expired {
            println!(
                "- {} • use by {}",
                batch.batch_code,
                batch
                    .use_by_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_trace(result: &TraceResult) {
    println!(
        "{:?} trace from {} • {} node(s), {} edge(s)",
        result.direction,
        result.start_node_id,
        result.nodes.len(),
        result.edges.len()
    );
    for node in &result.nodes {
        println!(
            "  [{}] {}{}",
            node.node_type.as_str(),
            node.label,
            node.sublabel
                .as_ref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default()
        );
    }
    for edge in &result.edges {
        let quantity = match (&edge.quantity, &edge.unit) {
            (Some(q), Some(u)) => format!(" {} {}", q, u),
            _ => String::new(),
        };
        println!("  {} -[{}{}]-> {}", edge.from, edge.label.as_str(), quantity, edge.to);
    }
    if let Some(mb) = &result.mass_balance {
        println!(
            "  mass balance: in {} {} • out {} {} • variance {} ({}%)",
            mb.total_input, mb.unit, mb.total_output, mb.unit, mb.variance, mb.variance_percent
        );
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
}

fn render_balance(balance: &RecallBalance) {
    println!(
        "affected {} • recovered {} • unaccounted {}",
        balance.total_affected, balance.total_recovered, balance.unaccounted
    );
    if balance.negative_balance {
        println!("warning: recovered quantity exceeds affected quantity");
    }
}

fn render_report(report: &RecallReport) {
    let header = &report.recall;
    println!(
        "Recall {} • {} • {} • {}",
        header.recall_code, header.recall_type, header.severity, header.status
    );
    println!("Reason: {}", header.reason);
    if report.notification_overdue {
        println!("Regulator notification is OVERDUE");
    }
    println!("Affected batches:");
    for line in &report.affected_batches {
        println!(
            "- {} • {} • affected {} • recovered {} • {}",
            line.batch_code.as_deref().unwrap_or("<missing>"),
            line.batch_type,
            line.quantity_affected,
            line.quantity_recovered,
            line.action_taken
        );
    }
    println!("Notifications:");
    for n in &report.notifications {
        println!(
            "- {} via {} • responded: {}",
            n.customer_name, n.method, n.response_received
        );
    }
    if !report.allergens.is_empty() {
        println!("Allergens: {}", report.allergens.join(", "));
    }
    render_balance(&report.balance);
}

fn render_readiness(summary: &ReadinessSummary) {
    println!("Open recalls: {}", summary.open_recalls);
    println!("Pending affected batches: {}", summary.pending_affected_batches);
    if !summary.overdue_recalls.is_empty() {
        println!("Overdue: {}", summary.overdue_recalls.join(", "));
    }
    for (label, counts) in [
        ("Recalls", &summary.recalls_by_status),
        ("Batches", &summary.batches_by_status),
        ("Suppliers", &summary.suppliers_by_approval),
    ] {
        println!("{}:", label);
        for (status, count) in counts {
            println!("  {}: {}", status, count);
        }
    }
}

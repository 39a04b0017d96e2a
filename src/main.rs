use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use warden::{
    config::AppConfig,
    ingest::{Ingestor, TelegramUpdateSource},
    intake::IntakeService,
    notification::{Notifier, TelegramNotifier},
    persistence::{
        sqlite::SqliteStore,
        traits::{StaffRepository, TicketRepository},
    },
    report::WeeklyReporter,
    supervisor::MonitorSupervisor,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing app.yaml.
    #[arg(long)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the bot and the SLA monitoring supervisor.
    Run,
    /// Builds and sends the weekly report once, then exits.
    Report,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Run => run_supervisor(config_dir).await?,
        Commands::Report => send_report_once(config_dir).await?,
    }

    Ok(())
}

async fn run_supervisor(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_dir)?;
    tracing::debug!(
        database_url = %config.database_url,
        timezone = %config.sla.calendar_timezone,
        "Configuration loaded."
    );

    tracing::debug!("Initializing ticket store...");
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    store.run_migrations().await?;
    tracing::info!("Database migrations completed.");

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config.telegram));
    let update_source = TelegramUpdateSource::new(&config.telegram);
    let audience = config.telegram.notification_chat_id;
    let timezone = config.sla.calendar_timezone;

    let supervisor = Arc::new(
        MonitorSupervisor::builder()
            .config(config)
            .store(Arc::clone(&store) as Arc<dyn TicketRepository>)
            .notifier(Arc::clone(&notifier))
            .build()?,
    );

    // Timer state is not persisted: reconstruct a monitor for every ticket
    // that was open when the process last stopped.
    let restored = supervisor.restore_monitors().await?;
    tracing::info!(restored, "Monitors restored for open tickets.");

    let intake = Arc::new(IntakeService::new(
        Arc::clone(&store) as Arc<dyn TicketRepository>,
        Arc::clone(&store) as Arc<dyn StaffRepository>,
        Arc::clone(&notifier),
        Arc::clone(&supervisor),
        audience,
    ));
    let ingestor = Ingestor::new(
        Box::new(update_source),
        intake,
        supervisor.cancellation_token().child_token(),
    );
    let reporter = WeeklyReporter::new(
        Arc::clone(&store) as Arc<dyn TicketRepository>,
        Arc::clone(&store) as Arc<dyn StaffRepository>,
        Arc::clone(&notifier),
        timezone,
        audience,
        supervisor.cancellation_token().child_token(),
    );

    tracing::info!("Supervisor initialized, starting monitoring...");
    supervisor.run(ingestor, reporter).await?;

    Ok(())
}

async fn send_report_once(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::new(config_dir)?;

    let store = Arc::new(SqliteStore::new(&config.database_url).await?);
    store.run_migrations().await?;

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config.telegram));
    let reporter = WeeklyReporter::new(
        Arc::clone(&store) as Arc<dyn TicketRepository>,
        Arc::clone(&store) as Arc<dyn StaffRepository>,
        notifier,
        config.sla.calendar_timezone,
        config.telegram.notification_chat_id,
        CancellationToken::new(),
    );
    reporter.send_report().await?;

    Ok(())
}

//! Studio console: the admin panels and the guided planner in a terminal.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use studio_backend::cdn::{self, Preset, Transform};
use studio_backend::config::{AppConfig, ConfigError};
use studio_backend::crud::Record;
use studio_backend::db::models::{Lead, LeadPatch, LeadStatus, PortfolioImage, Project};
use studio_backend::error::{require_email, CrudError, GatewayError, ValidationError};
use studio_backend::fetcher::{FetchOptions, FetchState};
use studio_backend::gate;
use studio_backend::gateway::{self, Gateway};
use studio_backend::intake::{self, IntakeFlow, Speaker, Submission};
use studio_backend::panel::{Panel, PanelStatus};

#[derive(Parser, Debug)]
#[command(name = "studio-console", version, about = "Studio admin console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk through the session planner and save the result.
    Plan {
        #[arg(long)]
        email: String,
    },
    /// List the newest leads.
    Leads {
        /// Reload every N seconds until interrupted.
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
    /// List portfolio images in display order.
    Images {
        #[arg(long)]
        category: Option<String>,
    },
    /// List client projects.
    Projects,
    /// Mark a lead as completed.
    CompleteLead { id: Uuid },
    /// Print the CDN delivery URL for an image.
    Cdn {
        url: String,
        #[arg(long, conflicts_with = "preset")]
        width: Option<u32>,
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    Thumbnail,
    Gallery,
    Hero,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Thumbnail => Preset::Thumbnail,
            PresetArg::Gallery => Preset::Gallery,
            PresetArg::Hero => Preset::Hero,
        }
    }
}

#[derive(Debug, Error)]
enum ConsoleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Crud(#[from] CrudError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Panel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("studio_backend=warn,studio_console=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command).await {
        eprintln!("studio-console: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), ConsoleError> {
    if let Commands::Cdn { url, width, preset } = &command {
        println!("{}", cdn_url(url, *width, *preset));
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let (config, warnings) = AppConfig::from_env()?;
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    let gateway = gateway::connect(&config.backend).await?;

    match command {
        Commands::Plan { email } => plan(gateway, &email).await,
        Commands::Leads { watch: None } => {
            let panel = loaded::<Lead>(gateway).await?;
            print_leads(panel.rows());
            Ok(())
        }
        Commands::Leads { watch: Some(secs) } => watch_leads(gateway, secs).await,
        Commands::Images { category } => {
            let panel = loaded::<PortfolioImage>(gateway).await?;
            let images: Vec<&PortfolioImage> = match category.as_deref() {
                Some(category) => gate::filter(panel.rows(), category),
                None => panel.rows().iter().collect(),
            };
            for image in images {
                println!(
                    "{:>3}  {:<12} {}  {}",
                    image.order_index,
                    image.category,
                    image.id,
                    cdn::preset_url(&image.url, Preset::Thumbnail)
                );
            }
            Ok(())
        }
        Commands::Projects => {
            let panel = loaded::<Project>(gateway).await?;
            for project in panel.rows() {
                let budget = project.budget.map(|b| format!("{b:.2}")).unwrap_or_default();
                println!(
                    "{}  {:<12} {:>10}  {}",
                    project.id,
                    project.status.as_str(),
                    budget,
                    project.title
                );
            }
            Ok(())
        }
        Commands::CompleteLead { id } => {
            let mut panel = loaded::<Lead>(gateway).await?;
            let lead = panel
                .update(id, &LeadPatch::status(LeadStatus::Completed))
                .await?;
            println!("{} <{}> is now {}", lead.name, lead.email, lead.status.as_str());
            Ok(())
        }
        Commands::Cdn { .. } => Ok(()),
    }
}

fn cdn_url(url: &str, width: Option<u32>, preset: Option<PresetArg>) -> String {
    match (width, preset) {
        (_, Some(preset)) => cdn::preset_url(url, preset.into()),
        (Some(width), None) => cdn::optimize_url(
            url,
            &Transform::new().format("auto").quality("auto").width(width),
        ),
        (None, None) => cdn::optimize_url(url, &Transform::new().format("auto").quality("auto")),
    }
}

async fn loaded<R: Record>(gateway: Arc<dyn Gateway>) -> Result<Panel<R>, ConsoleError> {
    let mut panel = Panel::<R>::new(gateway);
    panel.load().await;
    match panel.status() {
        PanelStatus::Errored(message) => Err(ConsoleError::Panel(message.clone())),
        _ => Ok(panel),
    }
}

fn print_leads(leads: &[Lead]) {
    for lead in leads {
        println!(
            "{}  {:<10} {}  {} <{}>",
            lead.id,
            lead.status.as_str(),
            lead.created_at.format("%Y-%m-%d"),
            lead.name,
            lead.email
        );
    }
}

async fn watch_leads(gateway: Arc<dyn Gateway>, secs: u64) -> Result<(), ConsoleError> {
    let options = FetchOptions {
        poll_interval: Some(Duration::from_secs(secs.max(1))),
        ..FetchOptions::default()
    };
    let panel = Panel::<Lead>::with_query(gateway, Lead::list_query(), options);
    let shutdown = CancellationToken::new();
    let fetcher = panel.fetcher().clone();
    let mut updates = fetcher.watch();
    let _poller = fetcher.spawn_polling(shutdown.clone());
    let _live = panel.spawn_live(shutdown.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                match state {
                    FetchState::Loaded { data, .. } => {
                        println!("--- {} leads", data.len());
                        print_leads(&data);
                    }
                    FetchState::Errored { message } => eprintln!("reload failed: {message}"),
                    FetchState::Idle | FetchState::Loading => {}
                }
            }
        }
    }
    shutdown.cancel();
    Ok(())
}

async fn plan(gateway: Arc<dyn Gateway>, email: &str) -> Result<(), ConsoleError> {
    require_email(email)?;

    let mut flow = IntakeFlow::new(email);
    let mut shown = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        for message in &flow.messages()[shown..] {
            if message.speaker == Speaker::Asker {
                println!("> {}", message.text);
            }
        }
        shown = flow.messages().len();
        if flow.is_complete() {
            return Ok(());
        }

        let Some(line) = lines.next_line().await? else {
            println!("Planner closed before the last question; nothing was saved.");
            return Ok(());
        };
        if let Submission::Completed(record) = flow.submit_answer(&line) {
            if let Err(e) = intake::spawn_persist(Arc::clone(&gateway), record).await {
                tracing::error!(error = %e, "planner save task failed");
            }
        }
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchestrator::config::{load_config, mask_database_url};
use orchestrator::error::get_error_info;
use orchestrator::scheduler::{
    cluster_config, list_clusters, ConfigBlob, OperatorRequest, RequestOutcome, StateStore,
};
use orchestrator::state::PgStateStore;
use orchestrator::{Config, OrchestratorError, Result, SchedulerRuntimeState};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Offer-driven orchestrator for Riak clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (default: .orchestrator/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON
    Config,

    /// Create the state and request tables
    InitDb {
        /// Database URL, overriding the configured one
        #[arg(short, long)]
        url: Option<String>,
    },

    /// List clusters and their nodes
    Clusters,

    /// Create an empty cluster
    CreateCluster {
        name: String,
    },

    /// Shut down every node of a cluster and retire it
    RemoveCluster {
        name: String,
    },

    /// Restart the nodes of a cluster one at a time
    RestartCluster {
        name: String,
    },

    /// Add a node to a cluster
    AddNode {
        cluster: String,
    },

    /// Shut down and delete one node
    RemoveNode {
        cluster: String,
        node: String,
    },

    /// Replace a cluster's configuration blob with the contents of a file
    SetConfig {
        cluster: String,
        file: PathBuf,
        /// Replace the advanced config instead of the database config
        #[arg(long)]
        advanced: bool,
    },

    /// Print a cluster's configuration blob
    GetConfig {
        cluster: String,
        /// Print the advanced config instead of the database config
        #[arg(long)]
        advanced: bool,
    },

    /// Show a queued request and its outcome
    Request {
        id: i64,
    },
}

fn database_url(config: &Config) -> Result<String> {
    config.database_url.clone().ok_or_else(|| {
        OrchestratorError::ConfigError(
            "database_url is not set (config file or DATABASE_URL)".to_string(),
        )
    })
}

async fn connect(config: &Config) -> Result<PgStateStore> {
    let url = database_url(config)?;
    info!("Connecting to {}", mask_database_url(&url));
    PgStateStore::connect(&url, config.framework_name.clone(), config.store_max_retries).await
}

async fn load_state(config: &Config) -> Result<SchedulerRuntimeState> {
    Ok(connect(config).await?.load().await?.unwrap_or_default())
}

/// Queues a request for the running scheduler, which applies it on its next
/// tick. Nothing touches the scheduler state from here.
async fn submit(config: &Config, request: OperatorRequest) -> Result<()> {
    request.validate()?;
    let id = connect(config).await?.submit_request(&request).await?;
    println!("Queued {} as request {id}", request.as_str());
    println!("Check its outcome with: orchestrator request {id}");
    Ok(())
}

const fn blob(advanced: bool) -> ConfigBlob {
    if advanced {
        ConfigBlob::Advanced
    } else {
        ConfigBlob::Database
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config).await?;
    config.validate()?;

    match cli.command {
        Commands::Config => {
            let mut shown = config.clone();
            shown.database_url = shown.database_url.as_deref().map(mask_database_url);
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(())
        }

        Commands::InitDb { url } => {
            let url = url.map_or_else(|| database_url(&config), Ok)?;
            let store =
                PgStateStore::connect(&url, config.framework_name.clone(), config.store_max_retries)
                    .await?;
            store.initialize_schema().await?;
            println!("Initialized state schema at {}", mask_database_url(&url));
            Ok(())
        }

        Commands::Clusters => {
            let state = load_state(&config).await?;
            println!("{}", serde_json::to_string_pretty(&list_clusters(&state))?);
            Ok(())
        }

        Commands::CreateCluster { name } => {
            submit(&config, OperatorRequest::CreateCluster { cluster: name }).await
        }

        Commands::RemoveCluster { name } => {
            submit(&config, OperatorRequest::RemoveCluster { cluster: name }).await
        }

        Commands::RestartCluster { name } => {
            submit(&config, OperatorRequest::RestartCluster { cluster: name }).await
        }

        Commands::AddNode { cluster } => {
            submit(&config, OperatorRequest::AddNode { cluster }).await
        }

        Commands::RemoveNode { cluster, node } => {
            submit(&config, OperatorRequest::RemoveNode { cluster, node }).await
        }

        Commands::SetConfig {
            cluster,
            file,
            advanced,
        } => {
            let content = tokio::fs::read_to_string(&file).await?;
            submit(
                &config,
                OperatorRequest::SetConfig {
                    cluster,
                    blob: blob(advanced),
                    content,
                },
            )
            .await
        }

        Commands::GetConfig { cluster, advanced } => {
            let state = load_state(&config).await?;
            print!("{}", cluster_config(&state, &cluster, blob(advanced))?);
            Ok(())
        }

        Commands::Request { id } => {
            let queued = connect(&config).await?.request_record(id).await?;
            match queued.outcome {
                None => println!("Request {id} ({}) is pending", queued.request.as_str()),
                Some(RequestOutcome::Applied(message)) => {
                    println!("Request {id} applied: {message}");
                }
                Some(RequestOutcome::Rejected(reason)) => {
                    println!("Request {id} rejected: {reason}");
                }
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error [{}]: {}", e.code(), e);
            if let Some((_, fix)) = get_error_info(e.code()) {
                eprintln!("  Fix: {fix}");
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use granted::{api, config::AppConfig, db, engine::Engine, jobs, mcp};

#[derive(Parser)]
#[command(name = "granted")]
#[command(about = "Grant proposal drafting with RFP coverage tracking")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the background job worker
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Serve the API without polling the job queue
        #[arg(long)]
        no_worker: bool,
    },
    /// Start MCP server via stdio
    Mcp,
    /// Run queued jobs once and exit
    Tick {
        /// Only claim jobs for this session
        #[arg(long)]
        session: Option<Uuid>,

        /// Maximum number of jobs to run
        #[arg(long, default_value = "1")]
        max: usize,
    },
    /// Show database location and queue state
    Status,
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "granted=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // MCP mode: log to stderr so stdout is clean for protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_engine(config: AppConfig) -> anyhow::Result<Engine> {
    let db = match &config.db_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;

    let model = config.language_model();
    Ok(Engine::new(db, model, config))
}

async fn serve(engine: Engine, host: &str, port: u16, worker: bool) -> anyhow::Result<()> {
    tracing::info!("Starting Granted server on port {}", port);

    if worker {
        jobs::spawn_worker(engine.clone(), engine.config().worker_interval);
    }

    let app = api::create_router(engine, api::SecurityConfig::from_env());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Granted server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP mode needs stderr for logging since stdout is the protocol channel
    let use_stderr = matches!(cli.command, Some(Commands::Mcp));
    init_tracing(use_stderr);

    let config = AppConfig::from_env();

    match cli.command {
        Some(Commands::Serve {
            port,
            host,
            no_worker,
        }) => {
            let engine = open_engine(config)?;
            serve(engine, &host, port, !no_worker).await?;
        }
        Some(Commands::Mcp) => {
            let engine = open_engine(config)?;
            mcp::run_stdio_server(engine).await?;
        }
        Some(Commands::Tick { session, max }) => {
            let engine = open_engine(config)?;
            let mut processed = 0;
            for _ in 0..max.max(1) {
                let response = jobs::tick(&engine, session).await?;
                let Some(job) = response.job else {
                    break;
                };
                processed += 1;
                println!("{} {} {}", job.id, job.kind.as_str(), job.status.as_str());
            }
            if processed == 0 {
                println!("No queued jobs");
            }
        }
        Some(Commands::Status) => {
            let engine = open_engine(config)?;
            let projects = engine.db().get_all_projects()?;
            let queued = engine.db().count_jobs_by_status()?;

            println!("Projects: {}", projects.len());
            for (status, count) in queued {
                println!("Jobs {}: {}", status.as_str(), count);
            }
            println!(
                "Model: {}",
                if engine.config().openai_api_key.is_some() {
                    engine.config().model.as_str()
                } else {
                    "offline"
                }
            );
        }
        None => {
            let engine = open_engine(config)?;
            serve(engine, "127.0.0.1", 3000, true).await?;
        }
    }

    Ok(())
}

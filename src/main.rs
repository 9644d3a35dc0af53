use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use agentgraph_core::{AppConfig, EventBus, GraphDefinition, GraphStore, SessionId};
use agentgraph_engine::{ExecutionContext, Graph, WorkerRegistry};
use agentgraph_store::SqliteStore;

#[derive(Parser)]
#[command(name = "agentgraph", version, about = "Dataflow graph runtime for agent workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "agentgraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph once and print its output payload
    Run {
        /// Graph definition file (JSON)
        file: Option<PathBuf>,
        /// Id of a stored graph
        #[arg(long, conflicts_with = "file")]
        id: Option<String>,
        /// Input payload as a JSON object; `-` reads stdin
        #[arg(long)]
        input: Option<String>,
        /// Session id (UUID) for cross-run state
        #[arg(long)]
        session: Option<String>,
        /// Debug run
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        tenant: Option<String>,
        /// Print engine events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Store a graph definition and print its id
    Import {
        file: PathBuf,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Print a stored graph's definition
    Export {
        id: String,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List stored graphs
    Graphs {
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List, take or restore version snapshots of a stored graph
    Versions {
        id: String,
        #[arg(long)]
        tenant: Option<String>,
        /// Snapshot the current graph under this title
        #[arg(long)]
        save: Option<String>,
        /// Replace the graph with snapshot N (0 is newest)
        #[arg(long, conflicts_with = "save")]
        restore: Option<usize>,
    },
    /// Show recent execution log entries
    Logs {
        /// Only entries for this graph
        graph: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Start the HTTP gateway
    Serve,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agentgraph=info,warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "agentgraph", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let db_path = config.store_path();
    let store = Arc::new(SqliteStore::open(&db_path)?);
    debug!(path = %db_path.display(), "Opened store");
    let registry = Arc::new(agentgraph_workers::builtin_registry());

    match cli.command {
        Commands::Run {
            file,
            id,
            input,
            session,
            debug,
            tenant,
            events,
        } => {
            let tenant = tenant.as_deref();
            let mut graph = match (file, id) {
                (Some(path), _) => {
                    let def = read_definition(&path)?;
                    let mut graph = Graph::from_definition(def, registry, config.engine.clone())?
                        .with_store(store.clone());
                    graph.resolve_references(tenant, 0).await?;
                    graph
                }
                (None, Some(id)) => {
                    Graph::load(store.clone(), registry, config.engine.clone(), &id, tenant).await?
                }
                (None, None) => bail!("give a definition file or --id"),
            };

            let input = match input.as_deref() {
                None => serde_json::json!({}),
                Some("-") => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    serde_json::from_str(&text).context("input is not valid JSON")?
                }
                Some(text) => serde_json::from_str(text).context("input is not valid JSON")?,
            };
            if !input.is_object() {
                bail!("input must be a JSON object");
            }

            let bus = EventBus::default();
            if events {
                let mut rx = bus.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = rx.recv().await {
                        if let Ok(line) = serde_json::to_string(&event) {
                            eprintln!("{line}");
                        }
                    }
                });
            }

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                cancel_clone.cancel();
            });

            let mut ctx = ExecutionContext::new()
                .with_input(input)
                .with_credentials(config.tenant_credentials(tenant))
                .with_debug(debug)
                .with_events(bus)
                .with_cancel(cancel)
                .with_deadline(config.engine.run_timeout());
            if let Some(sid) = session {
                let sid = SessionId::from_string(&sid);
                if !sid.is_valid() {
                    warn!(session = %sid, "Session id is not a UUID, state will not be kept");
                }
                ctx = ctx.with_session(sid);
            }

            graph.execute(&mut ctx).await;
            if let Some(error) = ctx.error {
                bail!(error);
            }
            println!("{}", serde_json::to_string_pretty(&ctx.output)?);
        }
        Commands::Import { file, tenant } => {
            let def = read_definition(&file)?;
            // Build it once so unknown kinds and cycles are reported before saving.
            let mut graph = Graph::from_definition(def, registry, config.engine.clone())?
                .with_store(store.clone());
            let id = graph.save(tenant.as_deref()).await?;
            println!("{id}");
        }
        Commands::Export { id, tenant } => {
            let def = store
                .load_graph_definition(&id, tenant.as_deref())
                .await?
                .with_context(|| format!("graph not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&def)?);
        }
        Commands::Graphs { tenant } => {
            for g in store.list_graphs(tenant.as_deref())? {
                println!(
                    "{}  {}  {}  {}",
                    g.id,
                    g.updated_at.format("%Y-%m-%d %H:%M"),
                    g.tenant_id.as_deref().unwrap_or("-"),
                    g.title
                );
            }
        }
        Commands::Versions {
            id,
            tenant,
            save,
            restore,
        } => {
            let tenant = tenant.as_deref();
            let mut graph =
                Graph::load(store.clone(), registry, config.engine.clone(), &id, tenant).await?;
            if let Some(title) = save {
                graph.save_version(&title);
                graph.save(tenant).await?;
                info!(graph_id = %id, title = %title, "Version saved");
            } else if let Some(index) = restore {
                let mut restored = graph.load_version(index)?;
                restored.save(tenant).await?;
                info!(graph_id = %id, index, "Version restored");
                return Ok(());
            }
            for (i, v) in graph.versions().iter().enumerate() {
                println!("{i}  {}  {}", v.timestamp.format("%Y-%m-%d %H:%M"), v.title);
            }
        }
        Commands::Logs { graph, limit } => {
            for entry in store.recent_logs(graph.as_deref(), limit)? {
                println!(
                    "{}  {:?}  {}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.graph_id.as_deref().unwrap_or("-"),
                    entry.message
                );
            }
        }
        Commands::Serve => serve(config, store, registry).await?,
        Commands::Config | Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

async fn serve(
    config: AppConfig,
    store: Arc<SqliteStore>,
    registry: Arc<WorkerRegistry>,
) -> anyhow::Result<()> {
    let bind = config.gateway.clone().unwrap_or_default().bind;
    info!(bind = %bind, "Starting gateway");
    let server = agentgraph_gateway::GatewayServer::new(config, store, registry, EventBus::default());
    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    debug!(path = %path.display(), "No config file, using defaults");
    Ok(AppConfig::default())
}

fn read_definition(path: &Path) -> anyhow::Result<GraphDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

mod caller;
mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mcp::{Client, ServerConfig};
use tools::ToolRegistry;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use error::{Error, Result};

const DEFAULT_QUESTION: &str = "What is the cheapest item available?";
const DUPLEX_BUFFER: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "workshop")]
#[command(about = "MCP tool servers and callers for the workshop examples", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (default: ./workshop.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve an example's tools
    Serve {
        #[arg(value_enum)]
        example: ServeExample,
        /// Listen address (default: server.bind from config)
        #[arg(long, conflicts_with = "stdio")]
        bind: Option<String>,
        /// Serve on stdin/stdout instead of TCP
        #[arg(long)]
        stdio: bool,
    },
    /// Connect to a server and call an example's tools
    Call {
        #[arg(value_enum)]
        example: CallExample,
        /// Server address (default: server.bind from config)
        #[arg(long, conflicts_with_all = ["command", "in_process"])]
        addr: Option<String>,
        /// Spawn the server with this command line and talk to it over stdio
        #[arg(long, conflicts_with = "in_process")]
        command: Option<String>,
        /// Run the server in this process over an in-memory stream
        #[arg(long)]
        in_process: bool,
        /// Question for `ask`
        #[arg(long)]
        question: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ServeExample {
    Calculator,
    Ping,
    Catalog,
}

#[derive(Clone, Copy, ValueEnum)]
enum CallExample {
    Calculator,
    Ping,
    Ask,
}

impl CallExample {
    /// The registry this caller talks to when run in-process.
    fn server(self) -> ServeExample {
        match self {
            Self::Calculator => ServeExample::Calculator,
            Self::Ping => ServeExample::Ping,
            Self::Ask => ServeExample::Catalog,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so the stdio transport keeps stdout to itself.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            example,
            bind,
            stdio,
        } => cmd_serve(&config, example, bind, stdio).await,
        Commands::Call {
            example,
            addr,
            command,
            in_process,
            question,
        } => {
            let client = if in_process {
                connect_in_process(registry(&config, example.server())?).await?
            } else if let Some(command) = command {
                spawn_server(&command).await?
            } else {
                let addr = addr.unwrap_or_else(|| config.server.bind.clone());
                Client::connect_tcp(addr.as_str()).await?
            };

            let mut out = std::io::stdout().lock();
            let outcome = match example {
                CallExample::Calculator => caller::call_calculator(&client, &mut out).await,
                CallExample::Ping => caller::call_ping(&client, &mut out).await,
                CallExample::Ask => {
                    let question = question.as_deref().unwrap_or(DEFAULT_QUESTION);
                    caller::call_ask(&client, question, &mut out).await
                }
            };

            client.shutdown().await?;
            outcome
        }
    }
}

fn registry(config: &Config, example: ServeExample) -> Result<ToolRegistry> {
    let registry = match example {
        ServeExample::Calculator => tools::demos::calculator()?,
        ServeExample::Ping => tools::demos::ping()?,
        ServeExample::Catalog => tools::demos::catalog(&config.catalog())?,
    };
    Ok(registry)
}

async fn cmd_serve(
    config: &Config,
    example: ServeExample,
    bind: Option<String>,
    stdio: bool,
) -> Result<()> {
    let registry = Arc::new(registry(config, example)?);
    tracing::info!(server = registry.name(), tools = ?registry.names(), "registry ready");

    if stdio {
        mcp::serve_stdio(registry).await?;
    } else {
        let bind = bind.unwrap_or_else(|| config.server.bind.clone());
        mcp::serve_tcp(registry, bind.as_str()).await?;
    }
    Ok(())
}

async fn connect_in_process(registry: ToolRegistry) -> Result<Client> {
    let (client_side, server_side) = tokio::io::duplex(DUPLEX_BUFFER);
    let (server_read, server_write) = tokio::io::split(server_side);

    tokio::spawn(async move {
        if let Err(e) = mcp::serve(Arc::new(registry), server_read, server_write).await {
            tracing::error!("in-process server stopped: {e}");
        }
    });

    let (client_read, client_write) = tokio::io::split(client_side);
    Ok(Client::connect("in-process", client_read, client_write).await?)
}

async fn spawn_server(command_line: &str) -> Result<Client> {
    let mut parts = command_line.split_whitespace().map(str::to_string);
    let command = parts
        .next()
        .ok_or_else(|| Error::Mcp(mcp::Error::Spawn("empty server command".into())))?;

    let config = ServerConfig {
        name: command.clone(),
        command,
        args: parts.collect(),
        env: Default::default(),
    };
    Ok(Client::spawn(config).await?)
}

pub mod config;
pub mod daemon;
pub mod index;
pub mod loadgen;
pub mod model;
pub mod search;
pub mod service;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;

use config::{DaemonConfig, ServiceConfig};
use daemon::{DaemonClientConfig, ScreenDaemon, UdsDaemonClient};
use index::{IndexHandle, load_jsonl};
use search::normalize::tokenize;
use service::{RawQuery, SearchResponse, SearchService};

static LONG_VERSION: once_cell::sync::Lazy<String> = once_cell::sync::Lazy::new(|| {
    format!(
        "{} (built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    )
});

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "wscreen",
    version,
    long_version = LONG_VERSION.as_str(),
    about = "Screen names against a sanctioned-entity watchlist"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Screen one name in-process against a records file
    Search {
        /// Watchlist records (JSON Lines: {"id", "name", "metadata"})
        #[arg(long, env = "WSCREEN_RECORDS")]
        records: PathBuf,

        /// Name to screen
        #[arg(long)]
        name: String,

        /// Maximum number of matches
        #[arg(long)]
        limit: Option<String>,

        /// Minimum similarity score in [0, 1]
        #[arg(long = "min-match")]
        min_match: Option<String>,

        /// Print the response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Show which record token each query token was paired with
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Run the screening daemon
    Serve {
        /// Watchlist records loaded at startup and on reload
        #[arg(long, env = "WSCREEN_RECORDS")]
        records: Option<PathBuf>,

        /// Unix socket path
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Screen a name through a running daemon
    Query {
        #[arg(long)]
        name: String,

        #[arg(long)]
        limit: Option<String>,

        #[arg(long = "min-match")]
        min_match: Option<String>,

        /// Deadline for the search in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long)]
        socket: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show daemon status
    Status {
        #[arg(long)]
        socket: Option<PathBuf>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Ask the daemon to re-read its records file
    Reload {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Stop a running daemon
    Stop {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            records,
            name,
            limit,
            min_match,
            json,
            explain,
        } => run_search(
            records,
            RawQuery {
                name: Some(name),
                limit,
                min_match,
            },
            json,
            explain,
        ),
        Commands::Serve { records, socket } => run_serve(records, socket).await,
        Commands::Query {
            name,
            limit,
            min_match,
            timeout_ms,
            socket,
            json,
        } => {
            let client = client_for(socket);
            let raw = RawQuery {
                name: Some(name),
                limit,
                min_match,
            };
            let resp = client.search(raw, timeout_ms.map(Duration::from_millis))?;
            print_response(&resp, json)
        }
        Commands::Status { socket, json } => {
            let status = client_for(socket).status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("uptime:        {}s", status.uptime_secs);
                println!("index epoch:   {}", status.index_epoch);
                println!("index records: {}", status.index_records);
                println!(
                    "queries:       {} completed, {} rejected, {} overloaded, {} timed out",
                    status.service.completed,
                    status.service.rejected,
                    status.service.overloaded,
                    status.service.timed_out
                );
                println!(
                    "in flight:     {}/{}",
                    status.service.in_flight, status.service.max_concurrent
                );
                println!(
                    "memory:        {}",
                    daemon::resource::format_bytes(status.memory_bytes)
                );
            }
            Ok(())
        }
        Commands::Reload { socket } => {
            let resp = client_for(socket).reload()?;
            println!(
                "reloaded {} records as epoch {} in {}ms",
                resp.records, resp.epoch, resp.elapsed_ms
            );
            Ok(())
        }
        Commands::Stop { socket } => {
            client_for(socket).shutdown()?;
            println!("daemon stopping");
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "wscreen", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn run_search(records: PathBuf, raw: RawQuery, json: bool, explain: bool) -> Result<()> {
    let index = load_jsonl(&records)
        .with_context(|| format!("loading watchlist from {}", records.display()))?;
    let handle = Arc::new(IndexHandle::with_index(index));
    let service = SearchService::new(ServiceConfig::from_env(), Arc::clone(&handle));

    let resp = service.search(&raw)?;
    if !explain {
        return print_response(&resp, json);
    }

    let snapshot = handle
        .current()
        .context("watchlist index disappeared during search")?;
    let query_tokens = tokenize(raw.name.as_deref().unwrap_or_default());
    let explained: Vec<_> = resp
        .hits
        .iter()
        .filter_map(|hit| {
            let record = snapshot.get(&hit.id)?;
            Some((hit, search::explain(&query_tokens, record.tokens())))
        })
        .collect();

    if json {
        let rows: Vec<_> = explained
            .iter()
            .map(|(hit, alignment)| serde_json::json!({"hit": hit, "alignment": alignment}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (hit, alignment) in &explained {
        println!("{:.4}  {}  {}", hit.score, hit.id, hit.name);
        for pair in &alignment.pairs {
            println!(
                "        {} -> {} ({:.4})",
                pair.query_token, pair.candidate_token, pair.score
            );
        }
    }
    Ok(())
}

async fn run_serve(records: Option<PathBuf>, socket: Option<PathBuf>) -> Result<()> {
    let mut config = DaemonConfig::from_env();
    if let Some(path) = records {
        config.records_path = Some(path);
    }
    if let Some(path) = socket {
        config.socket_path = path;
    }

    let service = Arc::new(SearchService::with_defaults(Arc::new(IndexHandle::empty())));
    let daemon = Arc::new(ScreenDaemon::new(config, service));

    let signal_daemon = Arc::clone(&daemon);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal_daemon.request_shutdown();
        }
    });

    let listener = daemon.bind().context("binding daemon socket")?;
    tokio::task::spawn_blocking(move || daemon.serve(listener))
        .await
        .context("daemon thread panicked")??;
    Ok(())
}

fn client_for(socket: Option<PathBuf>) -> UdsDaemonClient {
    let mut config = DaemonClientConfig::from_env();
    if let Some(path) = socket {
        config.socket_path = path;
    }
    UdsDaemonClient::new(config)
}

fn print_response(resp: &SearchResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resp)?);
        return Ok(());
    }
    if resp.hits.is_empty() {
        println!(
            "no matches at or above {:.2} ({} records scanned)",
            resp.min_match, resp.records_scanned
        );
        return Ok(());
    }
    for hit in &resp.hits {
        println!("{:.4}  {}  {}", hit.score, hit.id, hit.name);
    }
    Ok(())
}

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use watchlist_screen::daemon::ClientError;
use watchlist_screen::service::SearchError;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match watchlist_screen::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 2 for bad caller input, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(search) = err.downcast_ref::<SearchError>() {
        return if search.status_code() == 400 { 2 } else { 1 };
    }
    if let Some(client) = err.downcast_ref::<ClientError>() {
        return if client.status() == 400 { 2 } else { 1 };
    }
    1
}

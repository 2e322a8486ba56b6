//!
//! board server binary
//! -------------------
//! Command-line entry point for the board HTTP server. Configuration comes from
//! environment variables, overridable by CLI flags (see `--help`).

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use board::config::{self, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if config::has_flag(&args, "--help") || config::has_flag(&args, "-h") {
        print!("{}", config::HELP);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "board", "board_server starting: RUST_LOG='{}'", rust_log);

    let cfg = Config::from_env_and_args(&args);
    board::server::run(cfg).await
}

//! statizen - tails the game log and keeps PVE/PVP statistics up to date.

use clap::Parser;
use std::path::PathBuf;

use statizen_lib::RunOptions;

/// Game log tracker for combat statistics.
#[derive(Parser, Debug)]
#[command(name = "statizen")]
#[command(about = "Tails the game log and folds combat events into persisted statistics", long_about = None)]
struct Args {
    /// Directory holding settings.json and the persisted records.
    #[arg(long, env = "STATIZEN_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Game log to tail instead of the configured one.
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Process whatever is new in the log once, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    statizen_lib::init_tracing();

    statizen_lib::run(RunOptions {
        config_dir: args.config_dir,
        log_path: args.log_path,
        once: args.once,
    })
    .await?;

    Ok(())
}

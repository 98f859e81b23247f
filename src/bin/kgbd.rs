//! `kgbd`: thin CLI wiring around [`kgb::server::supervisor`]. All the
//! engineering lives in the library; this binary just parses argv and
//! hands off.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "kgbd", about = "KGB commit-to-IRC relay server")]
struct Args {
    /// Path to the YAML server config.
    #[arg(long)]
    config: PathBuf,

    /// Accepted so the self-restart `exec` path can always pass
    /// it; kgbd only ever runs in the foreground.
    #[arg(long)]
    foreground: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    kgb::server::supervisor::run(args.config, None).await
}

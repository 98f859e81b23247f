//! `kgb-client`: thin CLI wiring a VCS hook invokes once per commit.
//! Reads the commit message on stdin, assembles the RPC params, and
//! submits them through the failover driver. All the engineering lives
//! in the library; this binary just parses argv and hands off.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

use kgb::client::branch_module::Pipeline;
use kgb::client::build_params;
use kgb::client::failover::Failover;
use kgb::commit::{Change, Commit};
use kgb::config::ServerRef;

#[derive(Parser)]
#[command(name = "kgb-client", about = "Submit one commit to a KGB server")]
struct Args {
    /// YAML file listing the KGB servers to submit to.
    #[arg(long)]
    servers: PathBuf,

    #[arg(long)]
    repo_id: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    revision: String,

    #[arg(long = "rev-prefix", default_value = "")]
    rev_prefix: String,

    #[arg(long)]
    author: String,

    /// One `(A)/path`-style change string per occurrence.
    #[arg(long = "change")]
    changes: Vec<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(long)]
    module: Option<String>,

    /// Regex with exactly two capture groups, tried in order against
    /// every changed path when `--branch`/`--module` weren't passed
    /// explicitly (first full match across all paths wins).
    #[arg(long = "branch-module-re")]
    branch_module_re: Vec<String>,

    #[arg(long = "branch-and-module-re-swap")]
    branch_and_module_re_swap: bool,

    #[arg(long, default_value_t = 2)]
    protocol: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut log = String::new();
    std::io::stdin().read_to_string(&mut log)?;

    let mut changes: Vec<Change> = args
        .changes
        .iter()
        .map(|c| Change::parse(c))
        .collect::<Result<_, _>>()?;

    let (branch, module) = resolve_branch_module(&args, &mut changes)?;

    let commit = Commit::from_raw(
        args.revision.clone(),
        args.author.clone(),
        log.into_bytes(),
        changes,
        branch,
        module,
    )?;

    let servers: Vec<ServerRef> = serde_yaml::from_str(&std::fs::read_to_string(&args.servers)?)?;
    let params = build_params(
        args.protocol,
        &args.repo_id,
        &args.password,
        &args.rev_prefix,
        &commit,
    );

    let mut failover = Failover::new(servers);
    let response = failover.submit(params).await?;
    if response.is_ok() {
        Ok(())
    } else {
        anyhow::bail!("server rejected commit: {response:?}")
    }
}

/// Resolves `--branch`/`--module` if given explicitly; otherwise runs
/// the regex pipeline across every changed path (first full match
/// across all of them wins) and rewrites each change's path to the
/// matched prefix stripped off.
fn resolve_branch_module(
    args: &Args,
    changes: &mut [Change],
) -> anyhow::Result<(Option<String>, Option<String>)> {
    if args.branch.is_some() || args.module.is_some() {
        return Ok((args.branch.clone(), args.module.clone()));
    }
    if args.branch_module_re.is_empty() {
        return Ok((None, None));
    }
    let pipeline = Pipeline::new(&args.branch_module_re, args.branch_and_module_re_swap)?;
    let paths: Vec<&str> = changes.iter().map(Change::display_path).collect();
    let (branch, module, stripped) = pipeline.extract_all(&paths);
    for (change, path) in changes.iter_mut().zip(stripped) {
        change.path = path;
    }
    Ok((branch, module))
}

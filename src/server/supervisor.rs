//! The process supervisor — owns the live config, the per-network IRC
//! sessions, and the RPC ingress. Drives shutdown, restart and config
//! hot-reload off Unix signals.

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::config::{self, ChannelConfig, Config};
use crate::server::fanout::Fanout;
use crate::server::irc::{self, PolygenOracle, ReconfigureMsg, SessionHandle};
use crate::server::rpc::{self, RpcIngress};

/// The QUIT reason sent to every IRC network on graceful shutdown or
/// restart.
const SHUTDOWN_QUIT_REASON: &str = "KGB going to drink vodka";
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub async fn run(config_path: PathBuf, oracle: Option<Arc<dyn PolygenOracle>>) -> anyhow::Result<()> {
    let mut config = Config::load(&config_path)?;
    let mut sessions = spawn_sessions(&config, oracle.as_ref());
    let mut fanout = Arc::new(Fanout::new(&config, sessions.clone()));
    let mut rpc_ingress = rpc::start(Arc::new(config.clone()), fanout.clone())?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigquit = signal(SignalKind::quit())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                log::info!("received SIGINT, shutting down");
                shutdown(&sessions, rpc_ingress).await;
                wait_for_second_signal(&mut sigint, &mut sigterm).await;
                return Ok(());
            }
            _ = sigterm.recv() => {
                log::info!("received SIGTERM, shutting down");
                shutdown(&sessions, rpc_ingress).await;
                wait_for_second_signal(&mut sigint, &mut sigterm).await;
                return Ok(());
            }
            _ = sigquit.recv() => {
                log::info!("received SIGQUIT, restarting in place");
                shutdown(&sessions, rpc_ingress).await;
                exec_replace(&config_path);
            }
            _ = sighup.recv() => {
                match Config::load(&config_path) {
                    Ok(new_config) => {
                        if config::rpc_bind_changed(&config.global, &new_config.global) {
                            log::info!("rpc bind changed on reload, restarting");
                            shutdown(&sessions, rpc_ingress).await;
                            exec_replace(&config_path);
                        }
                        log::info!("reloading config");
                        reconcile(&mut sessions, &new_config, oracle.as_ref()).await;
                        config = new_config;
                        fanout = Arc::new(Fanout::new(&config, sessions.clone()));
                        rpc_ingress.close();
                        rpc_ingress = rpc::start(Arc::new(config.clone()), fanout.clone())?;
                    }
                    Err(e) => log::error!("failed to reload config, keeping current: {e}"),
                }
            }
        }
    }
}

fn spawn_sessions(
    config: &Config,
    oracle: Option<&Arc<dyn PolygenOracle>>,
) -> HashMap<String, SessionHandle> {
    config
        .networks
        .iter()
        .map(|(name, net_cfg)| {
            let channel_meta = channel_meta_for_network(config, name);
            let handle = irc::spawn(
                name.clone(),
                net_cfg.clone(),
                config.global.admins.clone(),
                config.global.smart_answers.clone(),
                channel_meta,
                oracle.cloned(),
            );
            (name.clone(), handle)
        })
        .collect()
}

fn channel_meta_for_network(config: &Config, network: &str) -> HashMap<String, ChannelConfig> {
    config
        .channels
        .values()
        .filter(|c| c.network == network)
        .map(|c| (c.name.clone(), c.clone()))
        .collect()
}

/// Spawn sessions for newly added networks,
/// shut down sessions for removed ones, and push a [`ReconfigureMsg`]
/// into everything that survives (the session itself decides whether
/// its connection identity changed enough to warrant a respawn).
async fn reconcile(
    sessions: &mut HashMap<String, SessionHandle>,
    new_config: &Config,
    oracle: Option<&Arc<dyn PolygenOracle>>,
) {
    let removed: Vec<String> = sessions
        .keys()
        .filter(|name| !new_config.networks.contains_key(*name))
        .cloned()
        .collect();
    for name in removed {
        if let Some(handle) = sessions.remove(&name) {
            handle.shutdown(SHUTDOWN_QUIT_REASON).await;
        }
    }

    for (name, net_cfg) in &new_config.networks {
        let channel_meta = channel_meta_for_network(new_config, name);
        match sessions.get(name) {
            Some(handle) => {
                handle
                    .reconfigure(ReconfigureMsg {
                        network: net_cfg.clone(),
                        admins: new_config.global.admins.clone(),
                        global_smart_answers: new_config.global.smart_answers.clone(),
                        channel_meta,
                    })
                    .await;
            }
            None => {
                let handle = irc::spawn(
                    name.clone(),
                    net_cfg.clone(),
                    new_config.global.admins.clone(),
                    new_config.global.smart_answers.clone(),
                    channel_meta,
                    oracle.cloned(),
                );
                sessions.insert(name.clone(), handle);
            }
        }
    }
}

async fn shutdown(sessions: &HashMap<String, SessionHandle>, rpc_ingress: RpcIngress) {
    for handle in sessions.values() {
        handle.shutdown(SHUTDOWN_QUIT_REASON).await;
    }
    rpc_ingress.close();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}

/// Give the operator a short window to force an immediate exit with a
/// second signal; otherwise the process has already unwound its
/// sessions above and simply returns.
async fn wait_for_second_signal(sigint: &mut Signal, sigterm: &mut Signal) {
    tokio::select! {
        _ = sigint.recv() => std::process::exit(1),
        _ = sigterm.recv() => std::process::exit(1),
        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
    }
}

/// Replace the current process image with a fresh `kgbd --foreground
/// --config <path>` invocation. Only returns on error, since a
/// successful `exec` never returns to this code.
fn exec_replace(config_path: &Path) -> ! {
    let exe = std::env::current_exe().expect("current_exe");
    let err = Command::new(exe)
        .arg("--foreground")
        .arg("--config")
        .arg(config_path)
        .exec();
    panic!("exec replace failed: {err}");
}

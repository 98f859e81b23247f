//! One task per IRC network, driving the connect → register → join
//! state machine, reconnecting on failure, and delivering fanned-out
//! commit announcements.
//!
//! The event loop is a `tokio::select!` over three sources: a line
//! read off the IRC socket, a reconnect/nick-reclaim timer, and the
//! outbound-PRIVMSG queue fed by the fan-out.

pub mod message;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::config::{network_identity_changed, ChannelConfig, NetworkConfig};
use crate::server::dedup::{fingerprint, OnChannelMru, SeenSet};

use self::message::{ctcp_unwrap, ctcp_wrap, raw_line, Message};

const RECONNECT_RESPAWN_DELAY: Duration = Duration::from_secs(3);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const NICK_RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// A batch of PRIVMSG payload lines for one channel, delivered as a
/// unit so the dedup layer can drop the whole thing together.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub lines: Vec<String>,
}

/// Everything a reload needs to push into a running session without
/// tearing it down, when the network's connection identity hasn't
/// changed.
#[derive(Debug, Clone)]
pub struct ReconfigureMsg {
    pub network: NetworkConfig,
    pub admins: Vec<String>,
    pub global_smart_answers: Vec<String>,
    pub channel_meta: HashMap<String, ChannelConfig>,
}

enum Control {
    Reconfigure(ReconfigureMsg),
    Shutdown { reason: String },
}

/// Seam for an optional polygen-like joke generator. Generating the
/// grammar itself is out of scope here; this trait is the integration
/// point a deployment can fill in.
pub trait PolygenOracle: Send + Sync {
    fn generate(&self, grammar: &str) -> Option<String>;
}

/// Handle a supervisor uses to talk to a running network session.
#[derive(Clone)]
pub struct SessionHandle {
    pub outbound: mpsc::Sender<OutboundMessage>,
    control: mpsc::Sender<Control>,
    /// Pending PRIVMSG lines queued for this network — read by the
    /// RPC ingress admission check.
    pub backlog: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub async fn reconfigure(&self, msg: ReconfigureMsg) {
        let _ = self.control.send(Control::Reconfigure(msg)).await;
    }

    pub async fn shutdown(&self, reason: impl Into<String>) {
        let _ = self
            .control
            .send(Control::Shutdown {
                reason: reason.into(),
            })
            .await;
    }
}

/// Spawn the task owning one IRC network's connection for the
/// lifetime of the process (until told to shut down).
pub fn spawn(
    name: String,
    network: NetworkConfig,
    admins: Vec<String>,
    global_smart_answers: Vec<String>,
    channel_meta: HashMap<String, ChannelConfig>,
    oracle: Option<Arc<dyn PolygenOracle>>,
) -> SessionHandle {
    let (outbound_tx, outbound_rx) = mpsc::channel(1024);
    let (control_tx, control_rx) = mpsc::channel(16);
    let backlog = Arc::new(AtomicUsize::new(0));

    let task_backlog = backlog.clone();
    tokio::spawn(async move {
        run(
            name,
            network,
            admins,
            global_smart_answers,
            channel_meta,
            oracle,
            outbound_rx,
            control_rx,
            task_backlog,
        )
        .await;
    });

    SessionHandle {
        outbound: outbound_tx,
        control: control_tx,
        backlog,
    }
}

struct ChannelState {
    seen: SeenSet,
    mru: OnChannelMru,
}

impl ChannelState {
    fn new() -> Self {
        ChannelState {
            seen: SeenSet::new(),
            mru: OnChannelMru::new(),
        }
    }
}

enum SessionExit {
    Shutdown,
    Disconnected,
    Respawn(NetworkConfig),
}

#[allow(clippy::too_many_arguments)]
async fn run(
    name: String,
    mut network: NetworkConfig,
    mut admins: Vec<String>,
    mut global_smart_answers: Vec<String>,
    mut channel_meta: HashMap<String, ChannelConfig>,
    oracle: Option<Arc<dyn PolygenOracle>>,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    mut control_rx: mpsc::Receiver<Control>,
    backlog: Arc<AtomicUsize>,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        match connect(&network).await {
            Ok(stream) => {
                backoff = Duration::from_secs(1);
                let exit = session_loop(
                    &name,
                    stream,
                    &mut network,
                    &mut admins,
                    &mut global_smart_answers,
                    &mut channel_meta,
                    oracle.as_deref(),
                    &mut outbound_rx,
                    &mut control_rx,
                    &backlog,
                )
                .await;
                match exit {
                    SessionExit::Shutdown => {
                        log::info!("irc[{name}]: shutting down");
                        return;
                    }
                    SessionExit::Disconnected => {
                        log::warn!("irc[{name}]: disconnected, reconnecting in {backoff:?}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                    SessionExit::Respawn(new_network) => {
                        log::info!("irc[{name}]: identity changed, respawning");
                        network = new_network;
                        tokio::time::sleep(RECONNECT_RESPAWN_DELAY).await;
                    }
                }
            }
            Err(e) => {
                log::warn!("irc[{name}]: connect failed: {e}, retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn connect(network: &NetworkConfig) -> std::io::Result<TcpStream> {
    // TLS is a Non-goal; `network.tls` is accepted by config
    // parsing but never consulted here.
    TcpStream::connect((network.server.as_str(), network.port)).await
}

#[derive(PartialEq)]
enum RegState {
    Connecting,
    Registered,
}

#[allow(clippy::too_many_arguments)]
async fn session_loop(
    name: &str,
    stream: TcpStream,
    network: &mut NetworkConfig,
    admins: &mut Vec<String>,
    global_smart_answers: &mut Vec<String>,
    channel_meta: &mut HashMap<String, ChannelConfig>,
    oracle: Option<&dyn PolygenOracle>,
    outbound_rx: &mut mpsc::Receiver<OutboundMessage>,
    control_rx: &mut mpsc::Receiver<Control>,
    backlog: &Arc<AtomicUsize>,
) -> SessionExit {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let desired_nick = network.nick.clone();
    let mut current_nick = desired_nick.clone();
    let mut using_transient = false;
    let mut reg_state = RegState::Connecting;
    let mut nickserv_sent = false;
    let mut joined_channels: Vec<String> = Vec::new();
    let mut channels: HashMap<String, ChannelState> = HashMap::new();
    let mut rng = rand::thread_rng();

    if let Some(pass) = &network.password {
        if write_half
            .write_all(raw_line("PASS", &[pass]).as_bytes())
            .await
            .is_err()
        {
            return SessionExit::Disconnected;
        }
    }
    let register = format!(
        "{}{}",
        raw_line("NICK", &[&current_nick]),
        raw_line("USER", &[&network.username, "0", "*", &network.ircname])
    );
    if write_half.write_all(register.as_bytes()).await.is_err() {
        return SessionExit::Disconnected;
    }

    let mut reclaim_timer = tokio::time::interval(NICK_RECLAIM_INTERVAL);
    reclaim_timer.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            n = reader.read_line(&mut line) => {
                let n = match n {
                    Ok(n) => n,
                    Err(_) => return SessionExit::Disconnected,
                };
                if n == 0 {
                    return SessionExit::Disconnected;
                }
                let msg = Message::parse(&line);
                line.clear();
                let Some(msg) = msg else { continue };

                if handle_line(
                    &msg,
                    &mut write_half,
                    &current_nick,
                    &desired_nick,
                    &mut using_transient,
                    &mut reg_state,
                    &mut nickserv_sent,
                    network,
                    admins,
                    global_smart_answers,
                    channel_meta,
                    oracle,
                    &mut channels,
                    &mut rng,
                ).await.is_err() {
                    return SessionExit::Disconnected;
                }
                if let Message { command, params, .. } = &msg {
                    if command == "NICK" {
                        if let Some((old_nick, _, _)) = msg.prefix_parts() {
                            if old_nick == current_nick {
                                if let Some(new_nick) = params.first() {
                                    current_nick = new_nick.clone();
                                    using_transient = current_nick != desired_nick;
                                }
                            }
                        }
                    }
                }
            }

            _ = reclaim_timer.tick() => {
                if using_transient && reg_state == RegState::Registered {
                    let _ = write_half.write_all(raw_line("NICK", &[&desired_nick]).as_bytes()).await;
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(msg) => {
                        backlog.fetch_sub(msg.lines.len().min(backlog.load(Ordering::Relaxed)), Ordering::Relaxed);
                        if reg_state == RegState::Registered {
                            let state = channels.entry(msg.channel.clone()).or_insert_with(ChannelState::new);
                            if deliver(&mut write_half, state, &msg.channel, &msg.lines).await.is_err() {
                                return SessionExit::Disconnected;
                            }
                        }
                    }
                    None => return SessionExit::Shutdown,
                }
            }

            control = control_rx.recv() => {
                match control {
                    Some(Control::Shutdown { reason }) => {
                        let _ = write_half.write_all(raw_line("QUIT", &[&reason]).as_bytes()).await;
                        return SessionExit::Shutdown;
                    }
                    Some(Control::Reconfigure(cfg)) => {
                        *admins = cfg.admins;
                        *global_smart_answers = cfg.global_smart_answers;
                        *channel_meta = cfg.channel_meta;
                        if network_identity_changed(network, &cfg.network) {
                            return SessionExit::Respawn(cfg.network);
                        }
                        let additions: Vec<String> = cfg.network.channels.iter()
                            .filter(|c| !network.channels.contains(c))
                            .cloned().collect();
                        let removals: Vec<String> = network.channels.iter()
                            .filter(|c| !cfg.network.channels.contains(c))
                            .cloned().collect();
                        for c in &additions {
                            let _ = write_half.write_all(raw_line("JOIN", &[c]).as_bytes()).await;
                        }
                        for c in &removals {
                            let _ = write_half.write_all(raw_line("PART", &[c]).as_bytes()).await;
                            channels.remove(c);
                            joined_channels.retain(|j| j != c);
                        }
                        network.channels = cfg.network.channels;
                    }
                    None => return SessionExit::Shutdown,
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_line(
    msg: &Message,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    current_nick: &str,
    desired_nick: &str,
    using_transient: &mut bool,
    reg_state: &mut RegState,
    nickserv_sent: &mut bool,
    network: &NetworkConfig,
    admins: &[String],
    global_smart_answers: &[String],
    channel_meta: &HashMap<String, ChannelConfig>,
    oracle: Option<&dyn PolygenOracle>,
    channels: &mut HashMap<String, ChannelState>,
    rng: &mut impl Rng,
) -> std::io::Result<()> {
    match msg.command.as_str() {
        "PING" => {
            let target = msg.param(0).unwrap_or("");
            write_half.write_all(raw_line("PONG", &[target]).as_bytes()).await?;
        }
        "001" => {
            // Welcome: registered. Re-join every configured channel
            // (also covers the reconnect case).
            *reg_state = RegState::Registered;
            if let Some(pw) = &network.nickserv_password {
                if !*nickserv_sent {
                    let line = format!("IDENTIFY {pw}");
                    write_half
                        .write_all(raw_line("PRIVMSG", &["NickServ", &line]).as_bytes())
                        .await?;
                    *nickserv_sent = true;
                }
            }
            for chan in &network.channels {
                write_half.write_all(raw_line("JOIN", &[chan]).as_bytes()).await?;
            }
        }
        "433" | "436" | "437" => {
            if *reg_state != RegState::Registered {
                let suffix: u32 = rng.gen_range(1000..10000);
                let transient = format!("{desired_nick}_{suffix}");
                write_half.write_all(raw_line("NICK", &[&transient]).as_bytes()).await?;
                *using_transient = true;
            }
        }
        "PRIVMSG" => {
            handle_privmsg(msg, write_half, current_nick, network, admins, global_smart_answers, channel_meta, oracle, channels, rng).await?;
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_privmsg(
    msg: &Message,
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    current_nick: &str,
    _network: &NetworkConfig,
    admins: &[String],
    global_smart_answers: &[String],
    channel_meta: &HashMap<String, ChannelConfig>,
    oracle: Option<&dyn PolygenOracle>,
    channels: &mut HashMap<String, ChannelState>,
    rng: &mut impl Rng,
) -> std::io::Result<()> {
    let Some(target) = msg.param(0) else { return Ok(()) };
    let Some(text) = msg.param(1) else { return Ok(()) };
    let Some((sender_nick, sender_user, sender_host)) = msg.prefix_parts() else {
        return Ok(());
    };
    let sender_mask = format!("{sender_nick}!{sender_user}@{sender_host}");

    // CTCP is answered regardless of addressing/privacy.
    if let Some(ctcp) = ctcp_unwrap(text) {
        if let Some(reply) = ctcp_reply(ctcp) {
            write_half
                .write_all(raw_line("NOTICE", &[sender_nick, &ctcp_wrap(&reply)]).as_bytes())
                .await?;
        }
        return Ok(());
    }

    let is_private = !target.starts_with('#') && !target.starts_with('&');
    let addressed = is_private
        || text
            .split_once([':', ','])
            .map(|(who, _)| who.eq_ignore_ascii_case(current_nick))
            .unwrap_or(false);

    if !addressed {
        // Still worth recording for the fan-out's on-channel MRU
        // when it's a channel message.
        if !is_private {
            let state = channels.entry(target.to_string()).or_insert_with(ChannelState::new);
            state.mru.observe(fingerprint(target, text));
        }
        return Ok(());
    }

    let remainder = if is_private {
        text.to_string()
    } else {
        text.split_once([':', ',']).map(|(_, r)| r.trim().to_string()).unwrap_or_default()
    };

    let reply_target = if is_private { sender_nick } else { target };
    let is_admin = admin_match(admins, &sender_mask);

    if let Some(bang) = remainder.strip_prefix('!') {
        if is_admin {
            let reply = match bang {
                "version" => "Tried /CTCP <nick> VERSION?".to_string(),
                other => format!("command '{other}' is not known"),
            };
            write_half
                .write_all(raw_line("PRIVMSG", &[reply_target, &reply]).as_bytes())
                .await?;
        }
        return Ok(());
    }

    if !is_admin {
        let channel_cfg = channel_meta.get(target);
        if let Some(answer) = smart_answer(channel_cfg, global_smart_answers, oracle, rng) {
            write_half
                .write_all(raw_line("PRIVMSG", &[reply_target, &answer]).as_bytes())
                .await?;
        }
    }
    Ok(())
}

fn ctcp_reply(ctcp: &str) -> Option<String> {
    match ctcp {
        "VERSION" => Some("VERSION kgb :a commit-to-irc relay".to_string()),
        "CLIENTINFO" => Some("CLIENTINFO VERSION USERINFO CLIENTINFO SOURCE".to_string()),
        "USERINFO" => Some("USERINFO :KGB relay bot".to_string()),
        "SOURCE" => Some("SOURCE :https://kgb.example.org".to_string()),
        _ => None,
    }
}

fn admin_match(admins: &[String], mask: &str) -> bool {
    admins.iter().any(|pattern| {
        globset::Glob::new(pattern)
            .map(|g| g.compile_matcher().is_match(mask))
            .unwrap_or(false)
    })
}

fn smart_answer(
    channel_cfg: Option<&ChannelConfig>,
    global: &[String],
    oracle: Option<&dyn PolygenOracle>,
    rng: &mut impl Rng,
) -> Option<String> {
    if let Some(cfg) = channel_cfg {
        if let Some(grammar) = &cfg.smart_answers_polygen {
            if let Some(oracle) = oracle {
                if let Some(out) = oracle.generate(grammar) {
                    return Some(out);
                }
            }
        }
    }
    let pool = channel_cfg
        .and_then(|c| c.smart_answers.as_deref())
        .filter(|v| !v.is_empty())
        .unwrap_or(global);
    if pool.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..pool.len());
    Some(pool[idx].clone())
}

async fn deliver(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    state: &mut ChannelState,
    channel: &str,
    lines: &[String],
) -> std::io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let first_plain = crate::color::strip(&lines[0]);
    let fp = fingerprint(channel, &first_plain);
    if state.seen.check_and_insert(fp) {
        log::debug!("dedup: suppressing repeat message on {channel}");
        return Ok(());
    }
    if state.mru.contains(fp) {
        log::debug!("dedup: suppressing message already said on {channel}");
        return Ok(());
    }
    for line in lines {
        write_half
            .write_all(raw_line("PRIVMSG", &[channel, line]).as_bytes())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_match_glob() {
        let admins = vec!["admin!*@*".to_string()];
        assert!(admin_match(&admins, "admin!foo@bar.example.org"));
        assert!(!admin_match(&admins, "random!foo@bar.example.org"));
    }

    #[test]
    fn smart_answer_prefers_channel_pool_over_global() {
        let cfg = ChannelConfig {
            name: "#test".into(),
            network: "net".into(),
            repos: vec![],
            smart_answers: Some(vec!["only-channel-answer".into()]),
            smart_answers_polygen: None,
        };
        let global = vec!["global-answer".to_string()];
        let mut rng = rand::thread_rng();
        let answer = smart_answer(Some(&cfg), &global, None, &mut rng);
        assert_eq!(answer.as_deref(), Some("only-channel-answer"));
    }

    #[test]
    fn smart_answer_falls_back_to_global_when_channel_pool_empty() {
        let cfg = ChannelConfig {
            name: "#test".into(),
            network: "net".into(),
            repos: vec![],
            smart_answers: None,
            smart_answers_polygen: None,
        };
        let global = vec!["global-answer".to_string()];
        let mut rng = rand::thread_rng();
        let answer = smart_answer(Some(&cfg), &global, None, &mut rng);
        assert_eq!(answer.as_deref(), Some("global-answer"));
    }

    #[test]
    fn ctcp_version_has_fixed_reply() {
        assert!(ctcp_reply("VERSION").unwrap().starts_with("VERSION"));
        assert!(ctcp_reply("UNKNOWN").is_none());
    }
}

//! Route a formatted commit to every channel a repository posts to,
//! across however many IRC network sessions are running.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use crate::codec::CommitArgs;
use crate::config::Config;
use crate::server::formatter;
use crate::server::irc::{OutboundMessage, SessionHandle};

/// A snapshot of the routing tables derived from [`Config`], paired
/// with the live session handles to deliver onto. Rebuilt by the
/// supervisor whenever the config reloads; the `SessionHandle`s
/// it holds are cheap clones of the ones actually driving each
/// network's socket.
pub struct Fanout {
    channel_network: HashMap<String, String>,
    repo_channels: HashMap<String, Vec<String>>,
    sessions: HashMap<String, SessionHandle>,
}

impl Fanout {
    pub fn new(config: &Config, sessions: HashMap<String, SessionHandle>) -> Fanout {
        let channel_network = config
            .channels
            .values()
            .map(|c| (c.name.clone(), c.network.clone()))
            .collect();
        Fanout {
            channel_network,
            repo_channels: config.repo_channels(),
            sessions,
        }
    }

    /// Format `args` once per its widest-channel line budget and
    /// enqueue it onto every channel `repo_id` posts to. Returns the
    /// number of channels the commit was routed to (0 means the repo
    /// has no channels configured, which the RPC layer still reports
    /// as success).
    pub fn deliver(&self, repo_id: &str, args: &CommitArgs) -> usize {
        let channels = match self.repo_channels.get(repo_id) {
            Some(c) if !c.is_empty() => c,
            _ => return 0,
        };

        let lines = formatter::format_commit(repo_id, args, channels);

        let mut delivered = 0;
        for channel in channels {
            let Some(network) = self.channel_network.get(channel) else {
                continue;
            };
            let Some(handle) = self.sessions.get(network) else {
                continue;
            };
            let msg = OutboundMessage {
                channel: channel.clone(),
                lines: lines.clone(),
            };
            if handle.outbound.try_send(msg).is_ok() {
                handle.backlog.fetch_add(lines.len(), Ordering::Relaxed);
                delivered += 1;
            } else {
                log::warn!("irc[{network}]: outbound queue full, dropping message for {channel}");
            }
        }
        delivered
    }

    /// Sum of every network's pending-line backlog, used by the RPC
    /// ingress's admission control to decide when to start shedding
    /// load.
    pub fn total_backlog(&self) -> usize {
        self.sessions
            .values()
            .map(|h| h.backlog.load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config::from_str(
            r#"
global:
  rpc_addr: "0.0.0.0"
  rpc_port: 9999
repos:
  test:
    password: "pw"
    channels: ["#test"]
networks:
  freenode:
    server: "irc.example.org"
    channels: ["#test"]
channels:
  "#test":
    name: "#test"
    network: "freenode"
    repos: ["test"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn deliver_with_no_sessions_counts_zero() {
        let config = sample_config();
        let fanout = Fanout::new(&config, HashMap::new());
        let args = CommitArgs::V0 {
            repo_id: "test".into(),
            password: "pw".into(),
            revision: "1".into(),
            changes: vec!["(A)/file".into()],
            log: "add".into(),
            author: "alice".into(),
        };
        assert_eq!(fanout.deliver("test", &args), 0);
    }

    #[test]
    fn deliver_unknown_repo_counts_zero() {
        let config = sample_config();
        let fanout = Fanout::new(&config, HashMap::new());
        let args = CommitArgs::V0 {
            repo_id: "nope".into(),
            password: "pw".into(),
            revision: "1".into(),
            changes: vec![],
            log: "x".into(),
            author: "a".into(),
        };
        assert_eq!(fanout.deliver("nope", &args), 0);
    }

    #[test]
    fn total_backlog_is_zero_with_no_sessions() {
        let config = sample_config();
        let fanout = Fanout::new(&config, HashMap::new());
        assert_eq!(fanout.total_backlog(), 0);
    }
}

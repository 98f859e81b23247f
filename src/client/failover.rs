//! Client failover driver — try a sticky last-good server
//! first, then the rest of the configured servers in shuffled order.

use rand::seq::SliceRandom;

use crate::codec::Response;
use crate::config::ServerRef;
use crate::error::{Error, Result};

pub struct Failover {
    servers: Vec<ServerRef>,
    sticky: Option<usize>,
}

impl Failover {
    pub fn new(servers: Vec<ServerRef>) -> Failover {
        Failover {
            servers,
            sticky: None,
        }
    }

    /// Submit `params` to the sticky server first (if any), then the
    /// rest in shuffled order, stopping at the first one that returns
    /// a non-fault response. A transport error, non-2xx, or RPC fault
    /// are all treated as a failure of that server and the next one is
    /// tried; a server is only marked sticky once it actually answers
    /// the call successfully.
    pub async fn submit(&mut self, params: Vec<serde_json::Value>) -> Result<Response> {
        for idx in self.attempt_order() {
            match super::rpc::call_commit(&self.servers[idx], params.clone()).await {
                Ok(response) if response.is_ok() => {
                    self.sticky = Some(idx);
                    return Ok(response);
                }
                Ok(response) => {
                    log::warn!(
                        "server {} returned a fault: {response:?}",
                        self.servers[idx].uri
                    );
                }
                Err(e) => {
                    log::warn!("server {} failed: {e}", self.servers[idx].uri);
                }
            }
        }
        Err(Error::AllServersFailed)
    }

    fn attempt_order(&self) -> Vec<usize> {
        let mut rest: Vec<usize> = (0..self.servers.len())
            .filter(|&i| Some(i) != self.sticky)
            .collect();
        rest.shuffle(&mut rand::thread_rng());
        match self.sticky {
            Some(idx) => std::iter::once(idx).chain(rest).collect(),
            None => rest,
        }
    }
}

//! The RPC ingress `kgb-client` talks to. The wire format is a small
//! `serde_json`-based envelope (see [`codec::Request`]/[`codec::Response`]),
//! not real JSON-RPC 2.0 — there's no `id`, so routing it through
//! `jsonrpc_core`'s method dispatch would make every call a
//! *notification* and the client would never get a response body back.
//! Instead this serves the envelope directly off
//! `jsonrpc_http_server::ServerBuilder`'s `request_middleware` hook,
//! which hands us the raw hyper request/response and lets `IoHandler`
//! sit empty — we get the same HTTP server plumbing the crate already
//! depends on without going through JSON-RPC call semantics the wire
//! format was never built to match.

use std::sync::Arc;

use jsonrpc_core::IoHandler;
use jsonrpc_http_server::hyper::{Body, Request as HyperRequest, Response as HyperResponse, StatusCode};
use jsonrpc_http_server::{RequestMiddlewareAction, Server, ServerBuilder};

use crate::codec::{self, CommitArgs, Response};
use crate::config::Config;
use crate::error::FaultCode;
use crate::server::fanout::Fanout;

/// Owns the running HTTP listener; dropping/closing it stops accepting
/// new commits (used both on shutdown and on a config reload
/// that rebinds).
pub struct RpcIngress {
    server: Server,
}

impl RpcIngress {
    pub fn close(self) {
        self.server.close();
    }
}

pub fn start(config: Arc<Config>, fanout: Arc<Fanout>) -> std::io::Result<RpcIngress> {
    let io = IoHandler::new();

    let addr = format!("{}:{}", config.global.rpc_addr, config.global.rpc_port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

    let server = ServerBuilder::new(io)
        .threads(4)
        .request_middleware(move |req: HyperRequest<Body>| {
            let config = config.clone();
            let fanout = fanout.clone();
            RequestMiddlewareAction::Respond {
                should_validate_hosts: false,
                response: Box::pin(async move { Ok(handle_envelope(req, &config, &fanout).await) }),
            }
        })
        .start_http(&addr)?;

    log::info!("rpc ingress listening on {addr}");
    Ok(RpcIngress { server })
}

/// Read and decode the posted [`codec::Request`] envelope, dispatch it,
/// and serialize the [`Response`] envelope straight back as the HTTP body.
async fn handle_envelope(
    req: HyperRequest<Body>,
    config: &Config,
    fanout: &Fanout,
) -> HyperResponse<Body> {
    let body = match jsonrpc_http_server::hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => return envelope_response(&Response::fault(FaultCode::Arguments, e.to_string())),
    };

    let request: codec::Request = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return envelope_response(&Response::fault(FaultCode::Arguments, e.to_string())),
    };

    if request.method != "commit" {
        return envelope_response(&Response::fault(
            FaultCode::Arguments,
            format!("unknown method: {}", request.method),
        ));
    }

    let response = match codec::discriminate(&request.params) {
        Ok(commit_args) => handle_commit(config, fanout, commit_args).unwrap_or_else(|fault| fault),
        Err(e) => match e.fault_code() {
            Some(code) => Response::fault(code, e.to_string()),
            None => Response::fault(FaultCode::Arguments, e.to_string()),
        },
    };
    envelope_response(&response)
}

fn envelope_response(response: &Response) -> HyperResponse<Body> {
    let body = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
    HyperResponse::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| HyperResponse::new(Body::empty()))
}

/// Version gate, admission control, repo lookup,
/// authenticate, fan out.
fn handle_commit(config: &Config, fanout: &Fanout, args: CommitArgs) -> Result<Response, Response> {
    let version = args.protocol_version();
    if !config.accepts_protocol(version) {
        return Err(Response::fault(
            FaultCode::Arguments,
            format!("unsupported protocol version {version}"),
        ));
    }

    if fanout.total_backlog() > config.global.queue_limit {
        return Err(Response::fault(FaultCode::Slowdown, "send queue saturated"));
    }

    let repo = config.repos.get(args.repo_id()).ok_or_else(|| {
        Response::fault(
            FaultCode::Arguments,
            format!("unknown repository: {}", args.repo_id()),
        )
    })?;

    let authenticated = match &args {
        // An unauthenticated repo (empty configured password) accepts
        // any v0 password, including the empty one clients send when
        // they have nothing configured.
        CommitArgs::V0 { password, .. } => {
            repo.password.is_empty() || codec::constant_time_eq(password.as_bytes(), repo.password.as_bytes())
        }
        _ => codec::verify_hash(&args, &repo.password),
    };
    if !authenticated {
        return Err(Response::fault(
            FaultCode::Arguments,
            format!("authentication failed for repository {}", args.repo_id()),
        ));
    }

    let delivered = fanout.deliver(args.repo_id(), &args);
    log::info!(
        "commit {} accepted for {} ({} channel(s))",
        args.revision(),
        args.repo_id(),
        delivered
    );
    Ok(Response::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn config_with_repo(password: &str) -> Config {
        Config::from_str(&format!(
            r#"
global:
  rpc_addr: "127.0.0.1"
  rpc_port: 0
  queue_limit: 2
repos:
  test:
    password: "{password}"
    channels: ["#test"]
networks: {{}}
channels: {{}}
"#
        ))
        .unwrap()
    }

    #[test]
    fn v0_empty_repo_password_accepts_anything() {
        let config = config_with_repo("");
        let fanout = Fanout::new(&config, HashMap::new());
        let args = codec::discriminate(&[
            json!("test"),
            json!("whatever"),
            json!("1"),
            json!(["(A)/file"]),
            json!("add file"),
            json!("alice"),
        ])
        .unwrap();
        assert!(handle_commit(&config, &fanout, args).is_ok());
    }

    #[test]
    fn v0_wrong_password_is_rejected() {
        let config = config_with_repo("secret");
        let fanout = Fanout::new(&config, HashMap::new());
        let args = codec::discriminate(&[
            json!("test"),
            json!("wrong"),
            json!("1"),
            json!(["(A)/file"]),
            json!("add file"),
            json!("alice"),
        ])
        .unwrap();
        assert!(handle_commit(&config, &fanout, args).is_err());
    }

    #[test]
    fn backlog_equal_to_queue_limit_is_still_admitted() {
        let config = Config::from_str(
            r#"
global:
  rpc_addr: "127.0.0.1"
  rpc_port: 0
  queue_limit: 0
repos:
  test:
    password: ""
    channels: ["#test"]
networks: {}
channels: {}
"#,
        )
        .unwrap();
        let fanout = Fanout::new(&config, HashMap::new());
        assert_eq!(fanout.total_backlog(), 0);
        let args = codec::discriminate(&[
            json!("test"),
            json!(""),
            json!("1"),
            json!(["(A)/file"]),
            json!("add file"),
            json!("alice"),
        ])
        .unwrap();
        assert!(handle_commit(&config, &fanout, args).is_ok());
    }

    #[test]
    fn unknown_repo_is_rejected() {
        let config = config_with_repo("secret");
        let fanout = Fanout::new(&config, HashMap::new());
        let args = codec::discriminate(&[
            json!("nope"),
            json!("secret"),
            json!("1"),
            json!([]),
            json!("log"),
            json!("alice"),
        ])
        .unwrap();
        assert!(handle_commit(&config, &fanout, args).is_err());
    }
}

//! Client-side modules: the wire call, the failover driver
//! and the branch/module extraction pipeline.

pub mod branch_module;
pub mod failover;
pub mod rpc;

use serde_json::Value;

use crate::codec;
use crate::commit::Commit;

/// Build the positional argument list for the `commit` RPC method at
/// the requested protocol version. `password` is the repo's
/// shared secret: sent in the clear for v0, folded into the checksum
/// for v1/v2. `rev_prefix` is only meaningful (and only sent) at v2.
pub fn build_params(
    version: i64,
    repo_id: &str,
    password: &str,
    rev_prefix: &str,
    commit: &Commit,
) -> Vec<Value> {
    let changes: Vec<String> = commit.changes.iter().map(|c| c.to_string()).collect();

    match version {
        0 => vec![
            Value::from(repo_id),
            Value::from(password),
            Value::from(commit.id.clone()),
            Value::from(changes),
            Value::from(commit.log.clone()),
            Value::from(commit.author.clone()),
        ],
        1 => {
            let checksum = checksum_for(repo_id, commit, password);
            vec![
                Value::from(1),
                Value::from(repo_id),
                Value::from(checksum),
                Value::from(commit.id.clone()),
                Value::from(changes),
                Value::from(commit.log.clone()),
                Value::from(commit.author.clone()),
                opt_value(&commit.branch),
                opt_value(&commit.module),
            ]
        }
        _ => {
            let checksum = checksum_for(repo_id, commit, password);
            vec![
                Value::from(2),
                Value::from(repo_id),
                Value::from(checksum),
                Value::from(rev_prefix),
                Value::from(commit.id.clone()),
                Value::from(changes),
                Value::from(commit.log.clone()),
                Value::from(commit.author.clone()),
                opt_value(&commit.branch),
                opt_value(&commit.module),
            ]
        }
    }
}

fn checksum_for(repo_id: &str, commit: &Commit, password: &str) -> String {
    let changes: Vec<String> = commit.changes.iter().map(|c| c.to_string()).collect();
    codec::auth_hash(
        repo_id,
        &commit.id,
        &changes,
        &commit.log,
        &commit.author,
        commit.branch.as_deref(),
        commit.module.as_deref(),
        password,
    )
}

fn opt_value(field: &Option<String>) -> Value {
    field.clone().map(Value::from).unwrap_or(Value::Null)
}

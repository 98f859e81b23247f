//! The wire codec between client and server: arity discrimination for
//! the `commit` RPC method's positional arguments, the auth checksum,
//! and the request/response envelope carried over HTTP. The envelope
//! is a small JSON-RPC-shaped request/response, served the way
//! `jsonrpc_core`/`jsonrpc_http_server` expect.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::{Error, FaultCode};

/// Positional arguments for the `commit` RPC method, already
/// discriminated by protocol version.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitArgs {
    /// `(repo_id, password, revision, changes[], log, author)`
    V0 {
        repo_id: String,
        password: String,
        revision: String,
        changes: Vec<String>,
        log: String,
        author: String,
    },
    /// `(1, repo_id, checksum, revision, changes[], log, author, branch|null, module|null)`
    V1 {
        repo_id: String,
        checksum: String,
        revision: String,
        changes: Vec<String>,
        log: String,
        author: String,
        branch: Option<String>,
        module: Option<String>,
    },
    /// `(2, repo_id, checksum, rev_prefix, revision, changes[], log, author, branch|null, module|null)`
    V2 {
        repo_id: String,
        checksum: String,
        rev_prefix: String,
        revision: String,
        changes: Vec<String>,
        log: String,
        author: String,
        branch: Option<String>,
        module: Option<String>,
    },
}

impl CommitArgs {
    pub fn protocol_version(&self) -> i64 {
        match self {
            CommitArgs::V0 { .. } => 0,
            CommitArgs::V1 { .. } => 1,
            CommitArgs::V2 { .. } => 2,
        }
    }

    pub fn repo_id(&self) -> &str {
        match self {
            CommitArgs::V0 { repo_id, .. }
            | CommitArgs::V1 { repo_id, .. }
            | CommitArgs::V2 { repo_id, .. } => repo_id,
        }
    }

    pub fn revision(&self) -> &str {
        match self {
            CommitArgs::V0 { revision, .. } | CommitArgs::V1 { revision, .. } => revision,
            CommitArgs::V2 { revision, .. } => revision,
        }
    }

    /// `rev_prefix` as displayed; v0/v1 have none (empty prefix).
    pub fn rev_prefix(&self) -> &str {
        match self {
            CommitArgs::V2 { rev_prefix, .. } => rev_prefix,
            _ => "",
        }
    }

    pub fn changes(&self) -> &[String] {
        match self {
            CommitArgs::V0 { changes, .. }
            | CommitArgs::V1 { changes, .. }
            | CommitArgs::V2 { changes, .. } => changes,
        }
    }

    pub fn log(&self) -> &str {
        match self {
            CommitArgs::V0 { log, .. } | CommitArgs::V1 { log, .. } | CommitArgs::V2 { log, .. } => {
                log
            }
        }
    }

    pub fn author(&self) -> &str {
        match self {
            CommitArgs::V0 { author, .. }
            | CommitArgs::V1 { author, .. }
            | CommitArgs::V2 { author, .. } => author,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            CommitArgs::V0 { .. } => None,
            CommitArgs::V1 { branch, .. } | CommitArgs::V2 { branch, .. } => branch.as_deref(),
        }
    }

    pub fn module(&self) -> Option<&str> {
        match self {
            CommitArgs::V0 { .. } => None,
            CommitArgs::V1 { module, .. } | CommitArgs::V2 { module, .. } => module.as_deref(),
        }
    }
}

/// Decode a raw positional argument list into [`CommitArgs`] by arity
/// discrimination.
///
/// `args[0]` is treated as the protocol version only when it parses as
/// an integer *and* the list isn't exactly 6 long (a bare 6-arg call
/// is always v0, even if `args[0]` happens to look numeric — v0's
/// first field is a repo id, which could coincidentally be all
/// digits).
pub fn discriminate(args: &[serde_json::Value]) -> crate::error::Result<CommitArgs> {
    let as_str = |v: &serde_json::Value| -> Option<String> {
        v.as_str().map(|s| s.to_string())
    };
    let as_str_list = |v: &serde_json::Value| -> Option<Vec<String>> {
        v.as_array()?
            .iter()
            .map(|e| e.as_str().map(|s| s.to_string()))
            .collect()
    };
    let as_opt_str = |v: &serde_json::Value| -> Option<String> {
        if v.is_null() {
            None
        } else {
            v.as_str().map(|s| s.to_string())
        }
    };

    if args.len() == 6 {
        let repo_id = as_str(&args[0]).ok_or_else(|| bad_arity(args.len()))?;
        let password = as_str(&args[1]).ok_or_else(|| bad_arity(args.len()))?;
        let revision = as_str(&args[2]).ok_or_else(|| bad_arity(args.len()))?;
        let changes = as_str_list(&args[3]).ok_or_else(|| bad_arity(args.len()))?;
        let log = as_str(&args[4]).ok_or_else(|| bad_arity(args.len()))?;
        let author = as_str(&args[5]).ok_or_else(|| bad_arity(args.len()))?;
        return Ok(CommitArgs::V0 {
            repo_id,
            password,
            revision,
            changes,
            log,
            author,
        });
    }

    let version = args
        .first()
        .and_then(|v| v.as_i64())
        .ok_or(Error::UnknownProtocolVersion(-1))?;
    let rest = &args[1..];

    match version {
        1 if rest.len() == 8 => Ok(CommitArgs::V1 {
            repo_id: as_str(&rest[0]).ok_or_else(|| bad_arity(args.len()))?,
            checksum: as_str(&rest[1]).ok_or_else(|| bad_arity(args.len()))?,
            revision: as_str(&rest[2]).ok_or_else(|| bad_arity(args.len()))?,
            changes: as_str_list(&rest[3]).ok_or_else(|| bad_arity(args.len()))?,
            log: as_str(&rest[4]).ok_or_else(|| bad_arity(args.len()))?,
            author: as_str(&rest[5]).ok_or_else(|| bad_arity(args.len()))?,
            branch: as_opt_str(&rest[6]),
            module: as_opt_str(&rest[7]),
        }),
        2 if rest.len() == 9 => Ok(CommitArgs::V2 {
            repo_id: as_str(&rest[0]).ok_or_else(|| bad_arity(args.len()))?,
            checksum: as_str(&rest[1]).ok_or_else(|| bad_arity(args.len()))?,
            rev_prefix: as_str(&rest[2]).ok_or_else(|| bad_arity(args.len()))?,
            revision: as_str(&rest[3]).ok_or_else(|| bad_arity(args.len()))?,
            changes: as_str_list(&rest[4]).ok_or_else(|| bad_arity(args.len()))?,
            log: as_str(&rest[5]).ok_or_else(|| bad_arity(args.len()))?,
            author: as_str(&rest[6]).ok_or_else(|| bad_arity(args.len()))?,
            branch: as_opt_str(&rest[7]),
            module: as_opt_str(&rest[8]),
        }),
        0 => Err(Error::BadArity {
            expected: vec![6],
            got: args.len(),
        }),
        v => Err(Error::UnknownProtocolVersion(v)),
    }
}

fn bad_arity(got: usize) -> Error {
    Error::BadArity {
        expected: vec![6, 9, 10],
        got,
    }
}

/// Detect whether `bytes` is valid UTF-8; if not, treat it as Latin-1
/// and transcode, per the client-side normalisation rule. Every
/// Latin-1 byte maps 1:1 onto the Unicode codepoint of the same
/// value, so this never fails.
pub fn normalize_to_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Compute the v1/v2 auth hash: SHA-1 over the UTF-8 byte
/// concatenation of every field in this exact order, no separator, no
/// length prefix. `rev_prefix` is never included (v2 reuses the v1
/// hash).
pub fn auth_hash(
    repo_id: &str,
    revision: &str,
    changes: &[String],
    log: &str,
    author: &str,
    branch: Option<&str>,
    module: Option<&str>,
    password: &str,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(repo_id.as_bytes());
    hasher.update(revision.as_bytes());
    for c in changes {
        hasher.update(c.as_bytes());
    }
    hasher.update(log.as_bytes());
    hasher.update(author.as_bytes());
    if let Some(b) = branch {
        hasher.update(b.as_bytes());
    }
    if let Some(m) = module {
        hasher.update(m.as_bytes());
    }
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute and check the checksum carried by v1/v2 args against the
/// configured repo password.
pub fn verify_hash(args: &CommitArgs, password: &str) -> bool {
    let expected = auth_hash(
        args.repo_id(),
        args.revision(),
        args.changes(),
        args.log(),
        args.author(),
        args.branch(),
        args.module(),
        password,
    );
    let (CommitArgs::V1 { checksum, .. } | CommitArgs::V2 { checksum, .. }) = args else {
        return false;
    };
    constant_time_eq(checksum.as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison, used for both v0 cleartext password
/// checks and v1/v2 hash checks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The RPC envelope sent over HTTP POST to `/?session=<service_name>`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

/// The RPC envelope returned: either plain `"OK"`, or a fault.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ok(String),
    Fault { code: String, faultstring: String },
}

impl Response {
    pub fn ok() -> Response {
        Response::Ok("OK".to_string())
    }

    pub fn fault(code: FaultCode, message: impl Into<String>) -> Response {
        Response::Fault {
            code: code.as_str().to_string(),
            faultstring: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(s) if s == "OK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_changes_on_any_field_mutation() {
        let base = auth_hash("repo", "1", &["a".into()], "log", "alice", None, None, "pw");
        assert_ne!(base, auth_hash("repX", "1", &["a".into()], "log", "alice", None, None, "pw"));
        assert_ne!(base, auth_hash("repo", "2", &["a".into()], "log", "alice", None, None, "pw"));
        assert_ne!(base, auth_hash("repo", "1", &["b".into()], "log", "alice", None, None, "pw"));
        assert_ne!(base, auth_hash("repo", "1", &["a".into()], "lox", "alice", None, None, "pw"));
        assert_ne!(base, auth_hash("repo", "1", &["a".into()], "log", "alicE", None, None, "pw"));
        assert_ne!(base, auth_hash("repo", "1", &["a".into()], "log", "alice", None, None, "px"));
    }

    #[test]
    fn hash_ignores_rev_prefix() {
        // v2's rev_prefix is not part of the hashed tuple at all.
        let h = auth_hash("repo", "1", &[], "log", "alice", None, None, "pw");
        let v2 = CommitArgs::V2 {
            repo_id: "repo".into(),
            checksum: h.clone(),
            rev_prefix: "r".into(),
            revision: "1".into(),
            changes: vec![],
            log: "log".into(),
            author: "alice".into(),
            branch: None,
            module: None,
        };
        assert!(verify_hash(&v2, "pw"));
    }

    #[test]
    fn discriminate_six_args_is_v0() {
        let args = vec![
            json!("test"),
            json!("pw"),
            json!("1"),
            json!(["(A)/file"]),
            json!("add file"),
            json!("alice"),
        ];
        let parsed = discriminate(&args).unwrap();
        assert_eq!(parsed.protocol_version(), 0);
        assert_eq!(parsed.repo_id(), "test");
    }

    #[test]
    fn discriminate_v2_full() {
        let h = auth_hash("test", "1", &["(A)/file".into()], "add file", "alice", None, None, "pw");
        let args = vec![
            json!(2),
            json!("test"),
            json!(h),
            json!("r"),
            json!("1"),
            json!(["(A)/file"]),
            json!("add file"),
            json!("alice"),
            serde_json::Value::Null,
            serde_json::Value::Null,
        ];
        let parsed = discriminate(&args).unwrap();
        assert_eq!(parsed.protocol_version(), 2);
        assert_eq!(parsed.rev_prefix(), "r");
        assert!(verify_hash(&parsed, "pw"));
    }

    #[test]
    fn discriminate_unknown_version_errors() {
        let args = vec![json!(99), json!("test")];
        assert!(discriminate(&args).is_err());
    }

    #[test]
    fn normalize_passes_through_valid_utf8() {
        assert_eq!(normalize_to_utf8("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn normalize_falls_back_to_latin1() {
        // 0xE9 is 'é' in Latin-1 but not valid standalone UTF-8.
        let bytes = [b'h', 0xE9, b'y'];
        assert_eq!(normalize_to_utf8(&bytes), "h\u{E9}y");
    }

    #[test]
    fn constant_time_eq_rejects_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}

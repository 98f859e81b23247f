//! KGB: a commit-to-IRC notification relay.
//!
//! A per-repository `kgb-client` forwards accepted commits over RPC to
//! a `kgbd` server, which authenticates, formats and fans each one out
//! to whatever IRC channels are subscribed to that repository.

pub mod client;
pub mod codec;
pub mod color;
pub mod commit;
pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

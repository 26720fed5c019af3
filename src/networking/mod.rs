#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Gossip networking: HTTP endpoint and reconciliation client.

pub(crate) mod reconciler;
pub mod server;

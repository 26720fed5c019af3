// Copyright (c) 2026 Data Mesher
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! The replicated entity model: hostnames, hosts, networks and the mesh
//! aggregate, with their canonical encodings and merge rules.
//!
//! Merge is last-writer-wins on integer timestamps with deterministic
//! tie-breakers, gated by signature verification; any permutation of a fixed
//! update set converges to the same state.

mod host;
mod hostname;
#[allow(clippy::module_inception)]
mod mesh;
mod network;

pub use host::Host;
pub use hostname::Hostname;
pub use mesh::Mesh;
pub use network::{HostnameOverride, Network, NetworkSettings};

use thiserror::Error;

/// A host is stale once its `last_seen` is older than this many seconds.
pub const STALE_SECONDS: u64 = 60;

/// Model errors.
#[derive(Debug, Error)]
pub enum DataError {
    /// Hostname label is empty, too long, non-ASCII or contains a dot.
    #[error("invalid hostname label")]
    InvalidName,
    /// Host merge was routed to a record with a different public key.
    #[error("host key mismatch")]
    KeyMismatch,
}

/// Enforcement toggles for schema fields that are carried but not yet
/// checked by default (settings signatures, per-host admin signatures).
#[derive(Clone, Copy, Debug, Default)]
pub struct MergePolicy {
    /// Require network settings to carry a valid admin signature before
    /// adopting them.
    pub verify_settings: bool,
    /// Require hosts in non-public networks to carry a valid admin
    /// signature before accepting them.
    pub verify_admin_signatures: bool,
}

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

//! State file persistence and the flat hostname export consumed by a local
//! DNS resolver. All writes go through a sibling temp file, fsync and an
//! atomic rename, so readers only ever see complete documents.

use crate::core::codec::{Document, Map};
use crate::core::crypto::{Signature, VerifyKey};
use crate::core::data::{Mesh, Network};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure; the previous file contents are untouched.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the networks recorded in the state file. A missing or malformed
/// file yields an empty map rather than an error; gossip restores the view.
pub fn load_networks(path: &Path) -> BTreeMap<VerifyKey, Network> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "state file unreadable; starting empty");
            return BTreeMap::new();
        }
    };
    match Document::from_slice(&bytes).and_then(|doc| Mesh::from_document(&doc)) {
        Ok(mesh) => mesh.networks,
        Err(e) => {
            warn!(path = %path.display(), err = %e, "state file malformed; starting empty");
            BTreeMap::new()
        }
    }
}

/// Persist a mesh document to `path` atomically.
pub fn save_document(doc: &Document, path: &Path) -> Result<(), StoreError> {
    atomic_write(path, &doc.to_bytes())
}

/// Write the hostname export: one JSON object per line,
/// `{"hostname": "<name>.<tld>", "ip": "<ipv6>"}`.
///
/// Output order is stable for diffing: networks by id, hosts by public key,
/// hostnames by name. When several hosts hold a signed claim for the same
/// label, only the earliest one (smallest `signed_at`, then signature) is
/// emitted. Per network, admin `hostname_overrides` capture their label
/// (host claims of it are skipped) and are emitted after the network's host
/// lines, in override-list order.
pub fn export_dns(mesh: &Mesh, path: &Path) -> Result<(), StoreError> {
    let mut out = Vec::new();
    for network in mesh.networks.values() {
        let tld = &network.settings.tld;
        let overridden: BTreeSet<&str> = network
            .settings
            .hostname_overrides
            .iter()
            .map(|o| o.hostname.as_str())
            .collect();

        // Earliest signed claim per label, keyed like hostname merge.
        let mut winners: BTreeMap<&str, (u64, &Signature, &VerifyKey)> = BTreeMap::new();
        for host in network.hosts.values() {
            for (name, hostname) in &host.hostnames {
                if let (Some(signed_at), Some(signature)) =
                    (hostname.signed_at, hostname.signature.as_ref())
                {
                    let claim = (signed_at, signature, &host.public_key);
                    winners
                        .entry(name.as_str())
                        .and_modify(|best| {
                            if (claim.0, claim.1) < (best.0, best.1) {
                                *best = claim;
                            }
                        })
                        .or_insert(claim);
                }
            }
        }

        for host in network.hosts.values() {
            for (name, hostname) in &host.hostnames {
                if overridden.contains(name.as_str()) {
                    continue;
                }
                if hostname.is_signed() {
                    let lost = winners
                        .get(name.as_str())
                        .is_some_and(|(_, _, key)| **key != host.public_key);
                    if lost {
                        continue;
                    }
                }
                push_line(&mut out, name, tld, &host.ip.to_string());
            }
        }
        for rewrite in &network.settings.hostname_overrides {
            push_line(&mut out, &rewrite.hostname, tld, &rewrite.address.to_string());
        }
    }
    atomic_write(path, &out)
}

fn push_line(out: &mut Vec<u8>, name: &str, tld: &str, ip: &str) {
    let mut map = Map::new();
    map.insert("hostname".into(), format!("{name}.{tld}").into());
    map.insert("ip".into(), ip.into());
    out.extend_from_slice(&Document::from(map).to_bytes());
    out.push(b'\n');
}

/// Atomic write: sibling temp file, fsync, rename over the target.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

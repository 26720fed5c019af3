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

//! The process-wide aggregate of all networks.

use super::{Host, MergePolicy, Network};
use crate::core::codec::{CodecError, Document, Map};
use crate::core::crypto::{Keypair, VerifyKey};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;
use std::sync::Arc;
use tracing::debug;

/// The process-wide mesh: every known network, plus the record and signing
/// key of this process when it serves.
pub struct Mesh {
    /// Known networks, keyed by admin key.
    pub networks: BTreeMap<VerifyKey, Network>,
    /// This process's own host record, if serving.
    pub self_host: Option<Host>,
    keypair: Option<Arc<Keypair>>,
}

impl Mesh {
    /// Assemble a mesh. Serving nodes pass their keypair and self host;
    /// decoded peer documents carry neither.
    pub fn new(
        networks: BTreeMap<VerifyKey, Network>,
        self_host: Option<Host>,
        keypair: Option<Arc<Keypair>>,
    ) -> Self {
        Self {
            networks,
            self_host,
            keypair,
        }
    }

    /// Merge a peer's view into this one. Unknown networks are adopted with
    /// every host routed through the normal acceptance path.
    pub fn merge(&mut self, other: &Mesh, policy: &MergePolicy) {
        // Stable id snapshot; networks may be inserted while we iterate.
        let ids: Vec<VerifyKey> = other.networks.keys().copied().collect();
        for id in ids {
            let theirs = &other.networks[&id];
            match self.networks.get_mut(&id) {
                Some(ours) => ours.merge(theirs, policy),
                None => {
                    // First contact with a network id: its settings face the
                    // same enforcement gate as a settings update would.
                    if policy.verify_settings && !theirs.settings.verify(&id) {
                        debug!(network = %id, "dropping unknown network without valid admin signature");
                        continue;
                    }
                    let mut fresh = Network {
                        id,
                        settings: theirs.settings.clone(),
                        hosts: BTreeMap::new(),
                    };
                    for host in theirs.hosts.values() {
                        fresh.accept_host(host.clone(), policy);
                    }
                    fresh.drop_shadowed_tentatives();
                    self.networks.insert(id, fresh);
                }
            }
        }
    }

    /// Serialise the mesh's current view, refreshing the self host's
    /// signature first so every transmission carries a fresh `last_seen`.
    pub fn to_document(&mut self, now: u64) -> Document {
        if let (Some(keypair), Some(own)) = (&self.keypair, &mut self.self_host) {
            own.update_signature(keypair, now);
        }
        let own = self.self_host.as_ref();
        let mut map = Map::new();
        for (id, network) in &self.networks {
            map.insert(id.to_base64(), network.to_document(own));
        }
        map.into()
    }

    /// Decode a peer's transport document.
    pub fn from_document(doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("mesh")?;
        let mut networks = BTreeMap::new();
        for (id, value) in map {
            let id = VerifyKey::from_base64(id).map_err(|_| CodecError::InvalidValue("network id"))?;
            networks.insert(id, Network::from_document(id, value)?);
        }
        Ok(Self::new(networks, None, None))
    }

    /// Every host across all networks.
    pub fn all_hosts(&self) -> Vec<&Host> {
        self.networks
            .values()
            .flat_map(|network| network.hosts.values())
            .collect()
    }

    /// Deduplicated `(ip, port)` endpoints of hosts worth a direct refresh,
    /// excluding our own record.
    pub fn stale_targets(&self, now: u64) -> Vec<(Ipv6Addr, u16)> {
        let own_key = self.self_host.as_ref().map(|h| h.public_key);
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for host in self.all_hosts() {
            if Some(host.public_key) == own_key {
                continue;
            }
            if host.is_stale(now) && seen.insert((host.ip, host.port)) {
                targets.push((host.ip, host.port));
            }
        }
        targets
    }
}

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

//! A named namespace of hosts, administered by one Ed25519 key.

use super::{Host, MergePolicy};
use crate::core::codec::{
    bool_field, list_field, map_field, opt_str_field, str_field, u64_field, CodecError, Document,
    Map,
};
use crate::core::crypto::{verify, Signature, VerifyKey};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;
use tracing::debug;

/// An admin-pinned `name -> address` rewrite applied at DNS export time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostnameOverride {
    /// Label the override captures.
    pub hostname: String,
    /// Address every claim of that label resolves to.
    pub address: Ipv6Addr,
}

impl HostnameOverride {
    fn to_document(&self) -> Document {
        let mut map = Map::new();
        map.insert("address".into(), self.address.to_string().into());
        map.insert("hostname".into(), self.hostname.as_str().into());
        map.into()
    }

    fn from_document(doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("hostname_overrides")?;
        Ok(Self {
            hostname: str_field(map, "hostname")?.to_string(),
            address: str_field(map, "address")?
                .parse()
                .map_err(|_| CodecError::InvalidValue("address"))?,
        })
    }
}

/// Network-wide settings, a single last-writer-wins unit owned by the admin
/// key.
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    /// Governs settings conflict resolution; the newer record wins.
    pub last_update: u64,
    /// DNS top-level label used when exporting hostnames.
    pub tld: String,
    /// Public networks skip the per-host admin endorsement.
    pub public: bool,
    /// Additional keys authorised to sign hostnames.
    pub host_signing_keys: Vec<VerifyKey>,
    /// Keys whose host records are rejected outright.
    pub banned_keys: BTreeSet<VerifyKey>,
    /// Post-merge rewrites applied at export, admin only.
    pub hostname_overrides: Vec<HostnameOverride>,
    /// Admin signature over the settings canonical form. Carried in the
    /// schema; checked only when the settings policy flag is on.
    pub signature: Option<Signature>,
}

impl NetworkSettings {
    /// Fresh settings for a network created at `now`.
    pub fn new(tld: &str, public: bool, now: u64) -> Self {
        Self {
            last_update: now,
            tld: tld.to_string(),
            public,
            host_signing_keys: Vec::new(),
            banned_keys: BTreeSet::new(),
            hostname_overrides: Vec::new(),
            signature: None,
        }
    }

    /// Canonical bytes covered by the settings signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        Document::from(self.document_map(false)).to_bytes()
    }

    /// Transport form.
    pub fn to_document(&self) -> Document {
        self.document_map(true).into()
    }

    fn document_map(&self, with_signature: bool) -> Map {
        let mut map = Map::new();
        map.insert(
            "banned_keys".into(),
            Document::List(
                self.banned_keys
                    .iter()
                    .map(|k| k.to_base64().into())
                    .collect(),
            ),
        );
        map.insert(
            "host_signing_keys".into(),
            Document::List(
                self.host_signing_keys
                    .iter()
                    .map(|k| k.to_base64().into())
                    .collect(),
            ),
        );
        map.insert(
            "hostname_overrides".into(),
            Document::List(
                self.hostname_overrides
                    .iter()
                    .map(HostnameOverride::to_document)
                    .collect(),
            ),
        );
        map.insert("last_update".into(), self.last_update.into());
        map.insert("public".into(), self.public.into());
        map.insert("tld".into(), self.tld.as_str().into());
        if with_signature {
            if let Some(signature) = &self.signature {
                map.insert("signature".into(), signature.to_base64().into());
            }
        }
        map
    }

    /// Decode the transport form.
    pub fn from_document(doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("settings")?;

        let mut host_signing_keys = Vec::new();
        for key in list_field(map, "host_signing_keys")? {
            match key {
                Document::Str(s) => host_signing_keys.push(
                    VerifyKey::from_base64(s)
                        .map_err(|_| CodecError::InvalidValue("host_signing_keys"))?,
                ),
                _ => return Err(CodecError::WrongType("host_signing_keys")),
            }
        }

        let mut banned_keys = BTreeSet::new();
        for key in list_field(map, "banned_keys")? {
            match key {
                Document::Str(s) => {
                    banned_keys.insert(
                        VerifyKey::from_base64(s)
                            .map_err(|_| CodecError::InvalidValue("banned_keys"))?,
                    );
                }
                _ => return Err(CodecError::WrongType("banned_keys")),
            }
        }

        let hostname_overrides = list_field(map, "hostname_overrides")?
            .iter()
            .map(HostnameOverride::from_document)
            .collect::<Result<_, _>>()?;

        let signature = opt_str_field(map, "signature")?
            .map(Signature::from_base64)
            .transpose()
            .map_err(|_| CodecError::InvalidValue("signature"))?;

        Ok(Self {
            last_update: u64_field(map, "last_update")?,
            tld: str_field(map, "tld")?.to_string(),
            public: bool_field(map, "public")?,
            host_signing_keys,
            banned_keys,
            hostname_overrides,
            signature,
        })
    }

    /// Check the settings signature under the network admin key.
    pub fn verify(&self, admin: &VerifyKey) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        verify(admin, &self.canonical_bytes(), signature)
    }
}

/// A named namespace of hosts. `id` is the admin's verify key and the map
/// key at the mesh level.
#[derive(Clone, Debug)]
pub struct Network {
    /// Admin verify key.
    pub id: VerifyKey,
    /// Admin-owned settings.
    pub settings: NetworkSettings,
    /// Member hosts, keyed by their public key.
    pub hosts: BTreeMap<VerifyKey, Host>,
}

impl Network {
    /// Fresh network created at `now`.
    pub fn new(id: VerifyKey, tld: &str, public: bool, now: u64) -> Self {
        Self {
            id,
            settings: NetworkSettings::new(tld, public, now),
            hosts: BTreeMap::new(),
        }
    }

    /// Keys authorised to sign hostnames: the admin plus the configured
    /// host-signing keys.
    pub fn authorised_keys(&self) -> Vec<VerifyKey> {
        let mut keys = Vec::with_capacity(1 + self.settings.host_signing_keys.len());
        keys.push(self.id);
        keys.extend(self.settings.host_signing_keys.iter().copied());
        keys
    }

    /// Labels signed by any host other than `except`.
    fn signed_elsewhere(&self, except: &VerifyKey) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for (key, host) in &self.hosts {
            if key == except {
                continue;
            }
            for (name, hostname) in &host.hostnames {
                if hostname.is_signed() {
                    names.insert(name.clone());
                }
            }
        }
        names
    }

    /// Verify and insert a host seen for the first time, dropping claims
    /// that would not have survived a merge.
    pub fn accept_host(&mut self, mut host: Host, policy: &MergePolicy) {
        if self.settings.banned_keys.contains(&host.public_key) {
            debug!(network = %self.id, host = %host.public_key, "dropping banned host");
            return;
        }
        if !host.verify() {
            debug!(network = %self.id, host = %host.public_key, "dropping host with bad signature");
            return;
        }
        let authorised = self.authorised_keys();
        if policy.verify_admin_signatures && !self.settings.public && !host.verify_admin(&authorised)
        {
            debug!(network = %self.id, host = %host.public_key, "dropping host without admin endorsement");
            return;
        }
        let signed_elsewhere = self.signed_elsewhere(&host.public_key);
        host.sanitize_hostnames(&authorised, &signed_elsewhere);
        self.hosts.insert(host.public_key, host);
    }

    /// Drop tentative claims whose label is signed by another host. Run
    /// after every merge so a freshly accepted signed claim evicts the
    /// tentative ones it shadows, regardless of arrival order.
    pub(crate) fn drop_shadowed_tentatives(&mut self) {
        let mut signed = BTreeSet::new();
        for host in self.hosts.values() {
            for (name, hostname) in &host.hostnames {
                if hostname.is_signed() {
                    signed.insert(name.clone());
                }
            }
        }
        for host in self.hosts.values_mut() {
            host.hostnames
                .retain(|name, hostname| hostname.is_signed() || !signed.contains(name));
        }
    }

    /// Merge another view of the same network.
    pub fn merge(&mut self, other: &Network, policy: &MergePolicy) {
        if other.settings.last_update > self.settings.last_update {
            if policy.verify_settings && !other.settings.verify(&self.id) {
                debug!(network = %self.id, "dropping settings update without valid admin signature");
            } else {
                self.settings = other.settings.clone();
                let banned = self.settings.banned_keys.clone();
                self.hosts.retain(|key, _| !banned.contains(key));
            }
        }

        // Stable key snapshot; hosts are inserted while we go.
        let keys: Vec<VerifyKey> = other.hosts.keys().copied().collect();
        for key in keys {
            let theirs = &other.hosts[&key];
            if self.settings.banned_keys.contains(&key) {
                debug!(network = %self.id, host = %key, "dropping banned host");
                continue;
            }
            let authorised = self.authorised_keys();
            let signed_elsewhere = self.signed_elsewhere(&key);
            if let Some(ours) = self.hosts.get_mut(&key) {
                // Key mismatch is impossible here; both sides are keyed by `key`.
                let _ = ours.merge(theirs, &authorised, &signed_elsewhere);
            } else {
                self.accept_host(theirs.clone(), policy);
            }
        }
        self.drop_shadowed_tentatives();
    }

    /// Transport form. `self_host_override` is the freshly re-signed record
    /// of the serialising process, injected over any stored copy unless the
    /// key is banned.
    pub fn to_document(&self, self_host_override: Option<&Host>) -> Document {
        let mut hosts = Map::new();
        for (key, host) in &self.hosts {
            hosts.insert(key.to_base64(), host.to_document());
        }
        if let Some(own) = self_host_override {
            if !self.settings.banned_keys.contains(&own.public_key) {
                hosts.insert(own.public_key.to_base64(), own.to_document());
            }
        }
        let mut map = Map::new();
        map.insert("hosts".into(), hosts.into());
        map.insert("settings".into(), self.settings.to_document());
        map.into()
    }

    /// Decode the transport form for the network keyed by `id`.
    pub fn from_document(id: VerifyKey, doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("network")?;
        let settings = NetworkSettings::from_document(
            map.get("settings")
                .ok_or(CodecError::MissingField("settings"))?,
        )?;

        let mut hosts = BTreeMap::new();
        for (key, value) in map_field(map, "hosts")? {
            let public_key =
                VerifyKey::from_base64(key).map_err(|_| CodecError::InvalidValue("hosts"))?;
            hosts.insert(public_key, Host::from_document(public_key, value)?);
        }

        Ok(Self { id, settings, hosts })
    }
}

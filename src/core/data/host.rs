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

//! A node's self-advertisement inside one network.

use super::{DataError, Hostname, STALE_SECONDS};
use crate::core::codec::{
    map_field, opt_str_field, str_field, u64_field, CodecError, Document, Map,
};
use crate::core::crypto::{verify, Keypair, Signature, VerifyKey};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv6Addr;
use tracing::debug;

/// A host record, self-signed by the key that is also its identity.
#[derive(Clone, Debug)]
pub struct Host {
    /// The host's identity inside the network.
    pub public_key: VerifyKey,
    /// Reachable IPv6 address.
    pub ip: Ipv6Addr,
    /// Gossip port, 1..=65535.
    pub port: u16,
    /// Unix seconds; monotone per signer.
    pub last_seen: u64,
    /// Claimed names, keyed by label.
    pub hostnames: BTreeMap<String, Hostname>,
    /// Signature over the canonical `{ip, port, last_seen, hostnames}` form.
    pub signature: Option<Signature>,
    /// Optional admin endorsement over `{ip, public_key}` for non-public
    /// networks. Carried in the schema; enforcement is policy-gated.
    pub admin_signature: Option<Signature>,
}

impl Host {
    /// Fresh host record with no claims yet.
    pub fn new(public_key: VerifyKey, ip: Ipv6Addr, port: u16) -> Self {
        Self {
            public_key,
            ip,
            port,
            last_seen: 0,
            hostnames: BTreeMap::new(),
            signature: None,
            admin_signature: None,
        }
    }

    /// Canonical bytes covered by the host's own signature. Hostname values
    /// use their inner form, which keeps `signed_at` but omits the claim
    /// signature itself.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut names = Map::new();
        for (name, hostname) in &self.hostnames {
            names.insert(name.clone(), hostname.host_canonical_document());
        }
        let mut map = Map::new();
        map.insert("hostnames".into(), names.into());
        map.insert("ip".into(), self.ip.to_string().into());
        map.insert("last_seen".into(), self.last_seen.into());
        map.insert("port".into(), u64::from(self.port).into());
        Document::from(map).to_bytes()
    }

    /// Canonical bytes covered by an admin endorsement.
    pub fn admin_canonical_bytes(&self) -> Vec<u8> {
        let mut map = Map::new();
        map.insert("ip".into(), self.ip.to_string().into());
        map.insert("public_key".into(), self.public_key.to_base64().into());
        Document::from(map).to_bytes()
    }

    /// Transport form (map value keyed by the public key at network level).
    pub fn to_document(&self) -> Document {
        let mut names = Map::new();
        for (name, hostname) in &self.hostnames {
            names.insert(name.clone(), hostname.to_document());
        }
        let mut map = Map::new();
        map.insert("hostnames".into(), names.into());
        map.insert("ip".into(), self.ip.to_string().into());
        map.insert("last_seen".into(), self.last_seen.into());
        map.insert("port".into(), u64::from(self.port).into());
        if let Some(signature) = &self.signature {
            map.insert("signature".into(), signature.to_base64().into());
        }
        if let Some(admin_signature) = &self.admin_signature {
            map.insert(
                "admin_signature".into(),
                admin_signature.to_base64().into(),
            );
        }
        map.into()
    }

    /// Decode the transport form for the host keyed by `public_key`.
    pub fn from_document(public_key: VerifyKey, doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("host")?;

        let ip: Ipv6Addr = str_field(map, "ip")?
            .parse()
            .map_err(|_| CodecError::InvalidValue("ip"))?;
        let port = u64_field(map, "port")?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(CodecError::InvalidValue("port"))?;
        let last_seen = u64_field(map, "last_seen")?;

        let mut hostnames = BTreeMap::new();
        for (name, value) in map_field(map, "hostnames")? {
            hostnames.insert(name.clone(), Hostname::from_document(name, value)?);
        }

        let signature = Signature::from_base64(str_field(map, "signature")?)
            .map_err(|_| CodecError::InvalidValue("signature"))?;
        let admin_signature = opt_str_field(map, "admin_signature")?
            .map(Signature::from_base64)
            .transpose()
            .map_err(|_| CodecError::InvalidValue("admin_signature"))?;

        Ok(Self {
            public_key,
            ip,
            port,
            last_seen,
            hostnames,
            signature: Some(signature),
            admin_signature,
        })
    }

    /// Refresh `last_seen` and re-sign. The timestamp is bumped past the
    /// previous one even when the clock has not advanced, so successive
    /// records from the same signer stay ordered.
    pub fn update_signature(&mut self, keypair: &Keypair, now: u64) {
        self.last_seen = now.max(self.last_seen.saturating_add(1));
        self.signature = Some(keypair.sign(&self.canonical_bytes()));
    }

    /// Recompute canonical bytes and check the self-signature.
    pub fn verify(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        verify(&self.public_key, &self.canonical_bytes(), signature)
    }

    /// Check the admin endorsement under the authorised key set.
    pub fn verify_admin(&self, authorised: &[VerifyKey]) -> bool {
        let Some(signature) = &self.admin_signature else {
            return false;
        };
        let bytes = self.admin_canonical_bytes();
        authorised.iter().any(|key| verify(key, &bytes, signature))
    }

    /// Whether this record is old enough to be worth a direct refresh.
    pub fn is_stale(&self, now: u64) -> bool {
        now.saturating_sub(self.last_seen) > STALE_SECONDS
    }

    /// Merge a newer record for the same key.
    ///
    /// `authorised` is the enclosing network's hostname-signing key set;
    /// `signed_elsewhere` the labels already signed by a different host of
    /// the same network (tentative claims must not shadow them).
    pub fn merge(
        &mut self,
        other: &Host,
        authorised: &[VerifyKey],
        signed_elsewhere: &BTreeSet<String>,
    ) -> Result<(), DataError> {
        if other.public_key != self.public_key {
            return Err(DataError::KeyMismatch);
        }
        if other.last_seen <= self.last_seen {
            return Ok(());
        }
        if !other.verify() {
            debug!(host = %other.public_key, "dropping host update with bad signature");
            return Ok(());
        }

        self.ip = other.ip;
        self.port = other.port;
        self.last_seen = other.last_seen;
        self.signature = other.signature.clone();
        self.admin_signature = other.admin_signature.clone();

        for (name, theirs) in &other.hostnames {
            if theirs.is_signed() && !theirs.verify(authorised) {
                debug!(host = %self.public_key, name = %name, "dropping hostname with bad signature");
                continue;
            }
            match self.hostnames.get_mut(name) {
                Some(ours) => ours.merge(theirs),
                None => {
                    if !theirs.is_signed() && signed_elsewhere.contains(name) {
                        debug!(host = %self.public_key, name = %name, "tentative claim conflicts with a signed one");
                        continue;
                    }
                    self.hostnames.insert(name.clone(), theirs.clone());
                }
            }
        }
        Ok(())
    }

    /// Drop claims that would not have been accepted through merge: signed
    /// claims failing verification and tentative claims shadowing a label
    /// signed by another host. Applied to records entering a network for
    /// the first time.
    pub(crate) fn sanitize_hostnames(
        &mut self,
        authorised: &[VerifyKey],
        signed_elsewhere: &BTreeSet<String>,
    ) {
        self.hostnames.retain(|name, hostname| {
            if hostname.is_signed() {
                if hostname.verify(authorised) {
                    true
                } else {
                    debug!(host = %self.public_key, name = %name, "dropping hostname with bad signature");
                    false
                }
            } else if signed_elsewhere.contains(name) {
                debug!(host = %self.public_key, name = %name, "tentative claim conflicts with a signed one");
                false
            } else {
                true
            }
        });
    }
}

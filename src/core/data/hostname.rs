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

//! A claimed short name inside a network.

use super::DataError;
use crate::core::codec::{opt_str_field, opt_u64_field, CodecError, Document, Map};
use crate::core::crypto::{verify, Keypair, Signature, VerifyKey};

/// A hostname claim. Unsigned claims are tentative; signed claims carry the
/// timestamp and signature of a network host-signing key and win conflicts
/// by earliest `signed_at`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hostname {
    /// Claimed label, unique within a host. ASCII, 1..=63 bytes, no dots.
    pub name: String,
    /// When the claim was signed; present iff `signature` is.
    pub signed_at: Option<u64>,
    /// Signature over the canonical `{name, signed_at}` form.
    pub signature: Option<Signature>,
}

fn valid_label(name: &str) -> bool {
    !name.is_empty() && name.len() <= 63 && name.is_ascii() && !name.contains('.')
}

impl Hostname {
    /// New tentative claim.
    pub fn new(name: &str) -> Result<Self, DataError> {
        if !valid_label(name) {
            return Err(DataError::InvalidName);
        }
        Ok(Self {
            name: name.to_string(),
            signed_at: None,
            signature: None,
        })
    }

    /// Whether the claim carries a signature.
    pub fn is_signed(&self) -> bool {
        self.signed_at.is_some() && self.signature.is_some()
    }

    /// Canonical bytes covered by this claim's own signature:
    /// `{"name": ..}` tentative, `{"name": .., "signed_at": ..}` signed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut map = Map::new();
        map.insert("name".into(), self.name.as_str().into());
        if let Some(signed_at) = self.signed_at {
            map.insert("signed_at".into(), signed_at.into());
        }
        Document::from(map).to_bytes()
    }

    /// Inner form used inside the enclosing host's canonical bytes:
    /// the name lives in the surrounding map key, and the signature itself
    /// is omitted so host signatures do not depend on admin countersigning.
    pub fn host_canonical_document(&self) -> Document {
        let mut map = Map::new();
        if let Some(signed_at) = self.signed_at {
            map.insert("signed_at".into(), signed_at.into());
        }
        map.into()
    }

    /// Transport form (map value keyed by name).
    pub fn to_document(&self) -> Document {
        let mut map = Map::new();
        if let (Some(signed_at), Some(signature)) = (self.signed_at, &self.signature) {
            map.insert("signed_at".into(), signed_at.into());
            map.insert("signature".into(), signature.to_base64().into());
        }
        map.into()
    }

    /// Decode the transport form under `name`.
    pub fn from_document(name: &str, doc: &Document) -> Result<Self, CodecError> {
        let map = doc.as_map("hostname")?;
        if !valid_label(name) {
            return Err(CodecError::InvalidValue("hostname"));
        }
        let signed_at = opt_u64_field(map, "signed_at")?;
        let signature = opt_str_field(map, "signature")?
            .map(Signature::from_base64)
            .transpose()
            .map_err(|_| CodecError::InvalidValue("signature"))?;
        if signed_at.is_some() != signature.is_some() {
            return Err(CodecError::InvalidValue("signed_at"));
        }
        Ok(Self {
            name: name.to_string(),
            signed_at,
            signature,
        })
    }

    /// Sign (or re-sign) the claim with `keypair` at `now`, keeping
    /// `signed_at` monotone for fast successive updates.
    pub fn update_signature(&mut self, keypair: &Keypair, now: u64) {
        let floor = self.signed_at.map(|t| t.saturating_add(1)).unwrap_or(0);
        self.signed_at = Some(now.max(floor));
        self.signature = Some(keypair.sign(&self.canonical_bytes()));
    }

    /// Check the claim's signature under any of the authorised keys
    /// (network id plus its host-signing keys). Tentative claims fail.
    pub fn verify(&self, authorised: &[VerifyKey]) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let bytes = self.canonical_bytes();
        authorised.iter().any(|key| verify(key, &bytes, signature))
    }

    /// Last-writer-wins merge: the earliest signed claim prevails, ties
    /// break to the lexicographically smaller signature, signed beats
    /// tentative, and two tentative claims leave `self` untouched.
    /// Signature verification of `other` happens at the call site where the
    /// network's authorised keys are known.
    pub fn merge(&mut self, other: &Hostname) {
        match (self.is_signed(), other.is_signed()) {
            (_, false) => {}
            (false, true) => {
                self.signed_at = other.signed_at;
                self.signature = other.signature.clone();
            }
            (true, true) => {
                let ours = (self.signed_at, self.signature.as_ref());
                let theirs = (other.signed_at, other.signature.as_ref());
                if theirs < ours {
                    self.signed_at = other.signed_at;
                    self.signature = other.signature.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(name: &str, signed_at: u64, sig: u8) -> Hostname {
        let mut h = Hostname::new(name).unwrap();
        h.signed_at = Some(signed_at);
        h.signature = Some(Signature(vec![sig; 64]));
        h
    }

    #[test]
    fn labels_are_validated() {
        assert!(Hostname::new("wiki").is_ok());
        assert!(Hostname::new("").is_err());
        assert!(Hostname::new("a.b").is_err());
        assert!(Hostname::new(&"x".repeat(64)).is_err());
        assert!(Hostname::new("\u{e9}t\u{e9}").is_err());
    }

    #[test]
    fn earliest_signature_wins() {
        let mut ours = signed("wiki", 20, 1);
        ours.merge(&signed("wiki", 10, 2));
        assert_eq!(ours.signed_at, Some(10));

        // Older claim is kept against a newer one.
        ours.merge(&signed("wiki", 15, 3));
        assert_eq!(ours.signed_at, Some(10));
    }

    #[test]
    fn timestamp_tie_breaks_on_signature() {
        let mut ours = signed("wiki", 10, 9);
        ours.merge(&signed("wiki", 10, 3));
        assert_eq!(ours.signature, Some(Signature(vec![3; 64])));
    }

    #[test]
    fn tentative_never_clobbers() {
        let mut ours = signed("wiki", 10, 1);
        ours.merge(&Hostname::new("wiki").unwrap());
        assert!(ours.is_signed());

        let mut tentative = Hostname::new("wiki").unwrap();
        tentative.merge(&Hostname::new("wiki").unwrap());
        assert!(!tentative.is_signed());
    }
}
